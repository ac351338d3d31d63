//! FreeBSD ioctl request numbers and `#[repr(C)]` request layouts
//!
//! Layouts mirror `net/if.h`, `net/if_media.h`, `net/if_bridgevar.h`,
//! `netinet/in_var.h` and `net/netmap.h` for LP64 targets. Request numbers are
//! computed the way `sys/ioccom.h` does so that sizes and numbers cannot drift
//! apart.

#![cfg_attr(not(target_os = "freebsd"), allow(dead_code))]

use crate::addr::MacAddr;
use crate::{Error, Result};
use std::mem::size_of;
use std::net::Ipv4Addr;

pub const IFNAMSIZ: usize = 16;

pub const AF_INET: u8 = 2;
pub const AF_LINK: u8 = 18;

const IOCPARM_MASK: u64 = 0x1fff;
const IOC_VOID: u64 = 0x2000_0000;
const IOC_OUT: u64 = 0x4000_0000;
const IOC_IN: u64 = 0x8000_0000;
const IOC_INOUT: u64 = IOC_IN | IOC_OUT;

const fn ioc(inout: u64, group: u8, num: u8, len: usize) -> libc::c_ulong {
    (inout | (((len as u64) & IOCPARM_MASK) << 16) | ((group as u64) << 8) | num as u64)
        as libc::c_ulong
}

const fn io(group: u8, num: u8) -> libc::c_ulong {
    ioc(IOC_VOID, group, num, 0)
}

const fn iow(group: u8, num: u8, len: usize) -> libc::c_ulong {
    ioc(IOC_IN, group, num, len)
}

const fn iowr(group: u8, num: u8, len: usize) -> libc::c_ulong {
    ioc(IOC_INOUT, group, num, len)
}

// sys/sockio.h
pub const SIOCSIFFLAGS: libc::c_ulong = iow(b'i', 16, size_of::<IfReq>());
pub const SIOCGIFFLAGS: libc::c_ulong = iowr(b'i', 17, size_of::<IfReq>());
pub const SIOCDIFADDR: libc::c_ulong = iow(b'i', 25, size_of::<IfReq>());
pub const SIOCSIFCAP: libc::c_ulong = iow(b'i', 30, size_of::<IfReq>());
pub const SIOCGIFCAP: libc::c_ulong = iowr(b'i', 31, size_of::<IfReq>());
pub const SIOCSIFNAME: libc::c_ulong = iow(b'i', 40, size_of::<IfReq>());
pub const SIOCAIFADDR: libc::c_ulong = iow(b'i', 43, size_of::<InAliasReq>());
pub const SIOCGIFDATA: libc::c_ulong = iowr(b'i', 44, size_of::<IfReq>());
pub const SIOCGIFMTU: libc::c_ulong = iowr(b'i', 51, size_of::<IfReq>());
pub const SIOCSIFMTU: libc::c_ulong = iow(b'i', 52, size_of::<IfReq>());
pub const SIOCSIFMEDIA: libc::c_ulong = iowr(b'i', 55, size_of::<IfReq>());
pub const SIOCGIFMEDIA: libc::c_ulong = iowr(b'i', 56, size_of::<IfMediaReq>());
pub const SIOCSIFLLADDR: libc::c_ulong = iow(b'i', 60, size_of::<IfReq>());
pub const SIOCGIFFIB: libc::c_ulong = iowr(b'i', 92, size_of::<IfReq>());
pub const SIOCSIFFIB: libc::c_ulong = iow(b'i', 93, size_of::<IfReq>());
pub const SIOCIFDESTROY: libc::c_ulong = iow(b'i', 121, size_of::<IfReq>());
pub const SIOCIFCREATE: libc::c_ulong = iowr(b'i', 122, size_of::<IfReq>());
pub const SIOCSDRVSPEC: libc::c_ulong = iow(b'i', 123, size_of::<IfDrv>());
pub const SIOCGDRVSPEC: libc::c_ulong = iowr(b'i', 123, size_of::<IfDrv>());
pub const SIOCAIFGROUP: libc::c_ulong = iow(b'i', 135, size_of::<IfGroupReq>());
pub const SIOCGIFGROUP: libc::c_ulong = iowr(b'i', 136, size_of::<IfGroupReq>());
pub const SIOCDIFGROUP: libc::c_ulong = iow(b'i', 137, size_of::<IfGroupReq>());

// net/netmap.h (legacy nmreq API)
pub const NIOCREGIF: libc::c_ulong = iowr(b'i', 146, size_of::<NmReq>());
pub const NIOCTXSYNC: libc::c_ulong = io(b'i', 148);
pub const NIOCRXSYNC: libc::c_ulong = io(b'i', 149);

// net/if_bridgevar.h driver-specific commands
pub const BRDGADD: libc::c_ulong = 0;
pub const BRDGDEL: libc::c_ulong = 1;
pub const BRDGGIFFLGS: libc::c_ulong = 2;
pub const BRDGSIFFLGS: libc::c_ulong = 3;
pub const BRDGGIFS: libc::c_ulong = 6;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct SockAddr {
    pub sa_len: u8,
    pub sa_family: u8,
    pub sa_data: [u8; 14],
}

impl SockAddr {
    /// Link-level address as `SIOCSIFLLADDR` expects it.
    pub fn link(mac: MacAddr) -> Self {
        let mut sa_data = [0u8; 14];
        sa_data[..6].copy_from_slice(&mac.0);
        SockAddr {
            sa_len: 6,
            sa_family: AF_LINK,
            sa_data,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct SockAddrIn {
    pub sin_len: u8,
    pub sin_family: u8,
    pub sin_port: u16,
    pub sin_addr: [u8; 4],
    pub sin_zero: [u8; 8],
}

impl From<Ipv4Addr> for SockAddrIn {
    fn from(addr: Ipv4Addr) -> Self {
        SockAddrIn {
            sin_len: size_of::<SockAddrIn>() as u8,
            sin_family: AF_INET,
            sin_port: 0,
            sin_addr: addr.octets(),
            sin_zero: [0; 8],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct IfReqBuffer {
    pub length: usize,
    pub buffer: *mut libc::c_void,
}

/// The `ifr_ifru` union of `struct ifreq`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union IfReqData {
    pub addr: SockAddr,
    pub addr_in: SockAddrIn,
    pub buffer: IfReqBuffer,
    /// `[ifr_flags, ifr_flagshigh]`
    pub flags: [i16; 2],
    pub index: i16,
    pub mtu: i32,
    pub media: i32,
    pub data: *mut libc::c_void,
    /// `[ifr_reqcap, ifr_curcap]`
    pub cap: [i32; 2],
    pub fib: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct IfReq {
    pub name: [u8; IFNAMSIZ],
    pub ifru: IfReqData,
}

impl IfReq {
    pub fn new(name: &str) -> Result<Self> {
        // SAFETY: all-zero bytes are a valid value for every union member
        let mut req: IfReq = unsafe { std::mem::zeroed() };
        copy_ifname(&mut req.name, name)?;
        Ok(req)
    }
}

#[repr(C)]
pub struct IfMediaReq {
    pub name: [u8; IFNAMSIZ],
    pub current: i32,
    pub mask: i32,
    pub status: i32,
    pub active: i32,
    pub count: i32,
    pub ulist: *mut i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct IfgReq {
    pub group: [u8; IFNAMSIZ],
}

#[repr(C)]
pub union IfGroupReqData {
    pub group: [u8; IFNAMSIZ],
    pub groups: *mut IfgReq,
}

#[repr(C)]
pub struct IfGroupReq {
    pub name: [u8; IFNAMSIZ],
    pub len: u32,
    pub ifgru: IfGroupReqData,
}

#[repr(C)]
pub struct InAliasReq {
    pub name: [u8; IFNAMSIZ],
    pub addr: SockAddrIn,
    pub broadaddr: SockAddrIn,
    pub mask: SockAddrIn,
    pub vhid: i32,
}

/// `struct ifdrv` for `SIOC[GS]DRVSPEC`.
#[repr(C)]
pub struct IfDrv {
    pub name: [u8; IFNAMSIZ],
    pub cmd: libc::c_ulong,
    pub len: usize,
    pub data: *mut libc::c_void,
}

/// `struct ifbreq`: one bridge member.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IfBReq {
    pub ifsname: [u8; IFNAMSIZ],
    pub ifsflags: u32,
    pub stpflags: u32,
    pub path_cost: u32,
    pub portno: u8,
    pub priority: u8,
    pub proto: u8,
    pub role: u8,
    pub state: u8,
    pub addrcnt: u32,
    pub addrmax: u32,
    pub addrexceeded: u32,
    pub pad: [u8; 32],
}

/// `struct ifbifconf` for `BRDGGIFS`.
#[repr(C)]
pub struct IfBifConf {
    pub len: u32,
    pub buf: *mut IfBReq,
}

/// `struct if_data` as filled by `SIOCGIFDATA`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IfData {
    pub ifi_type: u8,
    pub ifi_physical: u8,
    pub ifi_addrlen: u8,
    pub ifi_hdrlen: u8,
    pub ifi_link_state: u8,
    pub ifi_vhid: u8,
    pub ifi_datalen: u16,
    pub ifi_mtu: u32,
    pub ifi_metric: u32,
    pub ifi_baudrate: u64,
    pub ifi_ipackets: u64,
    pub ifi_ierrors: u64,
    pub ifi_opackets: u64,
    pub ifi_oerrors: u64,
    pub ifi_collisions: u64,
    pub ifi_ibytes: u64,
    pub ifi_obytes: u64,
    pub ifi_imcasts: u64,
    pub ifi_omcasts: u64,
    pub ifi_iqdrops: u64,
    pub ifi_oqdrops: u64,
    pub ifi_noproto: u64,
    pub ifi_hwassist: u64,
    pub ifi_epoch: u64,
    pub ifi_lastchange: [u64; 2],
}

/// Legacy `struct nmreq`.
#[repr(C)]
pub struct NmReq {
    pub name: [u8; IFNAMSIZ],
    pub version: u32,
    pub offset: u32,
    pub memsize: u32,
    pub tx_slots: u32,
    pub rx_slots: u32,
    pub tx_rings: u16,
    pub rx_rings: u16,
    pub ringid: u16,
    pub cmd: u16,
    pub arg1: u16,
    pub arg2: u16,
    pub arg3: u32,
    pub flags: u32,
    pub spare2: [u32; 1],
}

pub const NETMAP_API: u32 = 14;
pub const NR_REG_ALL_NIC: u32 = 1;

/// Fixed prefix of `struct netmap_if`; `ring_ofs[]` follows.
#[repr(C)]
pub struct NetmapIf {
    pub name: [u8; IFNAMSIZ],
    pub version: u32,
    pub flags: u32,
    pub tx_rings: u32,
    pub rx_rings: u32,
    pub bufs_head: u32,
    pub host_tx_rings: u32,
    pub host_rx_rings: u32,
    pub spare1: [u32; 3],
}

/// Fixed prefix of `struct netmap_ring`; the slot array follows.
#[repr(C)]
pub struct NetmapRing {
    pub buf_ofs: i64,
    pub num_slots: u32,
    pub nr_buf_size: u32,
    pub ringid: u16,
    pub dir: u16,
    pub head: u32,
    pub cur: u32,
    pub tail: u32,
    pub flags: u32,
}

/// Copy an interface name into a fixed `IFNAMSIZ` buffer, NUL terminated.
pub fn copy_ifname(dest: &mut [u8; IFNAMSIZ], name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(Error::Usage(format!("invalid interface name '{}'", name)));
    }
    if bytes.len() >= IFNAMSIZ {
        return Err(Error::Usage(format!(
            "interface name too long: {} (max {} chars)",
            name,
            IFNAMSIZ - 1
        )));
    }
    dest.fill(0);
    dest[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Read a NUL-terminated name out of a fixed buffer.
pub fn read_ifname(src: &[u8]) -> String {
    let len = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_ifname() {
        let mut buf = [0xffu8; IFNAMSIZ];
        copy_ifname(&mut buf, "bridge0").unwrap();
        assert_eq!(&buf[..8], b"bridge0\0");
        assert_eq!(read_ifname(&buf), "bridge0");
    }

    #[test]
    fn test_copy_ifname_rejects_bad_names() {
        let mut buf = [0u8; IFNAMSIZ];
        assert!(copy_ifname(&mut buf, "a-very-long-name0").is_err());
        assert!(copy_ifname(&mut buf, "").is_err());
        assert!(copy_ifname(&mut buf, "em\00").is_err());
        // 15 chars + NUL is the maximum
        assert!(copy_ifname(&mut buf, "abcdefghijklmno").is_ok());
    }

    #[test]
    fn test_link_sockaddr() {
        let sa = SockAddr::link(MacAddr([2, 0, 0, 0, 0, 9]));
        assert_eq!(sa.sa_len, 6);
        assert_eq!(sa.sa_family, AF_LINK);
        assert_eq!(&sa.sa_data[..6], &[2, 0, 0, 0, 0, 9]);
    }

    #[test]
    fn test_sockaddr_in() {
        let sin = SockAddrIn::from(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(sin.sin_len, 16);
        assert_eq!(sin.sin_family, AF_INET);
        assert_eq!(sin.sin_addr, [10, 1, 2, 3]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<IfReq>(), 32);
        assert_eq!(size_of::<IfMediaReq>(), 48);
        assert_eq!(size_of::<IfGroupReq>(), 40);
        assert_eq!(size_of::<InAliasReq>(), 68);
        assert_eq!(size_of::<IfDrv>(), 40);
        assert_eq!(size_of::<IfBReq>(), 80);
        assert_eq!(size_of::<IfBifConf>(), 16);
        assert_eq!(size_of::<IfData>(), 152);
        assert_eq!(size_of::<NmReq>(), 60);
        assert_eq!(size_of::<NetmapIf>(), 56);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_request_numbers() {
        assert_eq!(SIOCSIFFLAGS as u64, 0x8020_6910);
        assert_eq!(SIOCGIFFLAGS as u64, 0xc020_6911);
        assert_eq!(SIOCGIFCAP as u64, 0xc020_691f);
        assert_eq!(SIOCSIFLLADDR as u64, 0x8020_693c);
        assert_eq!(SIOCAIFADDR as u64, 0x8044_692b);
        assert_eq!(SIOCGIFMEDIA as u64, 0xc030_6938);
        assert_eq!(SIOCIFDESTROY as u64, 0x8020_6979);
        assert_eq!(SIOCIFCREATE as u64, 0xc020_697a);
        assert_eq!(SIOCSDRVSPEC as u64, 0x8028_697b);
        assert_eq!(SIOCGDRVSPEC as u64, 0xc028_697b);
        assert_eq!(SIOCAIFGROUP as u64, 0x8028_6987);
        assert_eq!(NIOCREGIF as u64, 0xc03c_6992);
        assert_eq!(NIOCTXSYNC as u64, 0x2000_6994);
        assert_eq!(NIOCRXSYNC as u64, 0x2000_6995);
    }
}
