//! FreeBSD kernel binding: ioctl(2) on a datagram socket, getifaddrs(3),
//! sysctlbyname(3) and /dev/netmap.

use super::ioctl::*;
use super::{
    bridge_error, interface_error, translate, AltqOp, AltqReply, BridgeOp, BridgeReply, IfCounters,
    IfReply, IfRequest, Kernel, LinkInfo, MemberInfo, NetmapHandle, SysctlKind, SysctlValue,
};
use crate::addr::{IfAddr, MacAddr};
use crate::bridge::PortFlags;
use crate::iface::{CapabilitySet, Capabilities, IfFlags, MediaReport, MediaWord};
use crate::netmap::{Direction, RingState};
use crate::{Error, Result};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::io;
use std::mem::{size_of, zeroed};
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::{addr_of, addr_of_mut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Handle to the running kernel.
pub struct FreeBsdKernel {
    sock: OwnedFd,
    netmap: Mutex<NetmapTable>,
}

#[derive(Default)]
struct NetmapTable {
    next_id: u32,
    ports: HashMap<u32, NetmapMapping>,
}

/// One `/dev/netmap` registration and its shared memory.
struct NetmapMapping {
    fd: OwnedFd,
    mem: *mut u8,
    memsize: usize,
    nifp: *mut NetmapIf,
}

// SAFETY: the mapping is only touched while the table lock is held
unsafe impl Send for NetmapMapping {}

impl Drop for NetmapMapping {
    fn drop(&mut self) {
        // SAFETY: mem/memsize come from a successful mmap and are unmapped once
        unsafe { libc::munmap(self.mem.cast(), self.memsize) };
    }
}

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

/// Issue one ioctl, returning the raw OS error on failure.
///
/// # Safety
/// `arg` must point to the structure `request` expects.
unsafe fn raw_ioctl<T>(fd: RawFd, request: libc::c_ulong, arg: *mut T) -> io::Result<()> {
    if libc::ioctl(fd, request, arg) < 0 {
        return Err(last_error());
    }
    Ok(())
}

/// Owned result of getifaddrs(3).
struct IfAddrs(*mut libc::ifaddrs);

impl IfAddrs {
    fn new() -> io::Result<Self> {
        let mut head = std::ptr::null_mut();
        // SAFETY: getifaddrs fills `head` with a list we free in Drop
        if unsafe { libc::getifaddrs(&mut head) } < 0 {
            return Err(last_error());
        }
        Ok(Self(head))
    }

    fn iter(&self) -> impl Iterator<Item = &libc::ifaddrs> {
        // SAFETY: the list stays alive as long as `self`
        std::iter::successors(unsafe { self.0.as_ref() }, |ifa| unsafe {
            ifa.ifa_next.as_ref()
        })
    }
}

impl Drop for IfAddrs {
    fn drop(&mut self) {
        // SAFETY: pointer came from getifaddrs
        unsafe { libc::freeifaddrs(self.0) };
    }
}

fn ifa_name(ifa: &libc::ifaddrs) -> String {
    // SAFETY: ifa_name is a NUL-terminated string owned by the list
    unsafe { CStr::from_ptr(ifa.ifa_name) }
        .to_string_lossy()
        .into_owned()
}

fn ifa_family(ifa: &libc::ifaddrs) -> Option<u8> {
    // SAFETY: a non-null ifa_addr points to at least a sockaddr header
    unsafe { ifa.ifa_addr.as_ref() }.map(|sa| sa.sa_family)
}

fn link_info(ifa: &libc::ifaddrs) -> Option<LinkInfo> {
    if ifa_family(ifa) != Some(AF_LINK) {
        return None;
    }
    // SAFETY: AF_LINK addresses are sockaddr_dl
    let sdl = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_dl) };
    let nlen = usize::from(sdl.sdl_nlen);
    let alen = usize::from(sdl.sdl_alen);
    let data: Vec<u8> = sdl.sdl_data.iter().map(|&c| c as u8).collect();
    let lladdr = data
        .get(nlen..nlen + alen)
        .filter(|_| alen == 6)
        .and_then(MacAddr::from_slice);
    Some(LinkInfo {
        name: ifa_name(ifa),
        index: u32::from(sdl.sdl_index),
        if_type: sdl.sdl_type,
        lladdr,
    })
}

fn inet_addr(sa: *const libc::sockaddr) -> Option<Ipv4Addr> {
    // SAFETY: checked non-null; family checked before reinterpreting
    let sa = unsafe { sa.as_ref() }?;
    if sa.sa_family != AF_INET {
        return None;
    }
    let sin = unsafe { &*(sa as *const libc::sockaddr as *const libc::sockaddr_in) };
    Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
}

impl FreeBsdKernel {
    pub fn open() -> Result<Self> {
        // SAFETY: plain socket(2) call
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(Error::Kernel {
                op: "socket",
                source: last_error(),
            });
        }
        debug!("opened control socket fd {}", fd);
        Ok(Self {
            // SAFETY: fd is a fresh descriptor we own
            sock: unsafe { OwnedFd::from_raw_fd(fd) },
            netmap: Mutex::new(NetmapTable::default()),
        })
    }

    fn fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    fn ifreq(&self, name: &str, request: libc::c_ulong, fill: impl FnOnce(&mut IfReq)) -> io::Result<IfReq> {
        let mut req = IfReq::new(name).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        fill(&mut req);
        // SAFETY: IfReq is the layout every SIOC[GS]IF* request above takes
        unsafe { raw_ioctl(self.fd(), request, &mut req) }?;
        Ok(req)
    }

    fn find_link(&self, name: &str) -> io::Result<LinkInfo> {
        IfAddrs::new()?
            .iter()
            .filter_map(link_info)
            .find(|link| link.name == name)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENXIO))
    }

    fn addresses(&self, name: &str) -> io::Result<Vec<IfAddr>> {
        self.find_link(name)?;
        let addrs = IfAddrs::new()?;
        Ok(addrs
            .iter()
            .filter(|ifa| ifa_name(ifa) == name)
            .filter_map(|ifa| {
                let addr = inet_addr(ifa.ifa_addr)?;
                let mask = inet_addr(ifa.ifa_netmask).unwrap_or(Ipv4Addr::BROADCAST);
                IfAddr::new(addr, IfAddr::prefix_from_mask(mask)?)
            })
            .collect())
    }

    fn media(&self, name: &str) -> io::Result<MediaReport> {
        // SAFETY: zeroed IfMediaReq is valid (null ulist, zero count)
        let mut req: IfMediaReq = unsafe { zeroed() };
        copy_ifname(&mut req.name, name).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        // first pass sizes the list
        unsafe { raw_ioctl(self.fd(), SIOCGIFMEDIA, &mut req) }?;
        let mut words = vec![0i32; usize::try_from(req.count).unwrap_or(0)];
        if !words.is_empty() {
            req.ulist = words.as_mut_ptr();
            // SAFETY: ulist has room for `count` words
            unsafe { raw_ioctl(self.fd(), SIOCGIFMEDIA, &mut req) }?;
            words.truncate(usize::try_from(req.count).unwrap_or(0));
        }
        Ok(MediaReport {
            current: MediaWord(req.current),
            active: MediaWord(req.active),
            status: req.status,
            supported: words.into_iter().map(MediaWord).collect(),
        })
    }

    fn groups(&self, name: &str) -> io::Result<Vec<String>> {
        // SAFETY: zeroed IfGroupReq asks only for the length
        let mut req: IfGroupReq = unsafe { zeroed() };
        copy_ifname(&mut req.name, name).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        unsafe { raw_ioctl(self.fd(), SIOCGIFGROUP, &mut req) }?;
        let count = req.len as usize / size_of::<IfgReq>();
        let mut buf = vec![IfgReq { group: [0; IFNAMSIZ] }; count];
        req.ifgru.groups = buf.as_mut_ptr();
        // SAFETY: buffer holds `len` bytes of ifg_req entries
        unsafe { raw_ioctl(self.fd(), SIOCGIFGROUP, &mut req) }?;
        let filled = (req.len as usize / size_of::<IfgReq>()).min(count);
        Ok(buf[..filled]
            .iter()
            .map(|g| read_ifname(&g.group))
            .filter(|g| g != "all")
            .collect())
    }

    fn group_op(&self, name: &str, group: &str, request: libc::c_ulong) -> io::Result<()> {
        // SAFETY: zeroed IfGroupReq is valid
        let mut req: IfGroupReq = unsafe { zeroed() };
        let mut group_buf = [0u8; IFNAMSIZ];
        let invalid = |_| io::Error::from_raw_os_error(libc::EINVAL);
        copy_ifname(&mut req.name, name).map_err(invalid)?;
        copy_ifname(&mut group_buf, group).map_err(invalid)?;
        req.ifgru.group = group_buf;
        // SAFETY: request is SIOCAIFGROUP or SIOCDIFGROUP
        unsafe { raw_ioctl(self.fd(), request, &mut req) }
    }

    fn add_address(&self, name: &str, addr: IfAddr) -> io::Result<()> {
        // SAFETY: zeroed InAliasReq is valid
        let mut req: InAliasReq = unsafe { zeroed() };
        copy_ifname(&mut req.name, name).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        req.addr = SockAddrIn::from(addr.addr);
        req.mask = SockAddrIn::from(addr.netmask());
        if addr.prefix_len < 31 {
            req.broadaddr = SockAddrIn::from(addr.broadcast());
        }
        // SAFETY: SIOCAIFADDR takes in_aliasreq
        unsafe { raw_ioctl(self.fd(), SIOCAIFADDR, &mut req) }
    }

    fn counters(&self, name: &str) -> io::Result<IfCounters> {
        // SAFETY: if_data is plain integers
        let mut data: IfData = unsafe { zeroed() };
        self.ifreq(name, SIOCGIFDATA, |req| {
            req.ifru.data = addr_of_mut!(data).cast();
        })?;
        Ok(IfCounters {
            ipackets: data.ifi_ipackets,
            ierrors: data.ifi_ierrors,
            opackets: data.ifi_opackets,
            oerrors: data.ifi_oerrors,
            ibytes: data.ifi_ibytes,
            obytes: data.ifi_obytes,
            iqdrops: data.ifi_iqdrops,
            oqdrops: data.ifi_oqdrops,
        })
    }

    fn interface(&self, name: &str, request: &IfRequest) -> io::Result<IfReply> {
        let reply = match request {
            IfRequest::GetLink => IfReply::Link(self.find_link(name)?),
            IfRequest::GetFlags => {
                let req = self.ifreq(name, SIOCGIFFLAGS, |_| {})?;
                // SAFETY: SIOCGIFFLAGS fills the flags member
                let [low, high] = unsafe { req.ifru.flags };
                IfReply::Flags(IfFlags::from_halves(low as u16, high as u16))
            }
            IfRequest::SetFlags(flags) => {
                let (low, high) = flags.to_halves();
                self.ifreq(name, SIOCSIFFLAGS, |req| {
                    req.ifru.flags = [low as i16, high as i16];
                })?;
                IfReply::Done
            }
            IfRequest::GetCapabilities => {
                let req = self.ifreq(name, SIOCGIFCAP, |_| {})?;
                // SAFETY: SIOCGIFCAP fills reqcap (supported) and curcap (enabled)
                let [supported, enabled] = unsafe { req.ifru.cap };
                IfReply::Capabilities(CapabilitySet {
                    supported: Capabilities::from_bits_retain(supported as u32),
                    enabled: Capabilities::from_bits_retain(enabled as u32),
                })
            }
            IfRequest::SetCapabilities(enabled) => {
                self.ifreq(name, SIOCSIFCAP, |req| {
                    req.ifru.cap = [enabled.bits() as i32, 0];
                })?;
                IfReply::Done
            }
            IfRequest::GetMedia => IfReply::Media(self.media(name)?),
            IfRequest::SetMedia(word) => {
                self.ifreq(name, SIOCSIFMEDIA, |req| req.ifru.media = word.0)?;
                IfReply::Done
            }
            IfRequest::GetFib => {
                let req = self.ifreq(name, SIOCGIFFIB, |_| {})?;
                // SAFETY: SIOCGIFFIB fills ifr_fib
                IfReply::Fib(unsafe { req.ifru.fib })
            }
            IfRequest::SetFib(fib) => {
                self.ifreq(name, SIOCSIFFIB, |req| req.ifru.fib = *fib)?;
                IfReply::Done
            }
            IfRequest::SetLinkAddr(mac) => {
                self.ifreq(name, SIOCSIFLLADDR, |req| req.ifru.addr = SockAddr::link(*mac))?;
                IfReply::Done
            }
            IfRequest::GetGroups => IfReply::Groups(self.groups(name)?),
            IfRequest::AddGroup(group) => {
                self.group_op(name, group, SIOCAIFGROUP)?;
                IfReply::Done
            }
            IfRequest::DeleteGroup(group) => {
                self.group_op(name, group, SIOCDIFGROUP)?;
                IfReply::Done
            }
            IfRequest::GetAddresses => IfReply::Addresses(self.addresses(name)?),
            IfRequest::AddAddress(addr) => {
                self.add_address(name, *addr)?;
                IfReply::Done
            }
            IfRequest::DeleteAddress(addr) => {
                self.ifreq(name, SIOCDIFADDR, |req| {
                    req.ifru.addr_in = SockAddrIn::from(*addr);
                })?;
                IfReply::Done
            }
            IfRequest::GetMtu => {
                let req = self.ifreq(name, SIOCGIFMTU, |_| {})?;
                // SAFETY: SIOCGIFMTU fills ifr_mtu
                IfReply::Mtu(unsafe { req.ifru.mtu } as u32)
            }
            IfRequest::SetMtu(mtu) => {
                let mtu = i32::try_from(*mtu).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
                self.ifreq(name, SIOCSIFMTU, |req| req.ifru.mtu = mtu)?;
                IfReply::Done
            }
            IfRequest::GetCounters => IfReply::Counters(self.counters(name)?),
            IfRequest::Create => {
                let req = self.ifreq(name, SIOCIFCREATE, |_| {})?;
                IfReply::Created(read_ifname(&req.name))
            }
            IfRequest::Destroy => {
                self.ifreq(name, SIOCIFDESTROY, |_| {})?;
                IfReply::Done
            }
            IfRequest::Rename(new_name) => {
                let mut buf = [0u8; IFNAMSIZ];
                copy_ifname(&mut buf, new_name)
                    .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
                self.ifreq(name, SIOCSIFNAME, |req| {
                    req.ifru.data = buf.as_mut_ptr().cast();
                })?;
                IfReply::Done
            }
        };
        Ok(reply)
    }

    /// One `SIOC[GS]DRVSPEC` call against a bridge.
    fn drvspec<T>(&self, bridge: &str, cmd: libc::c_ulong, set: bool, arg: &mut T) -> io::Result<()> {
        let mut drv = IfDrv {
            name: [0; IFNAMSIZ],
            cmd,
            len: size_of::<T>(),
            data: (arg as *mut T).cast(),
        };
        copy_ifname(&mut drv.name, bridge).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let request = if set { SIOCSDRVSPEC } else { SIOCGDRVSPEC };
        // SAFETY: data points to the structure `cmd` expects, of `len` bytes
        unsafe { raw_ioctl(self.fd(), request, &mut drv) }
    }

    fn member_req(member: &str) -> io::Result<IfBReq> {
        // SAFETY: ifbreq is plain data
        let mut req: IfBReq = unsafe { zeroed() };
        copy_ifname(&mut req.ifsname, member).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        Ok(req)
    }

    fn member_info(req: &IfBReq) -> MemberInfo {
        MemberInfo {
            name: read_ifname(&req.ifsname),
            flags: PortFlags::from_bits_retain(req.ifsflags),
            stp_state: req.state,
            port_no: req.portno,
            priority: req.priority,
            path_cost: req.path_cost,
        }
    }

    fn list_members(&self, bridge: &str) -> io::Result<Vec<MemberInfo>> {
        let mut capacity = 8usize;
        loop {
            // SAFETY: zeroed ifbreq entries are valid
            let mut buf: Vec<IfBReq> = vec![unsafe { zeroed() }; capacity];
            let len = capacity * size_of::<IfBReq>();
            let mut conf = IfBifConf {
                len: u32::try_from(len).map_err(|_| io::Error::from_raw_os_error(libc::ENOMEM))?,
                buf: buf.as_mut_ptr(),
            };
            self.drvspec(bridge, BRDGGIFS, false, &mut conf)?;
            let used = conf.len as usize;
            if used < len {
                let count = used / size_of::<IfBReq>();
                return Ok(buf[..count].iter().map(Self::member_info).collect());
            }
            // a full buffer may have been truncated
            capacity *= 2;
        }
    }

    fn bridge(&self, bridge: &str, op: &BridgeOp) -> io::Result<BridgeReply> {
        let reply = match op {
            BridgeOp::AddMember(member) => {
                let mut req = Self::member_req(member)?;
                self.drvspec(bridge, BRDGADD, true, &mut req)?;
                BridgeReply::Done
            }
            BridgeOp::DeleteMember(member) => {
                let mut req = Self::member_req(member)?;
                self.drvspec(bridge, BRDGDEL, true, &mut req)?;
                BridgeReply::Done
            }
            BridgeOp::ListMembers => BridgeReply::Members(self.list_members(bridge)?),
            BridgeOp::GetMember(member) => {
                let mut req = Self::member_req(member)?;
                self.drvspec(bridge, BRDGGIFFLGS, false, &mut req)?;
                BridgeReply::Member(Self::member_info(&req))
            }
            BridgeOp::SetMemberFlags { member, flags } => {
                let mut req = Self::member_req(member)?;
                req.ifsflags = flags.bits();
                self.drvspec(bridge, BRDGSIFFLGS, true, &mut req)?;
                BridgeReply::Done
            }
        };
        Ok(reply)
    }

    fn sysctl_raw(&self, key: &CString, buf: Option<&mut Vec<u8>>) -> io::Result<usize> {
        let mut len: libc::size_t = buf.as_ref().map_or(0, |b| b.len());
        let ptr = buf.map_or(std::ptr::null_mut(), |b| b.as_mut_ptr());
        // SAFETY: ptr is null (size probe) or a buffer of `len` bytes
        let rc = unsafe {
            libc::sysctlbyname(key.as_ptr(), ptr.cast(), &mut len, std::ptr::null(), 0)
        };
        if rc < 0 {
            return Err(last_error());
        }
        Ok(len)
    }

    fn sysctl_read(&self, key: &str, kind: SysctlKind) -> io::Result<SysctlValue> {
        let ckey = CString::new(key).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let size = self.sysctl_raw(&ckey, None)?;
        let mut buf = vec![0u8; size];
        let len = self.sysctl_raw(&ckey, Some(&mut buf))?;
        buf.truncate(len);
        let value = match (kind, buf.len()) {
            (SysctlKind::Int, 4) => {
                SysctlValue::Int(i64::from(i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])))
            }
            (SysctlKind::Int, 8) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf);
                SysctlValue::Int(i64::from_ne_bytes(raw))
            }
            (SysctlKind::Int, _) => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
            (SysctlKind::String, _) => {
                let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                SysctlValue::String(String::from_utf8_lossy(&buf[..end]).into_owned())
            }
        };
        Ok(value)
    }

    fn sysctl_write(&self, key: &str, value: &SysctlValue) -> io::Result<()> {
        let ckey = CString::new(key).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let bytes = match value {
            SysctlValue::Int(v) => i32::try_from(*v)
                .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?
                .to_ne_bytes()
                .to_vec(),
            SysctlValue::String(s) => {
                let mut b = s.as_bytes().to_vec();
                b.push(0);
                b
            }
        };
        // SAFETY: new value buffer of `len` bytes, no old value requested
        let rc = unsafe {
            libc::sysctlbyname(
                ckey.as_ptr(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                bytes.as_ptr().cast(),
                bytes.len(),
            )
        };
        if rc < 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn netmap_table(&self) -> MutexGuard<'_, NetmapTable> {
        self.netmap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_netmap(&self, ifname: &str) -> io::Result<(NetmapMapping, NmReq)> {
        let path = CString::new("/dev/netmap").map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        // SAFETY: plain open(2)
        let raw = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
        if raw < 0 {
            return Err(last_error());
        }
        // SAFETY: fresh descriptor we own
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: nmreq is plain data
        let mut req: NmReq = unsafe { zeroed() };
        copy_ifname(&mut req.name, ifname).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        req.version = NETMAP_API;
        req.flags = NR_REG_ALL_NIC;
        unsafe { raw_ioctl(fd.as_raw_fd(), NIOCREGIF, &mut req) }?;

        let memsize = req.memsize as usize;
        // SAFETY: map the region NIOCREGIF just described
        let mem = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                memsize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            return Err(last_error());
        }
        let mem = mem.cast::<u8>();
        // SAFETY: nr_offset lies inside the mapping
        let nifp = unsafe { mem.add(req.offset as usize) }.cast::<NetmapIf>();
        Ok((
            NetmapMapping {
                fd,
                mem,
                memsize,
                nifp,
            },
            req,
        ))
    }
}

impl NetmapMapping {
    /// Pointer to ring `ring` of direction `dir`.
    ///
    /// # Safety
    /// `ring` must be below the ring count for `dir`.
    unsafe fn ring(&self, dir: Direction, ring: u16) -> *mut NetmapRing {
        let nifp = self.nifp;
        let tx_rings = std::ptr::read_volatile(addr_of!((*nifp).tx_rings)) as usize;
        let host_tx = std::ptr::read_volatile(addr_of!((*nifp).host_tx_rings)) as usize;
        let index = match dir {
            Direction::Tx => usize::from(ring),
            Direction::Rx => tx_rings + host_tx + usize::from(ring),
        };
        // ring_ofs[] follows the fixed header
        let ring_ofs = nifp.add(1).cast::<isize>();
        let ofs = std::ptr::read_volatile(ring_ofs.add(index));
        nifp.cast::<u8>().offset(ofs).cast::<NetmapRing>()
    }
}

fn netmap_error(op: &'static str, ifname: &str, err: io::Error) -> Error {
    translate(op, "interface", ifname, err)
}

impl Kernel for FreeBsdKernel {
    fn name(&self) -> &'static str {
        "freebsd"
    }

    fn links(&self) -> Result<Vec<LinkInfo>> {
        let addrs = IfAddrs::new().map_err(|e| Error::Kernel {
            op: "getifaddrs",
            source: e,
        })?;
        Ok(addrs.iter().filter_map(link_info).collect())
    }

    fn ioctl_interface(&self, name: &str, request: IfRequest) -> Result<IfReply> {
        trace!("{} {}", name, request.op());
        self.interface(name, &request)
            .map_err(|e| interface_error(name, &request, e))
    }

    fn ioctl_bridge(&self, bridge: &str, op: BridgeOp) -> Result<BridgeReply> {
        trace!("{} {}", bridge, op.op());
        self.bridge(bridge, &op)
            .map_err(|e| bridge_error(bridge, &op, e))
    }

    fn sysctl_get(&self, key: &str, kind: SysctlKind) -> Result<SysctlValue> {
        self.sysctl_read(key, kind)
            .map_err(|e| translate("sysctlbyname", "sysctl", key, e))
    }

    fn sysctl_set(&self, key: &str, value: &SysctlValue) -> Result<()> {
        self.sysctl_write(key, value)
            .map_err(|e| translate("sysctlbyname", "sysctl", key, e))
    }

    fn altq(&self, _op: AltqOp) -> Result<AltqReply> {
        Err(Error::NotSupported("ALTQ queue management".to_string()))
    }

    fn netmap_open(&self, ifname: &str) -> Result<NetmapHandle> {
        let (mapping, req) = self
            .register_netmap(ifname)
            .map_err(|e| netmap_error("NIOCREGIF", ifname, e))?;
        let mut table = self.netmap_table();
        table.next_id += 1;
        let id = table.next_id;
        table.ports.insert(id, mapping);
        debug!(
            "netmap {}: {} tx / {} rx rings",
            ifname, req.tx_rings, req.rx_rings
        );
        Ok(NetmapHandle {
            id,
            ifname: ifname.to_string(),
            tx_rings: req.tx_rings,
            rx_rings: req.rx_rings,
            tx_slots: req.tx_slots,
            rx_slots: req.rx_slots,
        })
    }

    fn netmap_ring(&self, handle: &NetmapHandle, dir: Direction, ring: u16) -> Result<RingState> {
        let table = self.netmap_table();
        let mapping = table
            .ports
            .get(&handle.id)
            .ok_or_else(|| netmap_error("netmap ring", &handle.ifname, io::Error::from_raw_os_error(libc::EBADF)))?;
        if ring >= handle.rings(dir) {
            return Err(netmap_error("netmap ring", &handle.ifname, io::Error::from_raw_os_error(libc::EINVAL)));
        }
        // SAFETY: ring index checked against the registered geometry; the
        // indices are shared with the kernel and read volatile
        unsafe {
            let r = mapping.ring(dir, ring);
            Ok(RingState {
                num_slots: std::ptr::read_volatile(addr_of!((*r).num_slots)),
                head: std::ptr::read_volatile(addr_of!((*r).head)),
                cur: std::ptr::read_volatile(addr_of!((*r).cur)),
                tail: std::ptr::read_volatile(addr_of!((*r).tail)),
            })
        }
    }

    fn netmap_release(&self, handle: &NetmapHandle, dir: Direction, ring: u16, head: u32) -> Result<()> {
        let table = self.netmap_table();
        let mapping = table
            .ports
            .get(&handle.id)
            .ok_or_else(|| netmap_error("netmap release", &handle.ifname, io::Error::from_raw_os_error(libc::EBADF)))?;
        if ring >= handle.rings(dir) {
            return Err(netmap_error("netmap release", &handle.ifname, io::Error::from_raw_os_error(libc::EINVAL)));
        }
        // SAFETY: as in netmap_ring; only head and cur belong to the process
        unsafe {
            let r = mapping.ring(dir, ring);
            std::ptr::write_volatile(addr_of_mut!((*r).head), head);
            std::ptr::write_volatile(addr_of_mut!((*r).cur), head);
        }
        Ok(())
    }

    fn netmap_sync(&self, handle: &NetmapHandle, dir: Direction) -> Result<()> {
        let (op, request) = match dir {
            Direction::Tx => ("NIOCTXSYNC", NIOCTXSYNC),
            Direction::Rx => ("NIOCRXSYNC", NIOCRXSYNC),
        };
        let table = self.netmap_table();
        let mapping = table
            .ports
            .get(&handle.id)
            .ok_or_else(|| netmap_error(op, &handle.ifname, io::Error::from_raw_os_error(libc::EBADF)))?;
        // SAFETY: the sync ioctls take no argument
        unsafe { raw_ioctl(mapping.fd.as_raw_fd(), request, std::ptr::null_mut::<u8>()) }
            .map_err(|e| netmap_error(op, &handle.ifname, e))
    }

    fn netmap_close(&self, handle: &NetmapHandle) -> Result<()> {
        let removed = self.netmap_table().ports.remove(&handle.id);
        match removed {
            // unmapped and closed by Drop
            Some(_) => Ok(()),
            None => Err(netmap_error(
                "netmap close",
                &handle.ifname,
                io::Error::from_raw_os_error(libc::EBADF),
            )),
        }
    }
}
