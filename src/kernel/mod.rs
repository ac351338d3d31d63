//! Kernel binding
//!
//! Every interface, bridge, queue and netmap operation funnels through the
//! [`Kernel`] trait. Two bindings exist:
//! - [`FreeBsdKernel`]: `ioctl(2)`, `sysctl(3)` and `/dev/netmap` on FreeBSD
//! - [`SimKernel`]: an in-memory kernel with the same contract, used by tests
//!   and on hosts that are not FreeBSD

#[cfg(target_os = "freebsd")]
mod freebsd;
pub mod ioctl;
mod sim;

#[cfg(target_os = "freebsd")]
pub use freebsd::FreeBsdKernel;
pub use sim::{SimKernel, SimLink};

use crate::addr::{IfAddr, MacAddr};
use crate::altq::QueueConfig;
use crate::bridge::PortFlags;
use crate::config::{KernelBackend, SimulatedConfig};
use crate::iface::{CapabilitySet, Capabilities, IfFlags, MediaReport, MediaWord};
use crate::netmap::{Direction, RingState};
use crate::{Error, Result};
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{info, warn};

/// One kernel interface as seen by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub name: String,
    pub index: u32,
    /// `IFT_*` type byte from `sockaddr_dl`
    pub if_type: u8,
    pub lladdr: Option<MacAddr>,
}

/// Interface packet counters (`struct if_data`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IfCounters {
    pub ipackets: u64,
    pub ierrors: u64,
    pub opackets: u64,
    pub oerrors: u64,
    pub ibytes: u64,
    pub obytes: u64,
    pub iqdrops: u64,
    pub oqdrops: u64,
}

/// Per-interface ioctl requests.
#[derive(Debug, Clone, PartialEq)]
pub enum IfRequest {
    GetLink,
    GetFlags,
    SetFlags(IfFlags),
    GetCapabilities,
    /// Requested enabled set (`ifr_reqcap`)
    SetCapabilities(Capabilities),
    GetMedia,
    SetMedia(MediaWord),
    GetFib,
    SetFib(u32),
    SetLinkAddr(MacAddr),
    GetGroups,
    AddGroup(String),
    DeleteGroup(String),
    GetAddresses,
    AddAddress(IfAddr),
    DeleteAddress(Ipv4Addr),
    GetMtu,
    SetMtu(u32),
    GetCounters,
    /// Clone-create; the target name is the cloner (e.g. `bridge`) or a full unit name.
    Create,
    Destroy,
    Rename(String),
}

impl IfRequest {
    /// Name of the underlying kernel request, for logs and errors.
    pub fn op(&self) -> &'static str {
        match self {
            IfRequest::GetLink => "getifaddrs",
            IfRequest::GetFlags => "SIOCGIFFLAGS",
            IfRequest::SetFlags(_) => "SIOCSIFFLAGS",
            IfRequest::GetCapabilities => "SIOCGIFCAP",
            IfRequest::SetCapabilities(_) => "SIOCSIFCAP",
            IfRequest::GetMedia => "SIOCGIFMEDIA",
            IfRequest::SetMedia(_) => "SIOCSIFMEDIA",
            IfRequest::GetFib => "SIOCGIFFIB",
            IfRequest::SetFib(_) => "SIOCSIFFIB",
            IfRequest::SetLinkAddr(_) => "SIOCSIFLLADDR",
            IfRequest::GetGroups => "SIOCGIFGROUP",
            IfRequest::AddGroup(_) => "SIOCAIFGROUP",
            IfRequest::DeleteGroup(_) => "SIOCDIFGROUP",
            IfRequest::GetAddresses => "getifaddrs",
            IfRequest::AddAddress(_) => "SIOCAIFADDR",
            IfRequest::DeleteAddress(_) => "SIOCDIFADDR",
            IfRequest::GetMtu => "SIOCGIFMTU",
            IfRequest::SetMtu(_) => "SIOCSIFMTU",
            IfRequest::GetCounters => "SIOCGIFDATA",
            IfRequest::Create => "SIOCIFCREATE",
            IfRequest::Destroy => "SIOCIFDESTROY",
            IfRequest::Rename(_) => "SIOCSIFNAME",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IfReply {
    Done,
    Link(LinkInfo),
    Flags(IfFlags),
    Capabilities(CapabilitySet),
    Media(MediaReport),
    Fib(u32),
    Groups(Vec<String>),
    Addresses(Vec<IfAddr>),
    Mtu(u32),
    Counters(IfCounters),
    /// Name the kernel assigned to a new clone
    Created(String),
}

/// One bridge member as reported by `BRDGGIFS` / `BRDGGIFFLGS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: String,
    pub flags: PortFlags,
    /// Kernel `BSTP_IFSTATE_*`
    pub stp_state: u8,
    pub port_no: u8,
    pub priority: u8,
    pub path_cost: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeOp {
    AddMember(String),
    DeleteMember(String),
    ListMembers,
    GetMember(String),
    SetMemberFlags { member: String, flags: PortFlags },
}

impl BridgeOp {
    pub fn op(&self) -> &'static str {
        match self {
            BridgeOp::AddMember(_) => "BRDGADD",
            BridgeOp::DeleteMember(_) => "BRDGDEL",
            BridgeOp::ListMembers => "BRDGGIFS",
            BridgeOp::GetMember(_) => "BRDGGIFFLGS",
            BridgeOp::SetMemberFlags { .. } => "BRDGSIFFLGS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Done,
    Members(Vec<MemberInfo>),
    Member(MemberInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysctlKind {
    Int,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysctlValue {
    Int(i64),
    String(String),
}

impl SysctlValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SysctlValue::Int(v) => Some(*v),
            SysctlValue::String(s) => s.trim().parse().ok(),
        }
    }
}

/// ALTQ queue operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AltqOp {
    Add(QueueConfig),
    Remove(String),
    SetEnabled { name: String, enabled: bool },
    List,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    pub config: QueueConfig,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AltqReply {
    Done,
    Queues(Vec<QueueStatus>),
}

/// An open netmap port and its ring geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetmapHandle {
    pub id: u32,
    pub ifname: String,
    pub tx_rings: u16,
    pub rx_rings: u16,
    pub tx_slots: u32,
    pub rx_slots: u32,
}

impl NetmapHandle {
    pub fn rings(&self, dir: Direction) -> u16 {
        match dir {
            Direction::Tx => self.tx_rings,
            Direction::Rx => self.rx_rings,
        }
    }
}

/// Transport to the kernel's network configuration interfaces.
///
/// Implementations never cache kernel state: each call reflects the
/// kernel at the time it is made.
pub trait Kernel: Send + Sync {
    /// Short binding name for logs.
    fn name(&self) -> &'static str;

    fn links(&self) -> Result<Vec<LinkInfo>>;

    fn ioctl_interface(&self, name: &str, request: IfRequest) -> Result<IfReply>;

    fn ioctl_bridge(&self, bridge: &str, op: BridgeOp) -> Result<BridgeReply>;

    fn sysctl_get(&self, key: &str, kind: SysctlKind) -> Result<SysctlValue>;

    fn sysctl_set(&self, key: &str, value: &SysctlValue) -> Result<()>;

    fn altq(&self, op: AltqOp) -> Result<AltqReply>;

    fn netmap_open(&self, ifname: &str) -> Result<NetmapHandle>;

    fn netmap_ring(&self, handle: &NetmapHandle, dir: Direction, ring: u16) -> Result<RingState>;

    /// Return slots up to (not including) `head` to the kernel.
    fn netmap_release(
        &self,
        handle: &NetmapHandle,
        dir: Direction,
        ring: u16,
        head: u32,
    ) -> Result<()>;

    fn netmap_sync(&self, handle: &NetmapHandle, dir: Direction) -> Result<()>;

    fn netmap_close(&self, handle: &NetmapHandle) -> Result<()>;
}

/// Translate a failed kernel call into the crate error taxonomy.
///
/// `what` names the object `target` refers to ("interface", "sysctl", ...).
pub fn translate(op: &'static str, what: &'static str, target: &str, err: io::Error) -> Error {
    match err.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::ENOENT) | Some(libc::ENODEV) => Error::NotFound {
            what,
            name: target.to_string(),
        },
        Some(libc::EEXIST) => Error::AlreadyExists(target.to_string()),
        _ => Error::Kernel { op, source: err },
    }
}

/// Translate a failed per-interface request, naming the object the errno
/// refers to for that request.
pub fn interface_error(ifname: &str, request: &IfRequest, err: io::Error) -> Error {
    let op = request.op();
    match (err.raw_os_error(), request) {
        (Some(libc::ENXIO) | Some(libc::ENODEV), _) => Error::interface_not_found(ifname),
        (Some(libc::ENOENT), IfRequest::DeleteGroup(group)) => Error::NotFound {
            what: "group",
            name: format!("{} on {}", group, ifname),
        },
        (Some(libc::ENOENT) | Some(libc::EADDRNOTAVAIL), IfRequest::DeleteAddress(addr)) => {
            Error::NotFound {
                what: "address",
                name: format!("{} on {}", addr, ifname),
            }
        }
        (Some(libc::ENOENT), _) => Error::interface_not_found(ifname),
        (Some(libc::EEXIST), IfRequest::Rename(new_name)) => {
            Error::AlreadyExists(format!("interface {}", new_name))
        }
        (Some(libc::EEXIST), IfRequest::AddGroup(group)) => {
            Error::AlreadyExists(format!("group {} on {}", group, ifname))
        }
        (Some(libc::EEXIST), IfRequest::AddAddress(addr)) => {
            Error::AlreadyExists(format!("address {} on {}", addr, ifname))
        }
        (Some(libc::EEXIST), _) => Error::AlreadyExists(format!("interface {}", ifname)),
        (Some(libc::EINVAL), IfRequest::Create) => Error::UnsupportedType(ifname.to_string()),
        _ => Error::Kernel { op, source: err },
    }
}

/// Translate a failed bridge request.
pub fn bridge_error(bridge: &str, op: &BridgeOp, err: io::Error) -> Error {
    let member = match op {
        BridgeOp::AddMember(m) | BridgeOp::DeleteMember(m) | BridgeOp::GetMember(m) => Some(m),
        BridgeOp::SetMemberFlags { member, .. } => Some(member),
        BridgeOp::ListMembers => None,
    };
    match (err.raw_os_error(), member) {
        (Some(libc::ENXIO) | Some(libc::ENODEV), _) => Error::interface_not_found(bridge),
        // BRDGADD reports a missing member interface as ENOENT too
        (Some(libc::ENOENT), Some(m)) if matches!(op, BridgeOp::AddMember(_)) => {
            Error::interface_not_found(m.as_str())
        }
        (Some(libc::ENOENT), Some(m)) => Error::NotFound {
            what: "bridge member",
            name: format!("{} on {}", m, bridge),
        },
        (Some(libc::EEXIST), Some(m)) => {
            Error::AlreadyExists(format!("member {} on {}", m, bridge))
        }
        _ => Error::Kernel {
            op: op.op(),
            source: err,
        },
    }
}

pub(crate) fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

pub(crate) fn unexpected_reply(op: &'static str, reply: &dyn std::fmt::Debug) -> Error {
    Error::Kernel {
        op,
        source: io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected reply {:?}", reply),
        ),
    }
}

/// Unwrap one variant of a reply enum or fail with a kernel error.
macro_rules! expect_reply {
    ($reply:expr, $variant:path, $op:expr) => {
        match $reply {
            $variant(value) => Ok(value),
            other => Err($crate::kernel::unexpected_reply($op, &other)),
        }
    };
}
pub(crate) use expect_reply;

/// Open the kernel binding selected by configuration.
pub fn open(backend: KernelBackend, simulated: &SimulatedConfig) -> Result<Arc<dyn Kernel>> {
    match backend {
        KernelBackend::Simulated => {
            info!("using simulated kernel binding");
            Ok(Arc::new(SimKernel::from_config(simulated)?))
        }
        KernelBackend::Freebsd => open_native(),
        KernelBackend::Auto => {
            if cfg!(target_os = "freebsd") {
                open_native()
            } else {
                warn!("not running on FreeBSD, falling back to the simulated kernel binding");
                Ok(Arc::new(SimKernel::from_config(simulated)?))
            }
        }
    }
}

#[cfg(target_os = "freebsd")]
fn open_native() -> Result<Arc<dyn Kernel>> {
    Ok(Arc::new(FreeBsdKernel::open()?))
}

#[cfg(not(target_os = "freebsd"))]
fn open_native() -> Result<Arc<dyn Kernel>> {
    Err(Error::NotSupported(
        "the FreeBSD kernel binding on this operating system".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_errno() {
        assert!(matches!(
            translate("SIOCGIFFLAGS", "interface", "em9", errno(libc::ENXIO)),
            Error::NotFound { what: "interface", .. }
        ));
        assert!(matches!(
            translate("SIOCIFCREATE", "interface", "lo1", errno(libc::EEXIST)),
            Error::AlreadyExists(name) if name == "lo1"
        ));
        assert!(matches!(
            translate("SIOCSIFMTU", "interface", "em0", errno(libc::EINVAL)),
            Error::Kernel { op: "SIOCSIFMTU", .. }
        ));
    }

    #[test]
    fn test_interface_error_names_the_right_object() {
        let err = interface_error(
            "em0",
            &IfRequest::DeleteGroup("lan".into()),
            errno(libc::ENOENT),
        );
        assert!(matches!(err, Error::NotFound { what: "group", .. }));

        let err = interface_error(
            "em0",
            &IfRequest::DeleteGroup("lan".into()),
            errno(libc::ENXIO),
        );
        assert!(matches!(err, Error::NotFound { what: "interface", .. }));

        let err = interface_error("bridge", &IfRequest::Create, errno(libc::EINVAL));
        assert!(matches!(err, Error::UnsupportedType(_)));

        let err = interface_error("em0", &IfRequest::Rename("wan".into()), errno(libc::EEXIST));
        assert_eq!(err.to_string(), "interface wan already exists");
    }

    #[test]
    fn test_bridge_error() {
        let err = bridge_error("bridge0", &BridgeOp::AddMember("em7".into()), errno(libc::ENOENT));
        assert!(matches!(err, Error::NotFound { what: "interface", ref name } if name == "em7"));

        let err = bridge_error(
            "bridge0",
            &BridgeOp::DeleteMember("em1".into()),
            errno(libc::ENOENT),
        );
        assert!(matches!(err, Error::NotFound { what: "bridge member", .. }));
    }

    #[test]
    fn test_sysctl_value_as_int() {
        assert_eq!(SysctlValue::Int(4).as_int(), Some(4));
        assert_eq!(SysctlValue::String(" 16 ".into()).as_int(), Some(16));
        assert_eq!(SysctlValue::String("radix4".into()).as_int(), None);
    }

    #[test]
    fn test_open_simulated() {
        let kernel = open(KernelBackend::Simulated, &SimulatedConfig::default()).unwrap();
        assert_eq!(kernel.name(), "simulated");
        assert!(!kernel.links().unwrap().is_empty());
    }

    #[cfg(not(target_os = "freebsd"))]
    #[test]
    fn test_open_freebsd_elsewhere_fails() {
        assert!(matches!(
            open(KernelBackend::Freebsd, &SimulatedConfig::default()),
            Err(Error::NotSupported(_))
        ));
    }
}
