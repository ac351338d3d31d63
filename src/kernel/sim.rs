//! In-memory kernel binding
//!
//! Mimics the FreeBSD kernel closely enough that the rest of the crate can
//! run unchanged on top of it: the same errno values are produced for the
//! same mistakes and go through the same translation functions.

use super::{
    bridge_error, errno, interface_error, translate, AltqOp, AltqReply, BridgeOp, BridgeReply,
    IfCounters, IfReply, IfRequest, Kernel, LinkInfo, MemberInfo, NetmapHandle, QueueStatus,
    SysctlKind, SysctlValue,
};
use crate::addr::{IfAddr, MacAddr};
use crate::bridge::{bstp, PortFlags};
use crate::config::SimulatedConfig;
use crate::iface::kind::{driver_name, ift};
use crate::iface::media::{IFM_ACTIVE, IFM_AVALID, IFM_ETHER, IFM_FDX, IFM_HDX, IFM_IEEE80211};
use crate::iface::{
    CapabilitySet, Capabilities, IfFlags, InterfaceKind, MediaReport, MediaWord, TunnelKind,
};
use crate::netmap::{Direction, RingState};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

const MIN_MTU: u32 = 72;
const MAX_MTU: u32 = 16384;
const NETMAP_RINGS: u16 = 2;
const NETMAP_SLOTS: u32 = 256;

/// Flags only the kernel may change.
const KERNEL_FLAGS: IfFlags = IfFlags::RUNNING
    .union(IfFlags::OACTIVE)
    .union(IfFlags::LOOPBACK)
    .union(IfFlags::BROADCAST)
    .union(IfFlags::POINTOPOINT)
    .union(IfFlags::SIMPLEX)
    .union(IfFlags::MULTICAST)
    .union(IfFlags::DYING)
    .union(IfFlags::RENAMING);

/// Member flags settable through `BRDGSIFFLGS`.
const SETTABLE_PORT_FLAGS: PortFlags = PortFlags::LEARNING
    .union(PortFlags::DISCOVER)
    .union(PortFlags::STP)
    .union(PortFlags::STICKY)
    .union(PortFlags::BSTP_EDGE)
    .union(PortFlags::BSTP_AUTOEDGE)
    .union(PortFlags::PRIVATE);

/// Seed description of a simulated interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimLink {
    pub name: String,
    pub kind: InterfaceKind,
    pub mac: Option<MacAddr>,
}

impl SimLink {
    pub fn new(name: impl Into<String>, kind: InterfaceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mac: None,
        }
    }

    pub fn with_mac(mut self, mac: MacAddr) -> Self {
        self.mac = Some(mac);
        self
    }
}

#[derive(Debug, Clone)]
struct SimMember {
    name: String,
    flags: PortFlags,
    port_no: u8,
}

#[derive(Debug, Clone)]
struct SimIface {
    index: u32,
    kind: InterfaceKind,
    lladdr: Option<MacAddr>,
    flags: IfFlags,
    caps: CapabilitySet,
    media: Option<MediaReport>,
    fib: u32,
    groups: Vec<String>,
    addrs: Vec<IfAddr>,
    mtu: u32,
    counters: IfCounters,
    cloned: bool,
    /// Other side of an epair
    peer: Option<String>,
    members: Vec<SimMember>,
}

#[derive(Debug)]
struct SimRing {
    state: RingState,
    /// Packets waiting in the "NIC" for an RX sync
    pending: u32,
}

#[derive(Debug)]
struct SimNetmap {
    ifname: String,
    tx: Vec<SimRing>,
    rx: Vec<SimRing>,
}

impl SimNetmap {
    fn rings_mut(&mut self, dir: Direction) -> &mut Vec<SimRing> {
        match dir {
            Direction::Tx => &mut self.tx,
            Direction::Rx => &mut self.rx,
        }
    }
}

#[derive(Debug)]
struct Sysctl {
    value: SysctlValue,
    writable: bool,
}

#[derive(Debug, Default)]
struct SimState {
    ifaces: BTreeMap<String, SimIface>,
    next_index: u32,
    sysctls: BTreeMap<String, Sysctl>,
    queues: Vec<QueueStatus>,
    netmap: HashMap<u32, SimNetmap>,
    next_handle: u32,
}

/// Kernel binding backed by in-process state.
#[derive(Debug)]
pub struct SimKernel {
    state: Mutex<SimState>,
}

impl Default for SimKernel {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SimKernel {
    /// A kernel with no interfaces and the default sysctl tree.
    pub fn empty() -> Self {
        let mut state = SimState {
            next_index: 1,
            next_handle: 1,
            ..Default::default()
        };
        for (key, value, writable) in [
            ("net.fibs", SysctlValue::Int(4), false),
            ("net.inet.ip.forwarding", SysctlValue::Int(0), true),
            ("net.inet6.ip6.forwarding", SysctlValue::Int(0), true),
            (
                "net.route.algo.inet.algo",
                SysctlValue::String("radix4_lockless".into()),
                true,
            ),
            (
                "net.route.algo.inet6.algo",
                SysctlValue::String("radix6_lockless".into()),
                true,
            ),
            ("net.link.ifqmaxlen", SysctlValue::Int(50), false),
            ("net.inet.ip.intr_queue_maxlen", SysctlValue::Int(256), true),
            ("kern.features.altq", SysctlValue::Int(1), false),
        ] {
            state
                .sysctls
                .insert(key.to_string(), Sysctl { value, writable });
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// `lo0`, `em0` (up) and `em1` (down).
    pub fn with_defaults() -> Self {
        let kernel = Self::empty();
        for link in default_links() {
            kernel.add_link(link);
        }
        kernel
    }

    pub fn from_config(config: &SimulatedConfig) -> Result<Self> {
        if config.interfaces.is_empty() {
            return Ok(Self::with_defaults());
        }
        let kernel = Self::empty();
        for seed in &config.interfaces {
            let kind: InterfaceKind = seed.kind.parse().map_err(|_| {
                Error::Config(format!(
                    "simulated interface {}: unknown type '{}'",
                    seed.name, seed.kind
                ))
            })?;
            let mut link = SimLink::new(seed.name.clone(), kind);
            if let Some(mac) = &seed.mac {
                let mac: MacAddr = mac.parse().map_err(|e| {
                    Error::Config(format!("simulated interface {}: {}", seed.name, e))
                })?;
                link = link.with_mac(mac);
            }
            if !kernel.add_link(link) {
                return Err(Error::Config(format!(
                    "simulated interface {} declared twice",
                    seed.name
                )));
            }
        }
        Ok(kernel)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make an interface appear as if a driver attached it. Returns false if
    /// the name is taken.
    pub fn add_link(&self, link: SimLink) -> bool {
        let mut state = self.state();
        if state.ifaces.contains_key(&link.name) {
            return false;
        }
        // lo0 is the stack's own loopback and never accepts SIOCIFDESTROY
        let cloned = link.kind.profile().cloner.is_some() && link.name != "lo0";
        let mut iface = state.new_iface(link.kind, cloned);
        if let Some(mac) = link.mac {
            iface.lladdr = Some(mac);
        }
        match link.kind {
            InterfaceKind::Loopback => {
                iface.flags |= IfFlags::UP | IfFlags::RUNNING;
                iface.addrs.push(IfAddr {
                    addr: Ipv4Addr::LOCALHOST,
                    prefix_len: 8,
                });
            }
            InterfaceKind::Ethernet if link.name.ends_with('0') => {
                iface.flags |= IfFlags::UP | IfFlags::RUNNING;
            }
            _ => {}
        }
        state.ifaces.insert(link.name, iface);
        true
    }

    /// Make an interface vanish behind the process's back.
    pub fn remove_link(&self, name: &str) -> bool {
        let mut state = self.state();
        let removed = state.ifaces.remove(name).is_some();
        if removed {
            state.forget_member(name);
        }
        removed
    }

    /// Queue `count` packets for reception on every open netmap RX ring
    /// `ring` of `ifname`.
    pub fn inject_rx(&self, ifname: &str, ring: u16, count: u32) {
        let mut state = self.state();
        let mut delivered = false;
        for port in state.netmap.values_mut() {
            if port.ifname == ifname {
                if let Some(r) = port.rx.get_mut(usize::from(ring)) {
                    r.pending += count;
                    delivered = true;
                }
            }
        }
        if !delivered {
            if let Some(iface) = state.ifaces.get_mut(ifname) {
                iface.counters.iqdrops += u64::from(count);
            }
        }
    }

    /// Change a sysctl regardless of whether it is writable.
    pub fn set_sysctl(&self, key: &str, value: SysctlValue) {
        let mut state = self.state();
        match state.sysctls.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                state.sysctls.insert(
                    key.to_string(),
                    Sysctl {
                        value,
                        writable: true,
                    },
                );
            }
        }
    }

    /// Account traffic on an interface.
    pub fn add_counters(&self, ifname: &str, delta: IfCounters) {
        if let Some(iface) = self.state().ifaces.get_mut(ifname) {
            let c = &mut iface.counters;
            c.ipackets += delta.ipackets;
            c.ierrors += delta.ierrors;
            c.opackets += delta.opackets;
            c.oerrors += delta.oerrors;
            c.ibytes += delta.ibytes;
            c.obytes += delta.obytes;
            c.iqdrops += delta.iqdrops;
            c.oqdrops += delta.oqdrops;
        }
    }

    pub fn open_netmap_handles(&self) -> usize {
        self.state().netmap.len()
    }
}

fn default_links() -> Vec<SimLink> {
    vec![
        SimLink::new("lo0", InterfaceKind::Loopback),
        SimLink::new("em0", InterfaceKind::Ethernet)
            .with_mac(MacAddr([0x00, 0x0c, 0x29, 0x3e, 0x5a, 0x01])),
        SimLink::new("em1", InterfaceKind::Ethernet)
            .with_mac(MacAddr([0x00, 0x0c, 0x29, 0x3e, 0x5a, 0x02])),
    ]
}

fn default_flags(kind: InterfaceKind) -> IfFlags {
    use InterfaceKind::*;
    match kind {
        Loopback => IfFlags::LOOPBACK | IfFlags::MULTICAST,
        Tunnel(TunnelKind::Gif) | Tunnel(TunnelKind::Gre) => {
            IfFlags::POINTOPOINT | IfFlags::MULTICAST
        }
        Pflog | Pfsync => IfFlags::empty(),
        _ => IfFlags::BROADCAST | IfFlags::SIMPLEX | IfFlags::MULTICAST,
    }
}

fn default_caps(kind: InterfaceKind) -> CapabilitySet {
    use InterfaceKind::*;
    let (supported, enabled) = match kind {
        Ethernet => (
            Capabilities::RXCSUM
                | Capabilities::TXCSUM
                | Capabilities::VLAN_MTU
                | Capabilities::VLAN_HWTAGGING
                | Capabilities::TSO4
                | Capabilities::LRO
                | Capabilities::LINKSTATE,
            Capabilities::RXCSUM | Capabilities::TXCSUM | Capabilities::LINKSTATE,
        ),
        Loopback => {
            let caps = Capabilities::RXCSUM
                | Capabilities::TXCSUM
                | Capabilities::RXCSUM_IPV6
                | Capabilities::TXCSUM_IPV6
                | Capabilities::LINKSTATE;
            (caps, caps)
        }
        Epair => {
            let caps = Capabilities::VLAN_MTU | Capabilities::RXCSUM | Capabilities::TXCSUM;
            (caps, caps)
        }
        Vlan | Lagg => (
            Capabilities::RXCSUM | Capabilities::TXCSUM | Capabilities::LINKSTATE,
            Capabilities::LINKSTATE,
        ),
        Tunnel(_) => (Capabilities::LINKSTATE, Capabilities::LINKSTATE),
        _ => (Capabilities::empty(), Capabilities::empty()),
    };
    CapabilitySet { supported, enabled }
}

fn ether(subtype: i32, options: i32) -> MediaWord {
    MediaWord(IFM_ETHER | subtype | options)
}

fn default_media(kind: InterfaceKind) -> Option<MediaReport> {
    use InterfaceKind::*;
    let report = match kind {
        Ethernet => MediaReport {
            current: MediaWord::ETHER_AUTO,
            active: ether(16, IFM_FDX),
            status: IFM_AVALID | IFM_ACTIVE,
            supported: vec![
                MediaWord::ETHER_AUTO,
                ether(16, IFM_FDX),
                ether(6, IFM_FDX),
                ether(6, IFM_HDX),
                ether(6, 0),
                ether(3, IFM_FDX),
                ether(3, IFM_HDX),
                ether(3, 0),
            ],
        },
        Epair => MediaReport {
            current: ether(26, IFM_FDX),
            active: ether(26, IFM_FDX),
            status: IFM_AVALID | IFM_ACTIVE,
            supported: vec![ether(26, IFM_FDX)],
        },
        Vlan | Lagg => MediaReport {
            current: MediaWord::ETHER_AUTO,
            active: MediaWord::ETHER_AUTO,
            status: IFM_AVALID,
            supported: vec![MediaWord::ETHER_AUTO],
        },
        Wireless => {
            let auto = MediaWord(IFM_IEEE80211);
            MediaReport {
                current: auto,
                active: auto,
                status: IFM_AVALID,
                supported: vec![auto],
            }
        }
        _ => return None,
    };
    Some(report)
}

fn generated_mac(index: u32) -> MacAddr {
    let [_, a, b, c] = index.to_be_bytes();
    MacAddr([0x58, 0x9c, 0xfc, a, b, c])
}

fn valid_ifname(name: &str) -> bool {
    !name.is_empty()
        && name.len() < super::ioctl::IFNAMSIZ
        && name.bytes().all(|b| b.is_ascii_graphic())
}

fn new_ring(dir: Direction) -> SimRing {
    let tail = match dir {
        Direction::Tx => NETMAP_SLOTS - 1,
        Direction::Rx => 0,
    };
    SimRing {
        state: RingState {
            num_slots: NETMAP_SLOTS,
            head: 0,
            cur: 0,
            tail,
        },
        pending: 0,
    }
}

impl SimState {
    fn new_iface(&mut self, kind: InterfaceKind, cloned: bool) -> SimIface {
        let index = self.next_index;
        self.next_index += 1;
        let profile = kind.profile();
        SimIface {
            index,
            kind,
            lladdr: profile.has_lladdr.then(|| generated_mac(index)),
            flags: default_flags(kind),
            caps: default_caps(kind),
            media: default_media(kind),
            fib: 0,
            groups: Vec::new(),
            addrs: Vec::new(),
            mtu: if kind == InterfaceKind::Loopback {
                MAX_MTU
            } else {
                1500
            },
            counters: IfCounters::default(),
            cloned,
            peer: None,
            members: Vec::new(),
        }
    }

    fn iface(&self, name: &str) -> io::Result<&SimIface> {
        self.ifaces.get(name).ok_or_else(|| errno(libc::ENXIO))
    }

    fn iface_mut(&mut self, name: &str) -> io::Result<&mut SimIface> {
        self.ifaces.get_mut(name).ok_or_else(|| errno(libc::ENXIO))
    }

    fn fibs(&self) -> u32 {
        self.sysctls
            .get("net.fibs")
            .and_then(|s| s.value.as_int())
            .map_or(1, |n| n.max(1) as u32)
    }

    fn bridge_of(&self, member: &str) -> Option<&str> {
        self.ifaces
            .iter()
            .find(|(_, iface)| iface.members.iter().any(|m| m.name == member))
            .map(|(name, _)| name.as_str())
    }

    fn forget_member(&mut self, member: &str) {
        for iface in self.ifaces.values_mut() {
            iface.members.retain(|m| m.name != member);
        }
    }

    fn interface_request(&mut self, name: &str, request: &IfRequest) -> io::Result<IfReply> {
        match request {
            IfRequest::Create => return self.clone_create(name),
            IfRequest::Rename(new_name) => return self.rename(name, new_name),
            IfRequest::Destroy => return self.destroy(name),
            _ => {}
        }
        let fibs = self.fibs();
        let iface = self.iface_mut(name)?;
        let reply = match request {
            IfRequest::GetLink => IfReply::Link(LinkInfo {
                name: name.to_string(),
                index: iface.index,
                if_type: iface.kind.if_type(),
                lladdr: iface.lladdr,
            }),
            IfRequest::GetFlags => IfReply::Flags(iface.flags),
            IfRequest::SetFlags(flags) => {
                let mut next = (*flags - KERNEL_FLAGS) | (iface.flags & KERNEL_FLAGS);
                next.set(IfFlags::RUNNING, next.contains(IfFlags::UP));
                iface.flags = next;
                IfReply::Done
            }
            IfRequest::GetCapabilities => IfReply::Capabilities(iface.caps),
            IfRequest::SetCapabilities(requested) => {
                if !iface.caps.supported.contains(*requested) {
                    return Err(errno(libc::EINVAL));
                }
                iface.caps.enabled = *requested;
                IfReply::Done
            }
            IfRequest::GetMedia => match &iface.media {
                Some(media) => IfReply::Media(media.clone()),
                None => return Err(errno(libc::EINVAL)),
            },
            IfRequest::SetMedia(word) => {
                let media = iface.media.as_mut().ok_or_else(|| errno(libc::EINVAL))?;
                if !media.supported.contains(word) {
                    return Err(errno(libc::EINVAL));
                }
                media.current = *word;
                if *word != MediaWord::ETHER_AUTO {
                    media.active = *word;
                }
                IfReply::Done
            }
            IfRequest::GetFib => IfReply::Fib(iface.fib),
            IfRequest::SetFib(fib) => {
                if *fib >= fibs {
                    return Err(errno(libc::EINVAL));
                }
                iface.fib = *fib;
                IfReply::Done
            }
            IfRequest::SetLinkAddr(mac) => {
                if iface.lladdr.is_none() || !mac.is_assignable() {
                    return Err(errno(libc::EINVAL));
                }
                iface.lladdr = Some(*mac);
                IfReply::Done
            }
            IfRequest::GetGroups => IfReply::Groups(iface.groups.clone()),
            IfRequest::AddGroup(group) => {
                if group.is_empty()
                    || group.len() >= super::ioctl::IFNAMSIZ
                    || group.ends_with(|c: char| c.is_ascii_digit())
                {
                    return Err(errno(libc::EINVAL));
                }
                if iface.groups.contains(group) {
                    return Err(errno(libc::EEXIST));
                }
                iface.groups.push(group.clone());
                IfReply::Done
            }
            IfRequest::DeleteGroup(group) => {
                let pos = iface
                    .groups
                    .iter()
                    .position(|g| g == group)
                    .ok_or_else(|| errno(libc::ENOENT))?;
                iface.groups.remove(pos);
                IfReply::Done
            }
            IfRequest::GetAddresses => IfReply::Addresses(iface.addrs.clone()),
            IfRequest::AddAddress(addr) => {
                if iface.addrs.iter().any(|a| a.addr == addr.addr) {
                    return Err(errno(libc::EEXIST));
                }
                iface.addrs.push(*addr);
                IfReply::Done
            }
            IfRequest::DeleteAddress(addr) => {
                let pos = iface
                    .addrs
                    .iter()
                    .position(|a| a.addr == *addr)
                    .ok_or_else(|| errno(libc::EADDRNOTAVAIL))?;
                iface.addrs.remove(pos);
                IfReply::Done
            }
            IfRequest::GetMtu => IfReply::Mtu(iface.mtu),
            IfRequest::SetMtu(mtu) => {
                if !(MIN_MTU..=MAX_MTU).contains(mtu) {
                    return Err(errno(libc::EINVAL));
                }
                iface.mtu = *mtu;
                IfReply::Done
            }
            IfRequest::GetCounters => IfReply::Counters(iface.counters),
            IfRequest::Create | IfRequest::Rename(_) | IfRequest::Destroy => {
                return Err(errno(libc::EINVAL));
            }
        };
        Ok(reply)
    }

    /// `name` is either a bare cloner (`bridge`) or a full unit name (`bridge7`).
    fn clone_create(&mut self, name: &str) -> io::Result<IfReply> {
        let driver = driver_name(name);
        let kind = InterfaceKind::ALL
            .into_iter()
            .find(|k| k.profile().cloner == Some(driver))
            .ok_or_else(|| errno(libc::EINVAL))?;
        let mut unit_text = &name[driver.len()..];
        if kind == InterfaceKind::Epair {
            unit_text = unit_text.trim_end_matches('a');
        }

        let unit = if unit_text.is_empty() {
            (0u32..)
                .find(|unit| !self.unit_taken(kind, driver, *unit))
                .ok_or_else(|| errno(libc::ENOSPC))?
        } else {
            let unit: u32 = unit_text.parse().map_err(|_| errno(libc::EINVAL))?;
            if self.unit_taken(kind, driver, unit) {
                return Err(errno(libc::EEXIST));
            }
            unit
        };

        let created = if kind == InterfaceKind::Epair {
            let a = format!("{}{}a", driver, unit);
            let b = format!("{}{}b", driver, unit);
            let mut side_a = self.new_iface(kind, true);
            let mut side_b = self.new_iface(kind, true);
            side_a.peer = Some(b.clone());
            side_b.peer = Some(a.clone());
            side_a.groups.push(driver.to_string());
            side_b.groups.push(driver.to_string());
            self.ifaces.insert(a.clone(), side_a);
            self.ifaces.insert(b, side_b);
            a
        } else {
            let full = format!("{}{}", driver, unit);
            let mut iface = self.new_iface(kind, true);
            iface.groups.push(driver.to_string());
            self.ifaces.insert(full.clone(), iface);
            full
        };
        Ok(IfReply::Created(created))
    }

    fn unit_taken(&self, kind: InterfaceKind, driver: &str, unit: u32) -> bool {
        if kind == InterfaceKind::Epair {
            let a = format!("{}{}a", driver, unit);
            let b = format!("{}{}b", driver, unit);
            self.ifaces.contains_key(&a) || self.ifaces.contains_key(&b)
        } else {
            self.ifaces.contains_key(&format!("{}{}", driver, unit))
        }
    }

    fn rename(&mut self, name: &str, new_name: &str) -> io::Result<IfReply> {
        self.iface(name)?;
        if !valid_ifname(new_name) {
            return Err(errno(libc::EINVAL));
        }
        if self.ifaces.contains_key(new_name) {
            return Err(errno(libc::EEXIST));
        }
        let iface = self.ifaces.remove(name).ok_or_else(|| errno(libc::ENXIO))?;
        if let Some(peer) = iface.peer.as_ref().and_then(|p| self.ifaces.get_mut(p)) {
            peer.peer = Some(new_name.to_string());
        }
        for other in self.ifaces.values_mut() {
            for member in other.members.iter_mut().filter(|m| m.name == name) {
                member.name = new_name.to_string();
            }
        }
        for port in self.netmap.values_mut().filter(|p| p.ifname == name) {
            port.ifname = new_name.to_string();
        }
        self.ifaces.insert(new_name.to_string(), iface);
        Ok(IfReply::Done)
    }

    fn destroy(&mut self, name: &str) -> io::Result<IfReply> {
        let iface = self.iface(name)?;
        if !iface.cloned {
            return Err(errno(libc::EINVAL));
        }
        let peer = iface.peer.clone();
        for gone in std::iter::once(name.to_string()).chain(peer) {
            self.ifaces.remove(&gone);
            self.forget_member(&gone);
        }
        Ok(IfReply::Done)
    }

    fn bridge_request(&mut self, bridge: &str, op: &BridgeOp) -> io::Result<BridgeReply> {
        if self.iface(bridge)?.kind != InterfaceKind::Bridge {
            return Err(errno(libc::EINVAL));
        }
        match op {
            BridgeOp::AddMember(member) => {
                if member == bridge {
                    return Err(errno(libc::EINVAL));
                }
                let (if_type, index) = match self.ifaces.get(member) {
                    Some(m) => (m.kind.if_type(), m.index),
                    None => return Err(errno(libc::ENOENT)),
                };
                if !matches!(if_type, ift::ETHER | ift::L2VLAN | ift::GIF) {
                    return Err(errno(libc::EINVAL));
                }
                match self.bridge_of(member) {
                    Some(owner) if owner == bridge => return Err(errno(libc::EEXIST)),
                    Some(_) => return Err(errno(libc::EBUSY)),
                    None => {}
                }
                self.iface_mut(bridge)?.members.push(SimMember {
                    name: member.clone(),
                    flags: PortFlags::LEARNING | PortFlags::DISCOVER,
                    port_no: index as u8,
                });
                Ok(BridgeReply::Done)
            }
            BridgeOp::DeleteMember(member) => {
                let members = &mut self.iface_mut(bridge)?.members;
                let pos = members
                    .iter()
                    .position(|m| &m.name == member)
                    .ok_or_else(|| errno(libc::ENOENT))?;
                members.remove(pos);
                Ok(BridgeReply::Done)
            }
            BridgeOp::ListMembers => {
                let members = self.iface(bridge)?.members.iter().map(member_info).collect();
                Ok(BridgeReply::Members(members))
            }
            BridgeOp::GetMember(member) => self
                .iface(bridge)?
                .members
                .iter()
                .find(|m| &m.name == member)
                .map(|m| BridgeReply::Member(member_info(m)))
                .ok_or_else(|| errno(libc::ENOENT)),
            BridgeOp::SetMemberFlags { member, flags } => {
                let entry = self
                    .iface_mut(bridge)?
                    .members
                    .iter_mut()
                    .find(|m| &m.name == member)
                    .ok_or_else(|| errno(libc::ENOENT))?;
                entry.flags = (*flags & SETTABLE_PORT_FLAGS) | (entry.flags - SETTABLE_PORT_FLAGS);
                Ok(BridgeReply::Done)
            }
        }
    }

    fn sysctl_get(&self, key: &str, kind: SysctlKind) -> io::Result<SysctlValue> {
        let entry = self.sysctls.get(key).ok_or_else(|| errno(libc::ENOENT))?;
        match (kind, &entry.value) {
            (SysctlKind::Int, SysctlValue::String(s)) => s
                .trim()
                .parse()
                .map(SysctlValue::Int)
                .map_err(|_| errno(libc::EINVAL)),
            (SysctlKind::String, SysctlValue::Int(v)) => Ok(SysctlValue::String(v.to_string())),
            (_, value) => Ok(value.clone()),
        }
    }

    fn sysctl_set(&mut self, key: &str, value: &SysctlValue) -> io::Result<()> {
        let entry = self.sysctls.get_mut(key).ok_or_else(|| errno(libc::ENOENT))?;
        if !entry.writable {
            return Err(errno(libc::EPERM));
        }
        if std::mem::discriminant(&entry.value) != std::mem::discriminant(value) {
            return Err(errno(libc::EINVAL));
        }
        entry.value = value.clone();
        Ok(())
    }

    fn altq(&mut self, op: AltqOp) -> Result<AltqReply> {
        let supported = self
            .sysctls
            .get("kern.features.altq")
            .and_then(|s| s.value.as_int())
            .unwrap_or(0);
        if supported == 0 {
            return Err(Error::NotSupported("ALTQ".to_string()));
        }
        let find = |queues: &[QueueStatus], name: &str| {
            queues
                .iter()
                .position(|q| q.config.name == name)
                .ok_or_else(|| Error::NotFound {
                    what: "queue",
                    name: name.to_string(),
                })
        };
        match op {
            AltqOp::Add(config) => {
                config.validate()?;
                if !self.ifaces.contains_key(&config.interface) {
                    return Err(Error::interface_not_found(config.interface.as_str()));
                }
                if self.queues.iter().any(|q| q.config.name == config.name) {
                    return Err(Error::AlreadyExists(format!("queue {}", config.name)));
                }
                self.queues.push(QueueStatus {
                    config,
                    enabled: false,
                });
                Ok(AltqReply::Done)
            }
            AltqOp::Remove(name) => {
                let pos = find(&self.queues, &name)?;
                self.queues.remove(pos);
                Ok(AltqReply::Done)
            }
            AltqOp::SetEnabled { name, enabled } => {
                let pos = find(&self.queues, &name)?;
                self.queues[pos].enabled = enabled;
                Ok(AltqReply::Done)
            }
            AltqOp::List => Ok(AltqReply::Queues(self.queues.clone())),
        }
    }

    fn netmap_port(&mut self, handle: &NetmapHandle) -> io::Result<&mut SimNetmap> {
        let port = self
            .netmap
            .get(&handle.id)
            .ok_or_else(|| errno(libc::EBADF))?;
        if !self.ifaces.contains_key(&port.ifname) {
            return Err(errno(libc::ENXIO));
        }
        self.netmap
            .get_mut(&handle.id)
            .ok_or_else(|| errno(libc::EBADF))
    }

    fn netmap_sync(&mut self, handle: &NetmapHandle, dir: Direction) -> io::Result<()> {
        let port = self.netmap_port(handle)?;
        let ifname = port.ifname.clone();
        let mut moved = 0u64;
        for ring in port.rings_mut(dir) {
            let n = ring.state.num_slots;
            match dir {
                Direction::Tx => {
                    let tail = (ring.state.head + n - 1) % n;
                    moved += u64::from((tail + n - ring.state.tail) % n);
                    ring.state.tail = tail;
                }
                Direction::Rx => {
                    let free = (ring.state.head + n - ring.state.tail - 1) % n;
                    let count = free.min(ring.pending);
                    ring.pending -= count;
                    ring.state.tail = (ring.state.tail + count) % n;
                    moved += u64::from(count);
                }
            }
        }
        if let Some(iface) = self.ifaces.get_mut(&ifname) {
            match dir {
                Direction::Tx => iface.counters.opackets += moved,
                Direction::Rx => iface.counters.ipackets += moved,
            }
        }
        Ok(())
    }
}

fn member_info(member: &SimMember) -> MemberInfo {
    let stp_state = if member.flags.contains(PortFlags::STP) {
        bstp::LISTENING
    } else {
        bstp::FORWARDING
    };
    MemberInfo {
        name: member.name.clone(),
        flags: member.flags,
        stp_state,
        port_no: member.port_no,
        priority: 128,
        path_cost: 20000,
    }
}

impl Kernel for SimKernel {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn links(&self) -> Result<Vec<LinkInfo>> {
        let state = self.state();
        let mut links: Vec<LinkInfo> = state
            .ifaces
            .iter()
            .map(|(name, iface)| LinkInfo {
                name: name.clone(),
                index: iface.index,
                if_type: iface.kind.if_type(),
                lladdr: iface.lladdr,
            })
            .collect();
        links.sort_by_key(|l| l.index);
        Ok(links)
    }

    fn ioctl_interface(&self, name: &str, request: IfRequest) -> Result<IfReply> {
        debug!("sim {} {}", request.op(), name);
        self.state()
            .interface_request(name, &request)
            .map_err(|e| interface_error(name, &request, e))
    }

    fn ioctl_bridge(&self, bridge: &str, op: BridgeOp) -> Result<BridgeReply> {
        debug!("sim {} {}", op.op(), bridge);
        self.state()
            .bridge_request(bridge, &op)
            .map_err(|e| bridge_error(bridge, &op, e))
    }

    fn sysctl_get(&self, key: &str, kind: SysctlKind) -> Result<SysctlValue> {
        self.state()
            .sysctl_get(key, kind)
            .map_err(|e| translate("sysctl", "sysctl", key, e))
    }

    fn sysctl_set(&self, key: &str, value: &SysctlValue) -> Result<()> {
        debug!("sim sysctl {}={:?}", key, value);
        self.state()
            .sysctl_set(key, value)
            .map_err(|e| translate("sysctl", "sysctl", key, e))
    }

    fn altq(&self, op: AltqOp) -> Result<AltqReply> {
        self.state().altq(op)
    }

    fn netmap_open(&self, ifname: &str) -> Result<NetmapHandle> {
        let mut state = self.state();
        if !state.ifaces.contains_key(ifname) {
            return Err(translate(
                "NIOCREGIF",
                "interface",
                ifname,
                errno(libc::ENXIO),
            ));
        }
        let id = state.next_handle;
        state.next_handle += 1;
        state.netmap.insert(
            id,
            SimNetmap {
                ifname: ifname.to_string(),
                tx: (0..NETMAP_RINGS).map(|_| new_ring(Direction::Tx)).collect(),
                rx: (0..NETMAP_RINGS).map(|_| new_ring(Direction::Rx)).collect(),
            },
        );
        Ok(NetmapHandle {
            id,
            ifname: ifname.to_string(),
            tx_rings: NETMAP_RINGS,
            rx_rings: NETMAP_RINGS,
            tx_slots: NETMAP_SLOTS,
            rx_slots: NETMAP_SLOTS,
        })
    }

    fn netmap_ring(&self, handle: &NetmapHandle, dir: Direction, ring: u16) -> Result<RingState> {
        let mut state = self.state();
        let port = state
            .netmap_port(handle)
            .map_err(|e| translate("netmap", "interface", &handle.ifname, e))?;
        port.rings_mut(dir)
            .get(usize::from(ring))
            .map(|r| r.state)
            .ok_or_else(|| Error::Kernel {
                op: "netmap",
                source: errno(libc::EINVAL),
            })
    }

    fn netmap_release(
        &self,
        handle: &NetmapHandle,
        dir: Direction,
        ring: u16,
        head: u32,
    ) -> Result<()> {
        let mut state = self.state();
        let port = state
            .netmap_port(handle)
            .map_err(|e| translate("netmap", "interface", &handle.ifname, e))?;
        let r = port
            .rings_mut(dir)
            .get_mut(usize::from(ring))
            .filter(|r| r.state.may_release_to(head))
            .ok_or_else(|| Error::Kernel {
                op: "netmap",
                source: errno(libc::EINVAL),
            })?;
        r.state.head = head;
        r.state.cur = head;
        Ok(())
    }

    fn netmap_sync(&self, handle: &NetmapHandle, dir: Direction) -> Result<()> {
        let op = match dir {
            Direction::Tx => "NIOCTXSYNC",
            Direction::Rx => "NIOCRXSYNC",
        };
        self.state()
            .netmap_sync(handle, dir)
            .map_err(|e| translate(op, "interface", &handle.ifname, e))
    }

    fn netmap_close(&self, handle: &NetmapHandle) -> Result<()> {
        self.state()
            .netmap
            .remove(&handle.id)
            .map(|_| ())
            .ok_or_else(|| Error::Kernel {
                op: "netmap close",
                source: errno(libc::EBADF),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::altq::QueueConfig;
    use crate::config::SimInterfaceConfig;

    fn get(kernel: &SimKernel, name: &str, request: IfRequest) -> Result<IfReply> {
        kernel.ioctl_interface(name, request)
    }

    #[test]
    fn test_default_links() {
        let kernel = SimKernel::with_defaults();
        let names: Vec<String> = kernel.links().unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["lo0", "em0", "em1"]);
    }

    #[test]
    fn test_clone_allocates_smallest_free_unit() {
        let kernel = SimKernel::with_defaults();
        let first = get(&kernel, "bridge", IfRequest::Create).unwrap();
        assert_eq!(first, IfReply::Created("bridge0".into()));
        get(&kernel, "bridge5", IfRequest::Create).unwrap();
        assert_eq!(
            get(&kernel, "bridge", IfRequest::Create).unwrap(),
            IfReply::Created("bridge1".into())
        );
        assert_eq!(
            get(&kernel, "lo", IfRequest::Create).unwrap(),
            IfReply::Created("lo1".into())
        );
        assert!(matches!(
            get(&kernel, "bridge5", IfRequest::Create),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_clone_unsupported_driver() {
        let kernel = SimKernel::with_defaults();
        assert!(matches!(
            get(&kernel, "wlan", IfRequest::Create),
            Err(Error::UnsupportedType(_))
        ));
        assert!(matches!(
            get(&kernel, "em", IfRequest::Create),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_epair_pairs_are_destroyed_together() {
        let kernel = SimKernel::with_defaults();
        let created = get(&kernel, "epair", IfRequest::Create).unwrap();
        assert_eq!(created, IfReply::Created("epair0a".into()));
        assert!(get(&kernel, "epair0b", IfRequest::GetFlags).is_ok());

        get(&kernel, "epair0b", IfRequest::Destroy).unwrap();
        assert!(matches!(
            get(&kernel, "epair0a", IfRequest::GetFlags),
            Err(Error::NotFound { what: "interface", .. })
        ));
    }

    #[test]
    fn test_physical_interfaces_cannot_be_destroyed() {
        let kernel = SimKernel::with_defaults();
        assert!(matches!(
            get(&kernel, "em0", IfRequest::Destroy),
            Err(Error::Kernel { op: "SIOCIFDESTROY", .. })
        ));
    }

    #[test]
    fn test_primary_loopback_cannot_be_destroyed() {
        let kernel = SimKernel::with_defaults();
        assert!(matches!(
            get(&kernel, "lo0", IfRequest::Destroy),
            Err(Error::Kernel { op: "SIOCIFDESTROY", .. })
        ));
        get(&kernel, "lo", IfRequest::Create).unwrap();
        get(&kernel, "lo1", IfRequest::Destroy).unwrap();
        assert!(get(&kernel, "lo0", IfRequest::GetFlags).is_ok());
    }

    #[test]
    fn test_flags_keep_kernel_bits() {
        let kernel = SimKernel::with_defaults();
        get(&kernel, "em1", IfRequest::SetFlags(IfFlags::UP)).unwrap();
        let flags = match get(&kernel, "em1", IfRequest::GetFlags).unwrap() {
            IfReply::Flags(f) => f,
            other => panic!("unexpected {other:?}"),
        };
        assert!(flags.contains(IfFlags::UP | IfFlags::RUNNING | IfFlags::BROADCAST));
    }

    #[test]
    fn test_fib_bounded_by_sysctl() {
        let kernel = SimKernel::with_defaults();
        get(&kernel, "em0", IfRequest::SetFib(3)).unwrap();
        assert!(matches!(
            get(&kernel, "em0", IfRequest::SetFib(4)),
            Err(Error::Kernel { op: "SIOCSIFFIB", .. })
        ));
    }

    #[test]
    fn test_groups_and_addresses() {
        let kernel = SimKernel::with_defaults();
        get(&kernel, "em0", IfRequest::AddGroup("lan".into())).unwrap();
        assert!(matches!(
            get(&kernel, "em0", IfRequest::AddGroup("lan".into())),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            get(&kernel, "em0", IfRequest::DeleteGroup("wan".into())),
            Err(Error::NotFound { what: "group", .. })
        ));

        let addr: IfAddr = "192.0.2.1/24".parse().unwrap();
        get(&kernel, "em0", IfRequest::AddAddress(addr)).unwrap();
        assert!(matches!(
            get(&kernel, "em0", IfRequest::DeleteAddress(Ipv4Addr::new(192, 0, 2, 9))),
            Err(Error::NotFound { what: "address", .. })
        ));
    }

    #[test]
    fn test_rename_collision() {
        let kernel = SimKernel::with_defaults();
        assert!(matches!(
            get(&kernel, "em0", IfRequest::Rename("em1".into())),
            Err(Error::AlreadyExists(_))
        ));
        get(&kernel, "em0", IfRequest::Rename("wan".into())).unwrap();
        assert!(get(&kernel, "wan", IfRequest::GetFlags).is_ok());
    }

    #[test]
    fn test_bridge_membership_rules() {
        let kernel = SimKernel::with_defaults();
        get(&kernel, "bridge", IfRequest::Create).unwrap();
        get(&kernel, "bridge", IfRequest::Create).unwrap();

        kernel
            .ioctl_bridge("bridge0", BridgeOp::AddMember("em0".into()))
            .unwrap();
        assert!(matches!(
            kernel.ioctl_bridge("bridge0", BridgeOp::AddMember("em0".into())),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            kernel.ioctl_bridge("bridge1", BridgeOp::AddMember("em0".into())),
            Err(Error::Kernel { op: "BRDGADD", .. })
        ));
        assert!(matches!(
            kernel.ioctl_bridge("bridge0", BridgeOp::AddMember("lo0".into())),
            Err(Error::Kernel { .. })
        ));
        assert!(matches!(
            kernel.ioctl_bridge("bridge0", BridgeOp::AddMember("em7".into())),
            Err(Error::NotFound { what: "interface", .. })
        ));

        match kernel.ioctl_bridge("bridge0", BridgeOp::GetMember("em0".into())) {
            Ok(BridgeReply::Member(m)) => {
                assert_eq!(m.flags, PortFlags::LEARNING | PortFlags::DISCOVER)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sysctl_rules() {
        let kernel = SimKernel::with_defaults();
        assert_eq!(
            kernel.sysctl_get("net.fibs", SysctlKind::Int).unwrap(),
            SysctlValue::Int(4)
        );
        assert!(matches!(
            kernel.sysctl_set("net.fibs", &SysctlValue::Int(8)),
            Err(Error::Kernel { op: "sysctl", .. })
        ));
        assert!(matches!(
            kernel.sysctl_get("net.nope", SysctlKind::Int),
            Err(Error::NotFound { what: "sysctl", .. })
        ));
        kernel
            .sysctl_set("net.inet.ip.forwarding", &SysctlValue::Int(1))
            .unwrap();
    }

    #[test]
    fn test_altq_queue_lifecycle() {
        let kernel = SimKernel::with_defaults();
        let config = QueueConfig::new("bulk", "em0", 10_000_000);
        kernel.altq(AltqOp::Add(config.clone())).unwrap();
        assert!(matches!(
            kernel.altq(AltqOp::Add(config)),
            Err(Error::AlreadyExists(_))
        ));
        kernel
            .altq(AltqOp::SetEnabled {
                name: "bulk".into(),
                enabled: true,
            })
            .unwrap();
        match kernel.altq(AltqOp::List).unwrap() {
            AltqReply::Queues(q) => assert!(q[0].enabled),
            other => panic!("unexpected {other:?}"),
        }

        kernel.set_sysctl("kern.features.altq", SysctlValue::Int(0));
        assert!(matches!(
            kernel.altq(AltqOp::List),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = SimulatedConfig {
            interfaces: vec![
                SimInterfaceConfig {
                    name: "igb0".into(),
                    kind: "ethernet".into(),
                    mac: Some("02:00:00:00:00:01".into()),
                },
                SimInterfaceConfig {
                    name: "bridge0".into(),
                    kind: "bridge".into(),
                    mac: None,
                },
            ],
        };
        let kernel = SimKernel::from_config(&config).unwrap();
        let links = kernel.links().unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].lladdr, Some("02:00:00:00:00:01".parse().unwrap()));

        let bad = SimulatedConfig {
            interfaces: vec![SimInterfaceConfig {
                name: "x0".into(),
                kind: "token-ring".into(),
                mac: None,
            }],
        };
        assert!(matches!(
            SimKernel::from_config(&bad),
            Err(Error::Config(_))
        ));
    }
}
