//! Bridges and their member ports
//!
//! FreeBSD runs the spanning tree protocol in the kernel and offers no way
//! to force a port into a given STP state. The administrative port state
//! kept here follows the classic STP sequence and is projected onto the
//! member flags the kernel does understand: a port only learns and floods
//! while forwarding.

use crate::iface::InterfaceKind;
use crate::kernel::{expect_reply, BridgeOp, BridgeReply, IfCounters, IfReply, IfRequest, Kernel, MemberInfo};
use crate::{Error, Result};
use bitflags::bitflags;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

bitflags! {
    /// `IFBIF_*` member flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PortFlags: u32 {
        const LEARNING = 0x1;
        const DISCOVER = 0x2;
        const STP = 0x4;
        const SPAN = 0x8;
        const STICKY = 0x10;
        const BSTP_EDGE = 0x20;
        const BSTP_AUTOEDGE = 0x40;
        const BSTP_PTP = 0x80;
        const BSTP_AUTOPTP = 0x100;
        const BSTP_ADMEDGE = 0x200;
        const BSTP_ADMCOST = 0x400;
        const PRIVATE = 0x800;
    }
}

/// Kernel `BSTP_IFSTATE_*` values.
pub mod bstp {
    pub const DISABLED: u8 = 0;
    pub const LISTENING: u8 = 1;
    pub const LEARNING: u8 = 2;
    pub const FORWARDING: u8 = 3;
    pub const BLOCKING: u8 = 4;
    pub const DISCARDING: u8 = 5;
}

const MANAGED_FLAGS: PortFlags = PortFlags::LEARNING
    .union(PortFlags::DISCOVER)
    .union(PortFlags::STP);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StpState {
    Disabled,
    Listening,
    Learning,
    Forwarding,
    Blocking,
}

impl StpState {
    pub fn as_str(self) -> &'static str {
        match self {
            StpState::Disabled => "disabled",
            StpState::Listening => "listening",
            StpState::Learning => "learning",
            StpState::Forwarding => "forwarding",
            StpState::Blocking => "blocking",
        }
    }

    /// Disabling is always allowed; otherwise only one step along
    /// disabled, listening, learning, forwarding, or a drop to blocking
    /// from listening or learning.
    pub fn can_transition(self, to: StpState) -> bool {
        use StpState::*;
        matches!(
            (self, to),
            (_, Disabled)
                | (Disabled, Listening)
                | (Listening, Learning)
                | (Learning, Forwarding)
                | (Listening, Blocking)
                | (Learning, Blocking)
        )
    }

    fn from_kernel(state: u8) -> Self {
        match state {
            bstp::LISTENING => StpState::Listening,
            bstp::LEARNING => StpState::Learning,
            bstp::FORWARDING => StpState::Forwarding,
            bstp::BLOCKING | bstp::DISCARDING => StpState::Blocking,
            _ => StpState::Disabled,
        }
    }
}

impl fmt::Display for StpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StpState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(StpState::Disabled),
            "listening" => Ok(StpState::Listening),
            "learning" => Ok(StpState::Learning),
            "forwarding" => Ok(StpState::Forwarding),
            "blocking" => Ok(StpState::Blocking),
            _ => Err(Error::Parse(format!("unknown port state '{}'", s))),
        }
    }
}

/// Counters accumulated since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortStats {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub drops: u64,
}

impl PortStats {
    fn between(baseline: &IfCounters, now: &IfCounters) -> Self {
        Self {
            packets_in: now.ipackets.saturating_sub(baseline.ipackets),
            packets_out: now.opackets.saturating_sub(baseline.opackets),
            bytes_in: now.ibytes.saturating_sub(baseline.ibytes),
            bytes_out: now.obytes.saturating_sub(baseline.obytes),
            drops: (now.iqdrops + now.oqdrops)
                .saturating_sub(baseline.iqdrops + baseline.oqdrops),
        }
    }
}

/// One member interface of a bridge.
#[derive(Debug, Clone)]
pub struct BridgePort {
    bridge: String,
    member: String,
    state: StpState,
    learning: bool,
    flooding: bool,
    stp: bool,
    baseline: IfCounters,
}

impl BridgePort {
    fn new(bridge: &str, member: &str) -> Self {
        Self {
            bridge: bridge.to_string(),
            member: member.to_string(),
            state: StpState::Disabled,
            learning: true,
            flooding: true,
            stp: false,
            baseline: IfCounters::default(),
        }
    }

    /// A port that was already a member before we looked.
    ///
    /// Without STP the kernel keeps no port state, so any learning or
    /// flooding flag means the port was forwarding. A forwarding port with
    /// both turned off cannot be told apart from a disabled one.
    fn discovered(bridge: &str, info: &MemberInfo) -> Self {
        let active = info
            .flags
            .intersects(PortFlags::LEARNING | PortFlags::DISCOVER);
        let stp = info.flags.contains(PortFlags::STP);
        let state = if stp {
            StpState::from_kernel(info.stp_state)
        } else if active {
            StpState::Forwarding
        } else {
            StpState::Disabled
        };
        Self {
            learning: !active || info.flags.contains(PortFlags::LEARNING),
            flooding: !active || info.flags.contains(PortFlags::DISCOVER),
            stp,
            state,
            ..Self::new(bridge, &info.name)
        }
    }

    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn state(&self) -> StpState {
        self.state
    }

    pub fn learning(&self) -> bool {
        self.learning
    }

    pub fn flooding(&self) -> bool {
        self.flooding
    }

    pub fn stp(&self) -> bool {
        self.stp
    }

    /// Learning and flooding only reach the kernel in the forwarding state.
    pub fn kernel_flags(&self) -> PortFlags {
        let forwarding = self.state == StpState::Forwarding;
        let mut flags = PortFlags::empty();
        flags.set(PortFlags::STP, self.stp);
        flags.set(PortFlags::LEARNING, forwarding && self.learning);
        flags.set(PortFlags::DISCOVER, forwarding && self.flooding);
        flags
    }

    fn check_transition(&self, to: StpState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(Error::InvalidTransition {
                port: format!("{}/{}", self.bridge, self.member),
                from: self.state.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }
}

/// A bridge interface and the ports we manage on it.
pub struct Bridge {
    kernel: Arc<dyn Kernel>,
    name: String,
    ports: BTreeMap<String, BridgePort>,
}

impl Bridge {
    pub fn open(kernel: Arc<dyn Kernel>, name: &str) -> Result<Self> {
        let link = expect_reply!(
            kernel.ioctl_interface(name, IfRequest::GetLink)?,
            IfReply::Link,
            "getifaddrs"
        )?;
        let kind = InterfaceKind::classify(name, link.if_type);
        if kind != InterfaceKind::Bridge {
            return Err(Error::UnsupportedType(format!("{} ({} is not a bridge)", kind, name)));
        }
        let mut bridge = Self {
            kernel,
            name: name.to_string(),
            ports: BTreeMap::new(),
        };
        bridge.refresh()?;
        Ok(bridge)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn members(&self) -> Result<Vec<MemberInfo>> {
        expect_reply!(
            self.kernel.ioctl_bridge(&self.name, BridgeOp::ListMembers)?,
            BridgeReply::Members,
            "BRDGGIFS"
        )
    }

    /// Reconcile tracked ports with the kernel's member list.
    pub fn refresh(&mut self) -> Result<()> {
        let members = self.members()?;
        self.ports
            .retain(|name, _| members.iter().any(|m| &m.name == name));
        for info in &members {
            if !self.ports.contains_key(&info.name) {
                debug!("{}: found existing member {}", self.name, info.name);
                let mut port = BridgePort::discovered(&self.name, info);
                port.baseline = self.counters(&info.name).unwrap_or_default();
                self.ports.insert(info.name.clone(), port);
            }
        }
        Ok(())
    }

    pub fn ports(&self) -> impl Iterator<Item = &BridgePort> {
        self.ports.values()
    }

    pub fn port(&self, member: &str) -> Result<&BridgePort> {
        self.ports.get(member).ok_or_else(|| Error::NotFound {
            what: "bridge member",
            name: format!("{} on {}", member, self.name),
        })
    }

    fn counters(&self, member: &str) -> Result<IfCounters> {
        expect_reply!(
            self.kernel.ioctl_interface(member, IfRequest::GetCounters)?,
            IfReply::Counters,
            "SIOCGIFDATA"
        )
    }

    /// Push the flags for `port` to the kernel, keeping flags we do not manage.
    fn push_flags(&self, port: &BridgePort) -> Result<()> {
        let current = expect_reply!(
            self.kernel
                .ioctl_bridge(&self.name, BridgeOp::GetMember(port.member.clone()))?,
            BridgeReply::Member,
            "BRDGGIFFLGS"
        )?;
        let flags = (current.flags - MANAGED_FLAGS) | port.kernel_flags();
        if flags != current.flags {
            self.kernel.ioctl_bridge(
                &self.name,
                BridgeOp::SetMemberFlags {
                    member: port.member.clone(),
                    flags,
                },
            )?;
            debug!("{}: {} flags {:?}", self.name, port.member, flags);
        }
        Ok(())
    }

    /// Add `member`; the new port starts disabled.
    pub fn add_port(&mut self, member: &str) -> Result<&BridgePort> {
        self.kernel
            .ioctl_bridge(&self.name, BridgeOp::AddMember(member.to_string()))?;
        let mut port = BridgePort::new(&self.name, member);
        port.baseline = self.counters(member)?;
        self.push_flags(&port)?;
        info!("{}: added member {}", self.name, member);
        Ok(self.ports.entry(member.to_string()).or_insert(port))
    }

    pub fn remove_port(&mut self, member: &str) -> Result<()> {
        self.kernel
            .ioctl_bridge(&self.name, BridgeOp::DeleteMember(member.to_string()))?;
        self.ports.remove(member);
        info!("{}: removed member {}", self.name, member);
        Ok(())
    }

    /// Apply `change` to a copy of the port and commit it only once the
    /// kernel accepted the resulting flags.
    fn update_port(&mut self, member: &str, change: impl FnOnce(&mut BridgePort) -> Result<()>) -> Result<()> {
        let mut port = self.port(member)?.clone();
        change(&mut port)?;
        self.push_flags(&port)?;
        self.ports.insert(member.to_string(), port);
        Ok(())
    }

    /// Move a port along the STP state machine. Illegal transitions leave
    /// the recorded state untouched.
    pub fn set_port_state(&mut self, member: &str, state: StpState) -> Result<()> {
        self.update_port(member, |port| {
            port.check_transition(state)?;
            port.state = state;
            Ok(())
        })?;
        info!("{}: {} {}", self.name, member, state);
        Ok(())
    }

    pub fn set_learning(&mut self, member: &str, on: bool) -> Result<()> {
        self.update_port(member, |port| {
            port.learning = on;
            Ok(())
        })
    }

    pub fn set_flooding(&mut self, member: &str, on: bool) -> Result<()> {
        self.update_port(member, |port| {
            port.flooding = on;
            Ok(())
        })
    }

    pub fn set_stp(&mut self, member: &str, on: bool) -> Result<()> {
        self.update_port(member, |port| {
            port.stp = on;
            Ok(())
        })
    }

    pub fn port_stats(&self, member: &str) -> Result<PortStats> {
        let port = self.port(member)?;
        Ok(PortStats::between(&port.baseline, &self.counters(member)?))
    }

    pub fn reset_stats(&mut self, member: &str) -> Result<()> {
        let now = self.counters(member)?;
        let port = self.ports.get_mut(member).ok_or_else(|| Error::NotFound {
            what: "bridge member",
            name: format!("{} on {}", member, self.name),
        })?;
        port.baseline = now;
        Ok(())
    }
}

/// Bridges touched during a session, keyed by name.
///
/// Port state has no kernel counterpart, so it has to outlive a single
/// command; membership is re-read from the kernel on every access.
#[derive(Default)]
pub struct BridgeTable {
    bridges: HashMap<String, Bridge>,
}

impl BridgeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_mut(&mut self, kernel: &Arc<dyn Kernel>, name: &str) -> Result<&mut Bridge> {
        if let Some(bridge) = self.bridges.get_mut(name) {
            if let Err(e) = bridge.refresh() {
                self.bridges.remove(name);
                return Err(e);
            }
        } else {
            let bridge = Bridge::open(kernel.clone(), name)?;
            self.bridges.insert(name.to_string(), bridge);
        }
        self.bridges
            .get_mut(name)
            .ok_or_else(|| Error::interface_not_found(name))
    }

    pub fn forget(&mut self, name: &str) {
        self.bridges.remove(name);
    }
}
