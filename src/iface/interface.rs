use super::{CapabilitySet, Capabilities, IfFlags, InterfaceKind, KindProfile, MediaReport, MediaWord};
use crate::addr::{IfAddr, MacAddr};
use crate::kernel::{expect_reply, IfCounters, IfReply, IfRequest, Kernel, LinkInfo};
use crate::system::SystemConfig;
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to one kernel interface.
///
/// Holds identity only; every accessor asks the kernel. Mutating calls
/// record their outcome in [`Interface::last_error`]. Once
/// [`Interface::destroy`] succeeds the handle is defunct and every further
/// call fails with `NotFound`.
pub struct Interface {
    kernel: Arc<dyn Kernel>,
    name: String,
    index: u32,
    kind: InterfaceKind,
    last_error: Option<String>,
    defunct: bool,
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("defunct", &self.defunct)
            .finish()
    }
}

impl Interface {
    pub(crate) fn from_link(kernel: Arc<dyn Kernel>, link: &LinkInfo, kind: InterfaceKind) -> Self {
        Self {
            kernel,
            name: link.name.clone(),
            index: link.index,
            kind,
            last_error: None,
            defunct: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    pub fn profile(&self) -> KindProfile {
        self.kind.profile()
    }

    /// Message of the most recent failed mutation, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    fn ensure_live(&self) -> Result<()> {
        if self.defunct {
            return Err(Error::interface_not_found(self.name.as_str()));
        }
        Ok(())
    }

    fn request(&self, request: IfRequest) -> Result<IfReply> {
        self.ensure_live()?;
        self.kernel.ioctl_interface(&self.name, request)
    }

    fn mutate<T>(&mut self, op: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let result = self.ensure_live().and_then(|_| op(self));
        self.last_error = result.as_ref().err().map(ToString::to_string);
        result
    }

    pub fn flags(&self) -> Result<IfFlags> {
        expect_reply!(self.request(IfRequest::GetFlags)?, IfReply::Flags, "SIOCGIFFLAGS")
    }

    pub fn is_up(&self) -> Result<bool> {
        Ok(self.flags()?.contains(IfFlags::UP))
    }

    pub fn set_up(&mut self, up: bool) -> Result<()> {
        self.mutate(|iface| {
            let mut flags = iface.flags()?;
            flags.set(IfFlags::UP, up);
            iface.request(IfRequest::SetFlags(flags))?;
            info!("{} {}", iface.name, if up { "up" } else { "down" });
            Ok(())
        })
    }

    pub fn mac_address(&self) -> Result<Option<MacAddr>> {
        let link = expect_reply!(self.request(IfRequest::GetLink)?, IfReply::Link, "getifaddrs")?;
        Ok(link.lladdr.filter(|_| self.profile().has_lladdr))
    }

    pub fn set_mac_address(&mut self, mac: MacAddr) -> Result<()> {
        self.mutate(|iface| {
            if !iface.profile().has_lladdr {
                return Err(Error::UnsupportedType(format!(
                    "{} ({} has no link-level address)",
                    iface.kind, iface.name
                )));
            }
            if !mac.is_assignable() {
                return Err(Error::Usage(format!(
                    "{} is not a unicast link-level address",
                    mac
                )));
            }
            iface.request(IfRequest::SetLinkAddr(mac))?;
            info!("{} ether {}", iface.name, mac);
            Ok(())
        })
    }

    /// Supported set is limited to what this kind of interface may toggle.
    pub fn capabilities(&self) -> Result<CapabilitySet> {
        let caps = expect_reply!(
            self.request(IfRequest::GetCapabilities)?,
            IfReply::Capabilities,
            "SIOCGIFCAP"
        )?;
        Ok(CapabilitySet {
            supported: caps.supported & self.profile().capability_mask,
            enabled: caps.enabled,
        })
    }

    fn check_supported(&self, requested: Capabilities, caps: &CapabilitySet) -> Result<()> {
        let unsupported = requested - caps.supported;
        if !unsupported.is_empty() {
            return Err(Error::UnsupportedCapability(format!(
                "{} on {}",
                unsupported.names().join(","),
                self.name
            )));
        }
        Ok(())
    }

    fn apply_capabilities(&self, enabled: Capabilities) -> Result<()> {
        self.request(IfRequest::SetCapabilities(enabled))?;
        debug!("{} capabilities now {}", self.name, enabled);
        Ok(())
    }

    /// Turn on `mask`; nothing changes if any bit is unsupported.
    pub fn enable_capabilities(&mut self, mask: Capabilities) -> Result<()> {
        self.mutate(|iface| {
            let caps = iface.capabilities()?;
            iface.check_supported(mask, &caps)?;
            iface.apply_capabilities(caps.enabled | mask)
        })
    }

    /// Turn off `mask`; nothing changes if any bit is unsupported.
    pub fn disable_capabilities(&mut self, mask: Capabilities) -> Result<()> {
        self.mutate(|iface| {
            let caps = iface.capabilities()?;
            iface.check_supported(mask, &caps)?;
            iface.apply_capabilities(caps.enabled - mask)
        })
    }

    /// Replace the enabled set with `mask`.
    pub fn set_capabilities(&mut self, mask: Capabilities) -> Result<()> {
        self.mutate(|iface| {
            let caps = iface.capabilities()?;
            iface.check_supported(mask, &caps)?;
            // bits outside the kind's mask are left as the driver has them
            let fixed = caps.enabled - caps.supported;
            iface.apply_capabilities(fixed | mask)
        })
    }

    pub fn groups(&self) -> Result<Vec<String>> {
        expect_reply!(self.request(IfRequest::GetGroups)?, IfReply::Groups, "SIOCGIFGROUP")
    }

    pub fn add_to_group(&mut self, group: &str) -> Result<()> {
        self.mutate(|iface| {
            iface.request(IfRequest::AddGroup(group.to_string()))?;
            info!("{} joined group {}", iface.name, group);
            Ok(())
        })
    }

    pub fn remove_from_group(&mut self, group: &str) -> Result<()> {
        self.mutate(|iface| {
            iface.request(IfRequest::DeleteGroup(group.to_string()))?;
            info!("{} left group {}", iface.name, group);
            Ok(())
        })
    }

    /// `None` for kinds without selectable media.
    pub fn media(&self) -> Result<Option<MediaReport>> {
        self.ensure_live()?;
        if !self.profile().has_media {
            return Ok(None);
        }
        let report = expect_reply!(self.request(IfRequest::GetMedia)?, IfReply::Media, "SIOCGIFMEDIA")?;
        Ok(Some(report))
    }

    pub fn supported_media(&self) -> Result<Vec<MediaWord>> {
        Ok(self.media()?.map(|m| m.supported).unwrap_or_default())
    }

    pub fn set_media(&mut self, word: MediaWord) -> Result<()> {
        self.mutate(|iface| {
            let report = iface.media()?.ok_or_else(|| {
                Error::UnsupportedType(format!("{} ({} has no media)", iface.kind, iface.name))
            })?;
            if !report.supported.contains(&word) {
                return Err(Error::Usage(format!(
                    "media {} not supported by {}",
                    word, iface.name
                )));
            }
            iface.request(IfRequest::SetMedia(word))?;
            info!("{} media {}", iface.name, word);
            Ok(())
        })
    }

    pub fn fib(&self) -> Result<u32> {
        expect_reply!(self.request(IfRequest::GetFib)?, IfReply::Fib, "SIOCGIFFIB")
    }

    /// Fails with `InvalidFib` unless `fib` is below `net.fibs`.
    pub fn set_fib(&mut self, fib: u32) -> Result<()> {
        self.mutate(|iface| {
            let fibs = SystemConfig::new(iface.kernel.clone()).fibs()?;
            if fib >= fibs {
                return Err(Error::InvalidFib { fib, fibs });
            }
            iface.request(IfRequest::SetFib(fib))?;
            info!("{} fib {}", iface.name, fib);
            Ok(())
        })
    }

    pub fn reset_fib(&mut self) -> Result<()> {
        self.set_fib(0)
    }

    pub fn mtu(&self) -> Result<u32> {
        expect_reply!(self.request(IfRequest::GetMtu)?, IfReply::Mtu, "SIOCGIFMTU")
    }

    pub fn set_mtu(&mut self, mtu: u32) -> Result<()> {
        self.mutate(|iface| {
            iface.request(IfRequest::SetMtu(mtu))?;
            info!("{} mtu {}", iface.name, mtu);
            Ok(())
        })
    }

    pub fn addresses(&self) -> Result<Vec<IfAddr>> {
        expect_reply!(
            self.request(IfRequest::GetAddresses)?,
            IfReply::Addresses,
            "getifaddrs"
        )
    }

    pub fn add_address(&mut self, addr: IfAddr) -> Result<()> {
        self.mutate(|iface| {
            iface.request(IfRequest::AddAddress(addr))?;
            info!("{} inet {}", iface.name, addr);
            Ok(())
        })
    }

    pub fn remove_address(&mut self, addr: Ipv4Addr) -> Result<()> {
        self.mutate(|iface| {
            iface.request(IfRequest::DeleteAddress(addr))?;
            info!("{} -inet {}", iface.name, addr);
            Ok(())
        })
    }

    pub fn counters(&self) -> Result<IfCounters> {
        expect_reply!(
            self.request(IfRequest::GetCounters)?,
            IfReply::Counters,
            "SIOCGIFDATA"
        )
    }

    /// Clone a new interface of the same kind, named `name`.
    pub fn create_clone(&mut self, name: &str) -> Result<Interface> {
        self.mutate(|iface| super::registry::clone_interface(&iface.kernel, iface.kind, Some(name)))
    }

    /// Rename the kernel interface; this handle follows the new name.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        super::check_name(new_name)?;
        let old = self.name.clone();
        self.mutate(|iface| iface.request(IfRequest::Rename(new_name.to_string())))?;
        self.name = new_name.to_string();
        info!("{} renamed to {}", old, new_name);
        Ok(())
    }

    /// Destroy the kernel interface. Succeeds at most once.
    pub fn destroy(&mut self) -> Result<()> {
        self.mutate(|iface| iface.request(IfRequest::Destroy))?;
        self.defunct = true;
        info!("{} destroyed", self.name);
        Ok(())
    }
}
