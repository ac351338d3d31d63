use super::kind::driver_name;
use super::{Interface, InterfaceKind};
use crate::kernel::{expect_reply, IfReply, IfRequest, Kernel, LinkInfo};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name to interface resolution, backed by the live kernel.
///
/// Nothing is cached between calls. A renamed clone (an epair called
/// `uplink`, say) is recognised by the group its cloner put it in.
pub struct Registry {
    kernel: Arc<dyn Kernel>,
}

impl Registry {
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    /// `None` if the kernel has no interface called `name`.
    pub fn get_interface(&mut self, name: &str) -> Result<Option<Interface>> {
        match self.kernel.ioctl_interface(name, IfRequest::GetLink) {
            Ok(reply) => {
                let link = expect_reply!(reply, IfReply::Link, "getifaddrs")?;
                let kind = kind_of(&self.kernel, &link)?;
                Ok(Some(Interface::from_link(self.kernel.clone(), &link, kind)))
            }
            Err(Error::NotFound {
                what: "interface", ..
            }) => {
                debug!("no interface {}", name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`Registry::get_interface`] but absence is an error.
    pub fn require_interface(&mut self, name: &str) -> Result<Interface> {
        self.get_interface(name)?
            .ok_or_else(|| Error::interface_not_found(name))
    }

    pub fn list_interfaces(&mut self) -> Result<Vec<Interface>> {
        self.kernel
            .links()?
            .iter()
            .map(|link| {
                let kind = kind_of(&self.kernel, link)?;
                Ok(Interface::from_link(self.kernel.clone(), link, kind))
            })
            .collect()
    }

    /// Clone a new interface of `kind`, optionally under a chosen name.
    pub fn create_interface(&mut self, kind: InterfaceKind, name: Option<&str>) -> Result<Interface> {
        clone_interface(&self.kernel, kind, name)
    }
}

/// Kind of a live interface: its driver prefix, else the cloner group it
/// belongs to, else its `IFT_*` byte.
fn kind_of(kernel: &Arc<dyn Kernel>, link: &LinkInfo) -> Result<InterfaceKind> {
    if let Some(kind) = InterfaceKind::from_driver(driver_name(&link.name)) {
        return Ok(kind);
    }
    let groups = expect_reply!(
        kernel.ioctl_interface(&link.name, IfRequest::GetGroups)?,
        IfReply::Groups,
        "SIOCGIFGROUP"
    )?;
    Ok(InterfaceKind::from_cloner_group(&groups)
        .unwrap_or_else(|| InterfaceKind::classify(&link.name, link.if_type)))
}

/// `bridge7` for the bridge cloner; any other name needs a rename after creation.
fn is_unit_name(cloner: &str, name: &str) -> bool {
    if driver_name(name) != cloner || name.len() == cloner.len() {
        return false;
    }
    name[cloner.len()..].bytes().all(|b| b.is_ascii_digit())
}

pub(crate) fn clone_interface(
    kernel: &Arc<dyn Kernel>,
    kind: InterfaceKind,
    name: Option<&str>,
) -> Result<Interface> {
    let cloner = kind
        .profile()
        .cloner
        .ok_or_else(|| Error::UnsupportedType(kind.to_string()))?;

    if let Some(name) = name {
        super::check_name(name)?;
        match kernel.ioctl_interface(name, IfRequest::GetLink) {
            Ok(_) => return Err(Error::AlreadyExists(format!("interface {}", name))),
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    let direct = name.filter(|n| kind != InterfaceKind::Epair && is_unit_name(cloner, n));
    let created = expect_reply!(
        kernel.ioctl_interface(direct.unwrap_or(cloner), IfRequest::Create)?,
        IfReply::Created,
        "SIOCIFCREATE"
    )?;
    info!("created {} interface {}", kind, created);

    let final_name = match name {
        Some(wanted) if wanted != created => {
            if let Err(e) = kernel.ioctl_interface(&created, IfRequest::Rename(wanted.to_string())) {
                if let Err(undo) = kernel.ioctl_interface(&created, IfRequest::Destroy) {
                    warn!("could not destroy {} after failed rename: {}", created, undo);
                }
                return Err(e);
            }
            info!("{} renamed to {}", created, wanted);
            wanted.to_string()
        }
        _ => created,
    };

    let link = expect_reply!(
        kernel.ioctl_interface(&final_name, IfRequest::GetLink)?,
        IfReply::Link,
        "getifaddrs"
    )?;
    Ok(Interface::from_link(kernel.clone(), &link, kind))
}
