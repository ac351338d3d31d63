//! Network interfaces
//!
//! One concrete [`Interface`] type covers every interface kind; per-kind
//! differences live in the [`KindProfile`] table. The [`Registry`] is the
//! only way to obtain an interface and always consults the kernel first.

pub mod flags;
mod interface;
pub mod kind;
pub mod media;
mod registry;

pub use flags::{CapabilitySet, Capabilities, IfFlags};
pub use interface::Interface;
pub use kind::{InterfaceKind, KindProfile, TunnelKind};
pub use media::{MediaReport, MediaWord};
pub use registry::Registry;

/// Validate a user-supplied interface name without touching the kernel.
pub fn check_name(name: &str) -> crate::Result<()> {
    let mut buf = [0u8; crate::kernel::ioctl::IFNAMSIZ];
    crate::kernel::ioctl::copy_ifname(&mut buf, name)
}
