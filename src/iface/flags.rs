//! Interface flag and capability bitmasks (`IFF_*`, `IFCAP_*`)

use crate::{Error, Result};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// `IFF_*` flags, combined from `ifr_flags` and `ifr_flagshigh`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IfFlags: u32 {
        const UP = 0x1;
        const BROADCAST = 0x2;
        const DEBUG = 0x4;
        const LOOPBACK = 0x8;
        const POINTOPOINT = 0x10;
        const NEEDSEPOCH = 0x20;
        const RUNNING = 0x40;
        const NOARP = 0x80;
        const PROMISC = 0x100;
        const ALLMULTI = 0x200;
        const OACTIVE = 0x400;
        const SIMPLEX = 0x800;
        const LINK0 = 0x1000;
        const LINK1 = 0x2000;
        const LINK2 = 0x4000;
        const MULTICAST = 0x8000;
        const CANTCONFIG = 0x10000;
        const PPROMISC = 0x20000;
        const MONITOR = 0x40000;
        const STATICARP = 0x80000;
        const STICKYARP = 0x100000;
        const DYING = 0x200000;
        const RENAMING = 0x400000;
    }
}

bitflags! {
    /// `IFCAP_*` interface capabilities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const RXCSUM = 0x1;
        const TXCSUM = 0x2;
        const NETCONS = 0x4;
        const VLAN_MTU = 0x8;
        const VLAN_HWTAGGING = 0x10;
        const JUMBO_MTU = 0x20;
        const POLLING = 0x40;
        const VLAN_HWCSUM = 0x80;
        const TSO4 = 0x100;
        const TSO6 = 0x200;
        const LRO = 0x400;
        const WOL_UCAST = 0x800;
        const WOL_MCAST = 0x1000;
        const WOL_MAGIC = 0x2000;
        const TOE4 = 0x4000;
        const TOE6 = 0x8000;
        const VLAN_HWFILTER = 0x10000;
        const VLAN_HWTSO = 0x40000;
        const LINKSTATE = 0x80000;
        const NETMAP = 0x100000;
        const RXCSUM_IPV6 = 0x200000;
        const TXCSUM_IPV6 = 0x400000;
        const HWSTATS = 0x800000;
        const TXRTLMT = 0x1000000;
        const HWRXTSTMP = 0x2000000;
        const MEXTPG = 0x4000000;
        const TXTLS4 = 0x8000000;
        const TXTLS6 = 0x10000000;
        const VXLAN_HWCSUM = 0x20000000;
        const VXLAN_HWTSO = 0x40000000;
        const TXTLS_RTLMT = 0x80000000;
    }
}

const FLAG_NAMES: &[(IfFlags, &str)] = &[
    (IfFlags::UP, "UP"),
    (IfFlags::BROADCAST, "BROADCAST"),
    (IfFlags::DEBUG, "DEBUG"),
    (IfFlags::LOOPBACK, "LOOPBACK"),
    (IfFlags::POINTOPOINT, "POINTOPOINT"),
    (IfFlags::RUNNING, "RUNNING"),
    (IfFlags::NOARP, "NOARP"),
    (IfFlags::PROMISC, "PROMISC"),
    (IfFlags::ALLMULTI, "ALLMULTI"),
    (IfFlags::OACTIVE, "OACTIVE"),
    (IfFlags::SIMPLEX, "SIMPLEX"),
    (IfFlags::LINK0, "LINK0"),
    (IfFlags::LINK1, "LINK1"),
    (IfFlags::LINK2, "LINK2"),
    (IfFlags::MULTICAST, "MULTICAST"),
    (IfFlags::CANTCONFIG, "CANTCONFIG"),
    (IfFlags::PPROMISC, "PPROMISC"),
    (IfFlags::MONITOR, "MONITOR"),
    (IfFlags::STATICARP, "STATICARP"),
    (IfFlags::STICKYARP, "STICKYARP"),
    (IfFlags::DYING, "DYING"),
    (IfFlags::RENAMING, "RENAMING"),
];

/// ifconfig(8) option names for each capability bit.
const CAPABILITY_NAMES: &[(Capabilities, &str)] = &[
    (Capabilities::RXCSUM, "rxcsum"),
    (Capabilities::TXCSUM, "txcsum"),
    (Capabilities::NETCONS, "netcons"),
    (Capabilities::VLAN_MTU, "vlanmtu"),
    (Capabilities::VLAN_HWTAGGING, "vlanhwtag"),
    (Capabilities::JUMBO_MTU, "jumbomtu"),
    (Capabilities::POLLING, "polling"),
    (Capabilities::VLAN_HWCSUM, "vlanhwcsum"),
    (Capabilities::TSO4, "tso4"),
    (Capabilities::TSO6, "tso6"),
    (Capabilities::LRO, "lro"),
    (Capabilities::WOL_UCAST, "wol_ucast"),
    (Capabilities::WOL_MCAST, "wol_mcast"),
    (Capabilities::WOL_MAGIC, "wol_magic"),
    (Capabilities::TOE4, "toe4"),
    (Capabilities::TOE6, "toe6"),
    (Capabilities::VLAN_HWFILTER, "vlanhwfilter"),
    (Capabilities::VLAN_HWTSO, "vlanhwtso"),
    (Capabilities::LINKSTATE, "linkstate"),
    (Capabilities::NETMAP, "netmap"),
    (Capabilities::RXCSUM_IPV6, "rxcsum6"),
    (Capabilities::TXCSUM_IPV6, "txcsum6"),
    (Capabilities::HWSTATS, "hwstats"),
    (Capabilities::TXRTLMT, "txrtlmt"),
    (Capabilities::HWRXTSTMP, "hwrxtstmp"),
    (Capabilities::MEXTPG, "mextpg"),
    (Capabilities::TXTLS4, "txtls4"),
    (Capabilities::TXTLS6, "txtls6"),
    (Capabilities::VXLAN_HWCSUM, "vxlanhwcsum"),
    (Capabilities::VXLAN_HWTSO, "vxlanhwtso"),
    (Capabilities::TXTLS_RTLMT, "txtlsrtlmt"),
];

impl IfFlags {
    /// Split into the `ifr_flags` / `ifr_flagshigh` halves of `struct ifreq`.
    pub fn to_halves(self) -> (u16, u16) {
        let bits = self.bits();
        (bits as u16, (bits >> 16) as u16)
    }

    pub fn from_halves(low: u16, high: u16) -> Self {
        IfFlags::from_bits_retain(u32::from(low) | (u32::from(high) << 16))
    }
}

impl fmt::Display for IfFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}<", self.bits())?;
        let names: Vec<&str> = FLAG_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}>", names.join(","))
    }
}

impl Capabilities {
    /// Parse a comma-separated list of ifconfig capability names.
    pub fn parse_list(list: &str) -> Result<Self> {
        let mut caps = Capabilities::empty();
        for word in list.split(',').filter(|w| !w.is_empty()) {
            let word = word.to_ascii_lowercase();
            let cap = CAPABILITY_NAMES
                .iter()
                .find(|(_, name)| *name == word)
                .map(|(cap, _)| *cap)
                .ok_or_else(|| Error::Parse(format!("unknown capability '{}'", word)))?;
            caps |= cap;
        }
        if caps.is_empty() {
            return Err(Error::Usage("capability list is empty".to_string()));
        }
        Ok(caps)
    }

    pub fn names(self) -> Vec<&'static str> {
        CAPABILITY_NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}<{}>", self.bits(), self.names().join(","))
    }
}

/// Supported and enabled capabilities as reported by `SIOCGIFCAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    pub supported: Capabilities,
    pub enabled: Capabilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_halves() {
        let flags = IfFlags::UP | IfFlags::MULTICAST | IfFlags::PPROMISC;
        let (low, high) = flags.to_halves();
        assert_eq!(low, 0x8001);
        assert_eq!(high, 0x2);
        assert_eq!(IfFlags::from_halves(low, high), flags);
    }

    #[test]
    fn test_flag_display() {
        let flags = IfFlags::UP | IfFlags::BROADCAST | IfFlags::RUNNING;
        assert_eq!(flags.to_string(), "43<UP,BROADCAST,RUNNING>");
    }

    #[test]
    fn test_capability_parse_list() {
        let caps = Capabilities::parse_list("rxcsum,TSO4,linkstate").unwrap();
        assert_eq!(
            caps,
            Capabilities::RXCSUM | Capabilities::TSO4 | Capabilities::LINKSTATE
        );
        assert!(matches!(
            Capabilities::parse_list("rxcsum,warp"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(Capabilities::parse_list(","), Err(Error::Usage(_))));
    }

    #[test]
    fn test_capability_names() {
        let caps = Capabilities::TXCSUM | Capabilities::RXCSUM_IPV6;
        assert_eq!(caps.names(), vec!["txcsum", "rxcsum6"]);
        assert_eq!(caps.to_string(), "200002<txcsum,rxcsum6>");
    }
}
