//! Interface type tags and the per-type behaviour table

use super::Capabilities;
use crate::Error;
use std::fmt;
use std::str::FromStr;

/// `IFT_*` values from `net/if_types.h` used for classification.
pub mod ift {
    pub const ETHER: u8 = 0x06;
    pub const IEEE80211: u8 = 0x47;
    pub const TUNNEL: u8 = 0x83;
    pub const L2VLAN: u8 = 0x87;
    pub const LOOP: u8 = 0x18;
    pub const BRIDGE: u8 = 0xd1;
    pub const GIF: u8 = 0xf0;
    pub const PFLOG: u8 = 0xf6;
    pub const PFSYNC: u8 = 0xf7;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelKind {
    Gif,
    Gre,
    Tap,
}

/// Type tag of a network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    Ethernet,
    Loopback,
    Epair,
    Bridge,
    Vlan,
    Tunnel(TunnelKind),
    Wireless,
    Lagg,
    Pflog,
    Pfsync,
    Unknown,
}

/// Type-specific behaviour shared by every interface of one kind.
#[derive(Debug, Clone, Copy)]
pub struct KindProfile {
    /// Kernel cloner used by `SIOCIFCREATE`; `None` for physical devices.
    pub cloner: Option<&'static str>,
    /// Whether `SIOCGIFMEDIA` is meaningful.
    pub has_media: bool,
    /// Whether the interface carries an Ethernet link-level address.
    pub has_lladdr: bool,
    /// Capability bits this kind may toggle; intersected with what the driver reports.
    pub capability_mask: Capabilities,
}

const fn profile(
    cloner: Option<&'static str>,
    has_media: bool,
    has_lladdr: bool,
    capability_mask: Capabilities,
) -> KindProfile {
    KindProfile {
        cloner,
        has_media,
        has_lladdr,
        capability_mask,
    }
}

const LOOPBACK_CAPS: Capabilities = Capabilities::RXCSUM
    .union(Capabilities::TXCSUM)
    .union(Capabilities::RXCSUM_IPV6)
    .union(Capabilities::TXCSUM_IPV6)
    .union(Capabilities::LINKSTATE);

const TUNNEL_CAPS: Capabilities = Capabilities::LINKSTATE;

impl InterfaceKind {
    pub const ALL: [InterfaceKind; 13] = [
        InterfaceKind::Ethernet,
        InterfaceKind::Loopback,
        InterfaceKind::Epair,
        InterfaceKind::Bridge,
        InterfaceKind::Vlan,
        InterfaceKind::Tunnel(TunnelKind::Gif),
        InterfaceKind::Tunnel(TunnelKind::Gre),
        InterfaceKind::Tunnel(TunnelKind::Tap),
        InterfaceKind::Wireless,
        InterfaceKind::Lagg,
        InterfaceKind::Pflog,
        InterfaceKind::Pfsync,
        InterfaceKind::Unknown,
    ];

    pub fn profile(self) -> KindProfile {
        use InterfaceKind::*;
        match self {
            Ethernet => profile(None, true, true, Capabilities::all()),
            Loopback => profile(Some("lo"), false, false, LOOPBACK_CAPS),
            Epair => profile(Some("epair"), true, true, Capabilities::all()),
            Bridge => profile(Some("bridge"), false, true, Capabilities::all()),
            Vlan => profile(Some("vlan"), true, true, Capabilities::all()),
            Tunnel(TunnelKind::Gif) => profile(Some("gif"), false, false, TUNNEL_CAPS),
            Tunnel(TunnelKind::Gre) => profile(Some("gre"), false, false, TUNNEL_CAPS),
            Tunnel(TunnelKind::Tap) => profile(Some("tap"), false, true, Capabilities::all()),
            // wlan clones need a parent device (wlandev), which create requests cannot carry
            Wireless => profile(None, true, true, Capabilities::all()),
            Lagg => profile(Some("lagg"), true, true, Capabilities::all()),
            Pflog => profile(Some("pflog"), false, false, Capabilities::empty()),
            Pfsync => profile(Some("pfsync"), false, false, Capabilities::empty()),
            Unknown => profile(None, false, false, Capabilities::all()),
        }
    }

    pub fn as_str(self) -> &'static str {
        use InterfaceKind::*;
        match self {
            Ethernet => "ethernet",
            Loopback => "loopback",
            Epair => "epair",
            Bridge => "bridge",
            Vlan => "vlan",
            Tunnel(TunnelKind::Gif) => "gif",
            Tunnel(TunnelKind::Gre) => "gre",
            Tunnel(TunnelKind::Tap) => "tap",
            Wireless => "wireless",
            Lagg => "lagg",
            Pflog => "pflog",
            Pfsync => "pfsync",
            Unknown => "unknown",
        }
    }

    /// Classify a kernel interface from its name and `IFT_*` type byte.
    ///
    /// The driver prefix wins because epair, lagg and tap all report
    /// `IFT_ETHER`; renamed interfaces fall back to the type byte.
    pub fn classify(name: &str, if_type: u8) -> Self {
        if let Some(kind) = Self::from_driver(driver_name(name)) {
            return kind;
        }
        match if_type {
            ift::ETHER => InterfaceKind::Ethernet,
            ift::LOOP => InterfaceKind::Loopback,
            ift::BRIDGE => InterfaceKind::Bridge,
            ift::L2VLAN => InterfaceKind::Vlan,
            ift::GIF => InterfaceKind::Tunnel(TunnelKind::Gif),
            ift::TUNNEL => InterfaceKind::Tunnel(TunnelKind::Gre),
            ift::IEEE80211 => InterfaceKind::Wireless,
            ift::PFLOG => InterfaceKind::Pflog,
            ift::PFSYNC => InterfaceKind::Pfsync,
            _ => InterfaceKind::Unknown,
        }
    }

    /// The `IFT_*` byte a kernel reports for interfaces of this kind.
    pub fn if_type(self) -> u8 {
        use InterfaceKind::*;
        match self {
            Ethernet | Epair | Lagg | Tunnel(TunnelKind::Tap) => ift::ETHER,
            Loopback => ift::LOOP,
            Bridge => ift::BRIDGE,
            Vlan => ift::L2VLAN,
            Tunnel(TunnelKind::Gif) => ift::GIF,
            Tunnel(TunnelKind::Gre) => ift::TUNNEL,
            Wireless => ift::IEEE80211,
            Pflog => ift::PFLOG,
            Pfsync => ift::PFSYNC,
            Unknown => 0,
        }
    }

    /// Kind whose cloner named one of `groups`. Cloners add every
    /// interface they create to a group named after themselves.
    pub fn from_cloner_group(groups: &[String]) -> Option<Self> {
        groups.iter().find_map(|group| {
            Self::from_driver(group).filter(|kind| kind.profile().cloner == Some(group.as_str()))
        })
    }

    pub(crate) fn from_driver(driver: &str) -> Option<Self> {
        let kind = match driver {
            "lo" => InterfaceKind::Loopback,
            "epair" => InterfaceKind::Epair,
            "bridge" => InterfaceKind::Bridge,
            "vlan" => InterfaceKind::Vlan,
            "gif" => InterfaceKind::Tunnel(TunnelKind::Gif),
            "gre" => InterfaceKind::Tunnel(TunnelKind::Gre),
            "tap" => InterfaceKind::Tunnel(TunnelKind::Tap),
            "wlan" => InterfaceKind::Wireless,
            "lagg" => InterfaceKind::Lagg,
            "pflog" => InterfaceKind::Pflog,
            "pfsync" => InterfaceKind::Pfsync,
            _ => return None,
        };
        Some(kind)
    }
}

/// Strip the unit number (and the epair `a`/`b` side) from an interface name.
pub fn driver_name(name: &str) -> &str {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.len() == name.len() {
        // epair0a / epair0b
        if let Some(base) = name.strip_suffix(['a', 'b']) {
            let driver = base.trim_end_matches(|c: char| c.is_ascii_digit());
            if driver.len() < base.len() {
                return driver;
            }
        }
    }
    trimmed
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "ethernet" | "ether" => InterfaceKind::Ethernet,
            "loopback" | "lo" => InterfaceKind::Loopback,
            "wireless" | "wlan" => InterfaceKind::Wireless,
            other => {
                Self::from_driver(other).ok_or_else(|| Error::UnsupportedType(s.to_string()))?
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cloner_group() {
        let groups = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        assert_eq!(
            InterfaceKind::from_cloner_group(&groups(&["egress", "epair"])),
            Some(InterfaceKind::Epair)
        );
        assert_eq!(
            InterfaceKind::from_cloner_group(&groups(&["lagg"])),
            Some(InterfaceKind::Lagg)
        );
        // wlan is not a cloner here
        assert_eq!(InterfaceKind::from_cloner_group(&groups(&["wlan"])), None);
        assert_eq!(InterfaceKind::from_cloner_group(&groups(&["uplinks"])), None);
    }

    #[test]
    fn test_driver_name() {
        assert_eq!(driver_name("em0"), "em");
        assert_eq!(driver_name("bridge12"), "bridge");
        assert_eq!(driver_name("epair3a"), "epair");
        assert_eq!(driver_name("epair3b"), "epair");
        assert_eq!(driver_name("lo0"), "lo");
        assert_eq!(driver_name("wan"), "wan");
        assert_eq!(driver_name("lab"), "lab");
    }

    #[test]
    fn test_classify_by_driver_prefix() {
        assert_eq!(InterfaceKind::classify("epair0a", ift::ETHER), InterfaceKind::Epair);
        assert_eq!(InterfaceKind::classify("lagg1", ift::ETHER), InterfaceKind::Lagg);
        assert_eq!(
            InterfaceKind::classify("tap0", ift::ETHER),
            InterfaceKind::Tunnel(TunnelKind::Tap)
        );
        assert_eq!(InterfaceKind::classify("lo0", ift::LOOP), InterfaceKind::Loopback);
    }

    #[test]
    fn test_classify_renamed_by_type() {
        assert_eq!(InterfaceKind::classify("lan", ift::BRIDGE), InterfaceKind::Bridge);
        assert_eq!(InterfaceKind::classify("em0", ift::ETHER), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::classify("uplink", ift::L2VLAN), InterfaceKind::Vlan);
        assert_eq!(InterfaceKind::classify("weird0", 0x99), InterfaceKind::Unknown);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("bridge".parse::<InterfaceKind>().unwrap(), InterfaceKind::Bridge);
        assert_eq!("GRE".parse::<InterfaceKind>().unwrap(), InterfaceKind::Tunnel(TunnelKind::Gre));
        assert_eq!("lo".parse::<InterfaceKind>().unwrap(), InterfaceKind::Loopback);
        assert!(matches!(
            "token-ring".parse::<InterfaceKind>(),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_if_type_round_trips_through_classify() {
        for kind in InterfaceKind::ALL {
            if kind == InterfaceKind::Unknown {
                continue;
            }
            let name = format!("{}0", kind.profile().cloner.unwrap_or("x"));
            let classified = InterfaceKind::classify(&name, kind.if_type());
            if kind.profile().cloner.is_some() {
                assert_eq!(classified, kind, "{name}");
            }
        }
    }

    #[test]
    fn test_profiles() {
        assert!(InterfaceKind::Ethernet.profile().cloner.is_none());
        assert!(!InterfaceKind::Loopback.profile().has_media);
        assert!(InterfaceKind::Loopback
            .profile()
            .capability_mask
            .contains(Capabilities::RXCSUM));
        assert!(!InterfaceKind::Loopback
            .profile()
            .capability_mask
            .contains(Capabilities::TSO4));
    }
}
