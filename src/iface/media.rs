//! Media words (`IFM_*`) as used by `SIOCGIFMEDIA` / `SIOCSIFMEDIA`

use crate::{Error, Result};
use std::fmt;

pub const IFM_ETHER: i32 = 0x20;
pub const IFM_IEEE80211: i32 = 0x80;
pub const IFM_NMASK: i32 = 0xe0;
pub const IFM_TMASK: i32 = 0x1f;
pub const IFM_AUTO: i32 = 0;
pub const IFM_MANUAL: i32 = 1;
pub const IFM_NONE: i32 = 2;
pub const IFM_FDX: i32 = 0x0010_0000;
pub const IFM_HDX: i32 = 0x0020_0000;

/// `ifm_status` bits
pub const IFM_AVALID: i32 = 0x1;
pub const IFM_ACTIVE: i32 = 0x2;

/// Ethernet subtypes and their ifconfig names.
const ETHER_SUBTYPES: &[(i32, &str)] = &[
    (IFM_AUTO, "autoselect"),
    (IFM_MANUAL, "manual"),
    (IFM_NONE, "none"),
    (3, "10baseT/UTP"),
    (6, "100baseTX"),
    (7, "100baseFX"),
    (11, "1000baseSX"),
    (14, "1000baseLX"),
    (15, "1000baseCX"),
    (16, "1000baseT"),
    (18, "10Gbase-LR"),
    (19, "10Gbase-SR"),
    (20, "10Gbase-CX4"),
    (21, "2500Base-SX"),
    (22, "10Gbase-Twinax"),
    (24, "10Gbase-LRM"),
    (25, "unknown"),
    (26, "10Gbase-T"),
];

/// A single media word: network type, subtype and options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaWord(pub i32);

impl MediaWord {
    pub const ETHER_AUTO: MediaWord = MediaWord(IFM_ETHER | IFM_AUTO);

    pub fn network(self) -> i32 {
        self.0 & IFM_NMASK
    }

    pub fn subtype(self) -> i32 {
        self.0 & IFM_TMASK
    }

    pub fn full_duplex(self) -> bool {
        self.0 & IFM_FDX != 0
    }

    pub fn half_duplex(self) -> bool {
        self.0 & IFM_HDX != 0
    }

    /// Build an Ethernet media word from an ifconfig subtype name and an
    /// optional `full-duplex` / `half-duplex` option.
    pub fn parse_ether(subtype: &str, option: Option<&str>) -> Result<Self> {
        let sub = ETHER_SUBTYPES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(subtype) || alias(name, subtype))
            .map(|(sub, _)| *sub)
            .ok_or_else(|| Error::Parse(format!("unknown media type '{}'", subtype)))?;

        let opts = match option.map(str::to_ascii_lowercase).as_deref() {
            None => 0,
            Some("full-duplex") | Some("fdx") => IFM_FDX,
            Some("half-duplex") | Some("hdx") => IFM_HDX,
            Some(other) => return Err(Error::Parse(format!("unknown media option '{}'", other))),
        };
        if sub == IFM_AUTO && opts != 0 {
            return Err(Error::Usage("autoselect takes no duplex option".to_string()));
        }
        Ok(MediaWord(IFM_ETHER | sub | opts))
    }
}

fn alias(name: &str, given: &str) -> bool {
    // "10baseT/UTP" is commonly typed as "10baseT"
    name.split_once('/')
        .is_some_and(|(short, _)| short.eq_ignore_ascii_case(given))
}

impl fmt::Display for MediaWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.network() {
            IFM_ETHER => {
                let name = ETHER_SUBTYPES
                    .iter()
                    .find(|(sub, _)| *sub == self.subtype())
                    .map(|(_, name)| *name);
                match name {
                    Some(name) => f.write_str(name)?,
                    None => write!(f, "ether-subtype-{}", self.subtype())?,
                }
                if self.full_duplex() {
                    f.write_str(" <full-duplex>")?;
                } else if self.half_duplex() {
                    f.write_str(" <half-duplex>")?;
                }
                Ok(())
            }
            IFM_IEEE80211 if self.subtype() == IFM_AUTO => f.write_str("IEEE 802.11 autoselect"),
            _ => write!(f, "media {:#x}", self.0),
        }
    }
}

/// Result of `SIOCGIFMEDIA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReport {
    pub current: MediaWord,
    pub active: MediaWord,
    pub status: i32,
    pub supported: Vec<MediaWord>,
}

impl MediaReport {
    /// `None` when the driver does not report link status.
    pub fn link_active(&self) -> Option<bool> {
        (self.status & IFM_AVALID != 0).then_some(self.status & IFM_ACTIVE != 0)
    }
}
