//! Link-level and IPv4 interface addresses

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Ethernet link-level address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Build from a link-level address slice as reported by `sockaddr_dl`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.try_into().ok()?;
        Some(MacAddr(octets))
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Addresses assignable to an interface: unicast and non-zero.
    pub fn is_assignable(&self) -> bool {
        !self.is_multicast() && *self != Self::ZERO
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAddrError {
    Length,
    Format,
    Hex,
    Prefix,
}

impl fmt::Display for ParseAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAddrError::Length => write!(f, "invalid MAC address length"),
            ParseAddrError::Format => write!(f, "invalid address format"),
            ParseAddrError::Hex => write!(f, "invalid hex digit in MAC address"),
            ParseAddrError::Prefix => write!(f, "invalid prefix length"),
        }
    }
}

impl std::error::Error for ParseAddrError {}

impl FromStr for MacAddr {
    type Err = ParseAddrError;

    /// Accepts `00:11:22:33:44:55`, `00-11-22-33-44-55` and `001122334455`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else if s.contains('-') {
            s.split('-').collect()
        } else if s.len() == 12 && s.is_ascii() {
            (0..6).map(|i| &s[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(ParseAddrError::Format);
        };

        if groups.len() != 6 {
            return Err(ParseAddrError::Length);
        }

        let mut octets = [0u8; 6];
        for (octet, group) in octets.iter_mut().zip(&groups) {
            if group.len() != 2 {
                return Err(ParseAddrError::Format);
            }
            if !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ParseAddrError::Hex);
            }
            *octet = u8::from_str_radix(group, 16).map_err(|_| ParseAddrError::Hex)?;
        }
        Ok(MacAddr(octets))
    }
}

/// IPv4 address assigned to an interface, with its prefix length.
///
/// Unlike a route prefix the host part is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IfAddr {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl IfAddr {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        (prefix_len <= 32).then_some(Self { addr, prefix_len })
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(prefix_to_mask(self.prefix_len))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !prefix_to_mask(self.prefix_len))
    }

    /// Recover the prefix length from a contiguous netmask.
    pub fn prefix_from_mask(mask: Ipv4Addr) -> Option<u8> {
        let bits = u32::from(mask);
        let len = bits.leading_ones();
        (bits.checked_shl(len).unwrap_or(0) == 0).then_some(len as u8)
    }
}

impl fmt::Display for IfAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for IfAddr {
    type Err = ParseAddrError;

    /// Parses `a.b.c.d/len`; a bare address is taken as a host route (/32).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse().map_err(|_| ParseAddrError::Prefix)?),
            None => (s, 32),
        };
        let addr: Ipv4Addr = addr.parse().map_err(|_| ParseAddrError::Format)?;
        IfAddr::new(addr, prefix).ok_or(ParseAddrError::Prefix)
    }
}

fn prefix_to_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - u32::from(prefix_len.min(32)))
    }
}
