//! ALTQ traffic queues

use crate::kernel::{expect_reply, unexpected_reply, AltqOp, AltqReply, Kernel, QueueStatus};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub const MAX_PRIORITY: u8 = 15;

/// Queue parameters. Bandwidths are in bits per second; a zero bound means
/// unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    pub interface: String,
    pub bandwidth: u64,
    pub min_bandwidth: u64,
    pub max_bandwidth: u64,
    pub priority: u8,
    pub weight: u32,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, interface: impl Into<String>, bandwidth: u64) -> Self {
        Self {
            name: name.into(),
            interface: interface.into(),
            bandwidth,
            min_bandwidth: 0,
            max_bandwidth: 0,
            priority: 1,
            weight: 1,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidQueue {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > 64 {
            return Err(self.invalid("name must be 1 to 64 characters"));
        }
        if self.bandwidth == 0 {
            return Err(self.invalid("bandwidth must be positive"));
        }
        if self.min_bandwidth != 0 && self.min_bandwidth > self.bandwidth {
            return Err(self.invalid(format!(
                "minimum {} exceeds bandwidth {}",
                Bandwidth(self.min_bandwidth),
                Bandwidth(self.bandwidth)
            )));
        }
        if self.max_bandwidth != 0 && self.bandwidth > self.max_bandwidth {
            return Err(self.invalid(format!(
                "bandwidth {} exceeds maximum {}",
                Bandwidth(self.bandwidth),
                Bandwidth(self.max_bandwidth)
            )));
        }
        if self.priority > MAX_PRIORITY {
            return Err(self.invalid(format!("priority must be 0-{}", MAX_PRIORITY)));
        }
        if self.weight == 0 {
            return Err(self.invalid("weight must be positive"));
        }
        Ok(())
    }
}

/// A bandwidth in bits per second, printed the way pfctl does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bandwidth(pub u64);

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 3] = [(1_000_000_000, "Gb"), (1_000_000, "Mb"), (1_000, "Kb")];
        for (scale, unit) in UNITS {
            if self.0 >= scale && self.0 % scale == 0 {
                return write!(f, "{}{}", self.0 / scale, unit);
            }
        }
        write!(f, "{}b", self.0)
    }
}

/// Parse `100Mb`, `512Kb`, `1Gb` or a plain number of bits per second.
pub fn parse_bandwidth(s: &str) -> Result<u64> {
    let lower = s.to_ascii_lowercase();
    let (digits, scale) = match lower.strip_suffix('b') {
        Some(rest) => match rest.chars().last() {
            Some('k') => (&rest[..rest.len() - 1], 1_000),
            Some('m') => (&rest[..rest.len() - 1], 1_000_000),
            Some('g') => (&rest[..rest.len() - 1], 1_000_000_000),
            _ => (rest, 1),
        },
        None => (lower.as_str(), 1),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(|| Error::Parse(format!("invalid bandwidth '{}'", s)))
}

fn expect_done(reply: AltqReply, op: &'static str) -> Result<()> {
    match reply {
        AltqReply::Done => Ok(()),
        other => Err(unexpected_reply(op, &other)),
    }
}

/// A queue known to the kernel.
pub struct Queue {
    kernel: Arc<dyn Kernel>,
    config: QueueConfig,
    enabled: bool,
}

impl Queue {
    /// Validate and install a queue; it starts disabled.
    pub fn create(kernel: Arc<dyn Kernel>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        expect_done(kernel.altq(AltqOp::Add(config.clone()))?, "altq add")?;
        info!(
            "queue {} on {} at {}",
            config.name,
            config.interface,
            Bandwidth(config.bandwidth)
        );
        Ok(Self {
            kernel,
            config,
            enabled: false,
        })
    }

    pub fn list(kernel: &Arc<dyn Kernel>) -> Result<Vec<QueueStatus>> {
        expect_reply!(kernel.altq(AltqOp::List)?, AltqReply::Queues, "altq list")
    }

    pub fn open(kernel: Arc<dyn Kernel>, name: &str) -> Result<Self> {
        let status = Self::list(&kernel)?
            .into_iter()
            .find(|q| q.config.name == name)
            .ok_or_else(|| Error::NotFound {
                what: "queue",
                name: name.to_string(),
            })?;
        Ok(Self {
            kernel,
            config: status.config,
            enabled: status.enabled,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let op = AltqOp::SetEnabled {
            name: self.config.name.clone(),
            enabled,
        };
        expect_done(self.kernel.altq(op)?, "altq enable")?;
        self.enabled = enabled;
        info!(
            "queue {} {}",
            self.config.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn enable(&mut self) -> Result<()> {
        self.set_enabled(true)
    }

    pub fn disable(&mut self) -> Result<()> {
        self.set_enabled(false)
    }

    pub fn remove(self) -> Result<()> {
        expect_done(
            self.kernel.altq(AltqOp::Remove(self.config.name.clone()))?,
            "altq remove",
        )?;
        info!("queue {} removed", self.config.name);
        Ok(())
    }
}
