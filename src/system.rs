//! System-wide network knobs exposed through sysctl

use crate::kernel::{Kernel, SysctlKind, SysctlValue};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub const FIBS: &str = "net.fibs";
pub const IP_FORWARDING: &str = "net.inet.ip.forwarding";
pub const IP6_FORWARDING: &str = "net.inet6.ip6.forwarding";
pub const INET_ALGO: &str = "net.route.algo.inet.algo";
pub const INET6_ALGO: &str = "net.route.algo.inet6.algo";
pub const IFQ_MAXLEN: &str = "net.link.ifqmaxlen";
pub const INTR_QUEUE_MAXLEN: &str = "net.inet.ip.intr_queue_maxlen";

/// One reading of the network sysctls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub fibs: u32,
    pub ip_forwarding: bool,
    pub ip6_forwarding: bool,
    /// `None` on kernels without pluggable route lookup algorithms
    pub inet_algo: Option<String>,
    pub inet6_algo: Option<String>,
    pub ifq_maxlen: i64,
    pub intr_queue_maxlen: i64,
    pub read_at: DateTime<Utc>,
}

impl fmt::Display for SystemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |b: bool| if b { "enabled" } else { "disabled" };
        writeln!(f, "fibs:                {}", self.fibs)?;
        writeln!(f, "ipv4 forwarding:     {}", on_off(self.ip_forwarding))?;
        writeln!(f, "ipv6 forwarding:     {}", on_off(self.ip6_forwarding))?;
        writeln!(
            f,
            "route algorithm:     inet {} / inet6 {}",
            self.inet_algo.as_deref().unwrap_or("-"),
            self.inet6_algo.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "ifq maxlen:          {}", self.ifq_maxlen)?;
        writeln!(f, "ip intr queue:       {}", self.intr_queue_maxlen)?;
        write!(f, "read at:             {}", self.read_at.to_rfc3339())
    }
}

/// Access to system network configuration. Nothing is cached: every call
/// reads the kernel again.
pub struct SystemConfig {
    kernel: Arc<dyn Kernel>,
}

impl SystemConfig {
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        Self { kernel }
    }

    fn int(&self, key: &str) -> Result<i64> {
        let value = self.kernel.sysctl_get(key, SysctlKind::Int)?;
        value
            .as_int()
            .ok_or_else(|| Error::Parse(format!("sysctl {} is not an integer: {:?}", key, value)))
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>> {
        match self.kernel.sysctl_get(key, SysctlKind::String) {
            Ok(SysctlValue::String(s)) => Ok(Some(s)),
            Ok(SysctlValue::Int(v)) => Ok(Some(v.to_string())),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn read(&self) -> Result<SystemSnapshot> {
        Ok(SystemSnapshot {
            fibs: self.fibs()?,
            ip_forwarding: self.int(IP_FORWARDING)? != 0,
            ip6_forwarding: self.int(IP6_FORWARDING)? != 0,
            inet_algo: self.optional_string(INET_ALGO)?,
            inet6_algo: self.optional_string(INET6_ALGO)?,
            ifq_maxlen: self.int(IFQ_MAXLEN)?,
            intr_queue_maxlen: self.int(INTR_QUEUE_MAXLEN)?,
            read_at: Utc::now(),
        })
    }

    /// Number of FIBs; at least one.
    pub fn fibs(&self) -> Result<u32> {
        let fibs = self.int(FIBS)?;
        Ok(u32::try_from(fibs).unwrap_or(1).max(1))
    }

    pub fn ip_forwarding(&self) -> Result<bool> {
        Ok(self.int(IP_FORWARDING)? != 0)
    }

    pub fn set_ip_forwarding(&self, enabled: bool) -> Result<()> {
        self.kernel
            .sysctl_set(IP_FORWARDING, &SysctlValue::Int(i64::from(enabled)))?;
        info!("{}={}", IP_FORWARDING, u8::from(enabled));
        Ok(())
    }

    pub fn set_ip6_forwarding(&self, enabled: bool) -> Result<()> {
        self.kernel
            .sysctl_set(IP6_FORWARDING, &SysctlValue::Int(i64::from(enabled)))?;
        info!("{}={}", IP6_FORWARDING, u8::from(enabled));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::SimKernel;

    #[test]
    fn test_read_snapshot() {
        let kernel = Arc::new(SimKernel::with_defaults());
        let snapshot = SystemConfig::new(kernel).read().unwrap();
        assert_eq!(snapshot.fibs, 4);
        assert!(!snapshot.ip_forwarding);
        assert_eq!(snapshot.inet_algo.as_deref(), Some("radix4_lockless"));
        assert_eq!(snapshot.ifq_maxlen, 50);
        assert!(snapshot.to_string().contains("ipv4 forwarding:     disabled"));
    }

    #[test]
    fn test_reads_are_not_cached() {
        let kernel = Arc::new(SimKernel::with_defaults());
        let system = SystemConfig::new(kernel.clone());
        assert_eq!(system.fibs().unwrap(), 4);
        kernel.set_sysctl(FIBS, SysctlValue::Int(16));
        assert_eq!(system.fibs().unwrap(), 16);
    }

    #[test]
    fn test_set_forwarding() {
        let kernel = Arc::new(SimKernel::with_defaults());
        let system = SystemConfig::new(kernel);
        system.set_ip_forwarding(true).unwrap();
        assert!(system.ip_forwarding().unwrap());
        system.set_ip6_forwarding(true).unwrap();
        assert!(system.read().unwrap().ip6_forwarding);
    }

    #[test]
    fn test_route_algo_follows_kernel() {
        let kernel = Arc::new(SimKernel::with_defaults());
        kernel.set_sysctl(INET_ALGO, SysctlValue::String("radix4".into()));
        let system = SystemConfig::new(kernel);
        assert_eq!(system.read().unwrap().inet_algo.as_deref(), Some("radix4"));
    }
}
