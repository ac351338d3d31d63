//! Command counters.
//!
//! Tracks how many commands a session dispatched and how they ended, both
//! overall and per verb. Counters are atomic so a dispatcher can be shared
//! behind an `Arc` if a caller wants to.

use crate::Error;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome counters for dispatched commands.
#[derive(Debug, Default)]
pub struct CommandMetrics {
    per_verb: RwLock<BTreeMap<String, Counter>>,
    /// Non-empty lines handed to the dispatcher.
    pub dispatched: Counter,
    /// Commands that returned an error, unknown verbs included.
    pub failed: Counter,
    /// Lines whose verb matched no command.
    pub unknown: Counter,
    /// Failures reported by the kernel binding itself.
    pub kernel_errors: Counter,
}

impl CommandMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dispatched command. `verb` is the resolved built-in verb,
    /// `None` when the line matched nothing.
    pub fn record(&self, verb: Option<&str>, outcome: Result<(), &Error>) {
        self.dispatched.inc();
        match verb {
            Some(verb) => {
                let known = self
                    .per_verb
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(verb)
                    .map(Counter::inc)
                    .is_some();
                if !known {
                    self.per_verb
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entry(verb.to_string())
                        .or_default()
                        .inc();
                }
            }
            None => self.unknown.inc(),
        }
        if let Err(e) = outcome {
            self.failed.inc();
            if matches!(e, Error::Kernel { .. } | Error::Io(_)) {
                self.kernel_errors.inc();
            }
        }
    }

    pub fn verb_count(&self, verb: &str) -> u64 {
        self.per_verb
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(verb)
            .map_or(0, Counter::get)
    }

    /// All counters as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("commands_dispatched".into(), self.dispatched.get()),
            ("commands_failed".into(), self.failed.get()),
            ("commands_unknown".into(), self.unknown.get()),
            ("kernel_errors".into(), self.kernel_errors.get()),
        ];
        let per_verb = self.per_verb.read().unwrap_or_else(PoisonError::into_inner);
        result.extend(
            per_verb
                .iter()
                .map(|(verb, count)| (format!("verb_{}", verb), count.get())),
        );
        result
    }

    pub fn log_summary(&self) {
        info!(
            dispatched = self.dispatched.get(),
            failed = self.failed.get(),
            unknown = self.unknown.get(),
            kernel_errors = self.kernel_errors.get(),
            "session finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = CommandMetrics::new();
        metrics.record(Some("show"), Ok(()));
        metrics.record(Some("show"), Ok(()));
        metrics.record(
            Some("set"),
            Err(&Error::Kernel {
                op: "SIOCSIFMTU",
                source: std::io::Error::from_raw_os_error(libc::EINVAL),
            }),
        );
        metrics.record(None, Err(&Error::UnknownCommand("frobnicate".into())));

        assert_eq!(metrics.dispatched.get(), 4);
        assert_eq!(metrics.failed.get(), 2);
        assert_eq!(metrics.unknown.get(), 1);
        assert_eq!(metrics.kernel_errors.get(), 1);
        assert_eq!(metrics.verb_count("show"), 2);
        assert_eq!(metrics.verb_count("queue"), 0);

        let exported = metrics.export();
        assert!(exported.contains(&("verb_show".into(), 2)));
        assert!(exported.contains(&("commands_failed".into(), 2)));
    }
}
