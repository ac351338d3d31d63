//! Configuration validation

use super::{Config, KernelBackend};
use crate::addr::MacAddr;
use crate::command::BUILTIN_VERBS;
use crate::iface::InterfaceKind;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_shell(config, &mut result);
    validate_kernel(config, &mut result);
    validate_aliases(config, &mut result);
    validate_simulated(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let Some(logging) = &config.logging else {
        return;
    };
    let level = logging.level.to_lowercase();
    if !["error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            logging.level
        ));
    }
    if !["pretty", "compact", "json"].contains(&logging.format.as_str()) {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            logging.format
        ));
    }
}

fn validate_shell(config: &Config, result: &mut ValidationResult) {
    if config.shell.prompt.trim().is_empty() {
        result.warn("shell.prompt: empty prompt");
    }
}

fn validate_kernel(config: &Config, result: &mut ValidationResult) {
    if config.kernel.backend == KernelBackend::Freebsd && !cfg!(target_os = "freebsd") {
        result.error("kernel.backend: freebsd backend is only available on FreeBSD");
    }
    if config.kernel.backend == KernelBackend::Freebsd && !config.simulated.interfaces.is_empty() {
        result.warn("simulated.interfaces: ignored with the freebsd backend");
    }
}

fn validate_aliases(config: &Config, result: &mut ValidationResult) {
    for (alias, target) in &config.commands.aliases {
        if alias.is_empty() || alias.contains(char::is_whitespace) {
            result.error(format!(
                "commands.aliases: '{}' is not a single word",
                alias
            ));
            continue;
        }
        let lower = alias.to_lowercase();
        if lower != *alias {
            result.warn(format!(
                "commands.aliases.{}: verbs are case-insensitive, registered as '{}'",
                alias, lower
            ));
        }
        if BUILTIN_VERBS.contains(&lower.as_str()) {
            result.error(format!(
                "commands.aliases.{}: shadows a built-in command",
                alias
            ));
        }
        if !BUILTIN_VERBS.contains(&target.to_lowercase().as_str()) {
            result.error(format!(
                "commands.aliases.{}: unknown target command '{}'",
                alias, target
            ));
        }
    }
}

fn validate_simulated(config: &Config, result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for seed in &config.simulated.interfaces {
        if !seen.insert(seed.name.as_str()) {
            result.error(format!(
                "simulated.interfaces: {} declared more than once",
                seed.name
            ));
        }
        if crate::iface::check_name(&seed.name).is_err() {
            result.error(format!(
                "simulated.interfaces: invalid interface name '{}'",
                seed.name
            ));
        }
        if seed.kind.parse::<InterfaceKind>().is_err() {
            result.error(format!(
                "simulated.interfaces.{}: unknown type '{}'",
                seed.name, seed.kind
            ));
        }
        if let Some(mac) = &seed.mac {
            if mac.parse::<MacAddr>().is_err() {
                result.error(format!(
                    "simulated.interfaces.{}: invalid mac '{}'",
                    seed.name, mac
                ));
            }
        }
    }
}
