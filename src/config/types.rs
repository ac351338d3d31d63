//! Configuration types

use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Contents of nettool.toml. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: Option<LogConfig>,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub simulated: SimulatedConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

fn default_prompt() -> String {
    "nettool> ".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    #[serde(default)]
    pub backend: KernelBackend,
}

/// Which kernel binding to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelBackend {
    /// FreeBSD when running on it, simulated elsewhere
    #[default]
    Auto,
    Freebsd,
    Simulated,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandsConfig {
    /// Extra verb -> built-in verb
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

/// Interfaces the simulated kernel starts with. Empty means `lo0`, `em0`, `em1`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatedConfig {
    #[serde(default)]
    pub interfaces: Vec<SimInterfaceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimInterfaceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mac: Option<String>,
}
