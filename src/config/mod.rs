//! Configuration management
//!
//! nettool.toml is optional; a missing file yields the defaults.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

pub const DEFAULT_PATH: &str = "nettool.toml";

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Load `path` if given (it must exist), else `nettool.toml` if present, else defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load(path),
        None if Path::new(DEFAULT_PATH).exists() => load(DEFAULT_PATH),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[shell]
prompt = "fw1# "

[kernel]
backend = "simulated"

[commands.aliases]
ls = "show"
mk = "create"

[[simulated.interfaces]]
name = "igb0"
type = "ethernet"
mac = "00:1b:21:0a:0b:0c"

[[simulated.interfaces]]
name = "bridge0"
type = "bridge"
"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        let logging = config.logging.unwrap();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, "json");
        assert_eq!(config.shell.prompt, "fw1# ");
        assert_eq!(config.kernel.backend, KernelBackend::Simulated);
        assert_eq!(config.commands.aliases.get("ls").map(String::as_str), Some("show"));
        assert_eq!(config.simulated.interfaces.len(), 2);
        assert_eq!(config.simulated.interfaces[1].kind, "bridge");
        assert!(config.simulated.interfaces[1].mac.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert!(config.logging.is_none());
        assert_eq!(config.shell.prompt, "nettool> ");
        assert_eq!(config.kernel.backend, KernelBackend::Auto);
        assert!(config.commands.aliases.is_empty());
    }

    #[test]
    fn test_rejects_unknown_keys_and_backends() {
        assert!(matches!(parse("[kernel]\nbackend = \"linux\"\n"), Err(Error::Config(_))));
        assert!(matches!(parse("[shell]\ncolour = true\n"), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(load_or_default(Some(&missing)), Err(Error::Io(_))));
    }
}
