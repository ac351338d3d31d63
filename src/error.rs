use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("usage: {0}")]
    Usage(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("{what} {name} not found")]
    NotFound { what: &'static str, name: String },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("unsupported interface type: {0}")]
    UnsupportedType(String),

    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error("invalid FIB {fib}: system has {fibs} FIB(s)")]
    InvalidFib { fib: u32, fibs: u32 },

    #[error("port {port}: illegal state transition {from} -> {to}")]
    InvalidTransition {
        port: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("queue {name}: {reason}")]
    InvalidQueue { name: String, reason: String },

    #[error("{0} is not supported by this kernel binding")]
    NotSupported(String),

    #[error("{op} failed: {source}")]
    Kernel {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn interface_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            what: "interface",
            name: name.into(),
        }
    }

    /// True for errors caused by the command line rather than by the system.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_) | Error::UnknownCommand(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
