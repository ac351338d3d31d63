//! bsdnet - FreeBSD network configuration
//!
//! A library and command-line tool for FreeBSD networking: interfaces,
//! bridges and their ports, ALTQ queues, netmap rings and the network
//! sysctls. All state lives in the kernel and is re-read on every query.

pub mod addr;
pub mod altq;
pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod iface;
pub mod kernel;
pub mod netmap;
pub mod shell;
pub mod system;
pub mod telemetry;

pub use error::{Error, Result};
