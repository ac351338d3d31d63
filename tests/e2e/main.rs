//! End-to-end tests against the simulated kernel
//!
//! Run with: cargo test --test e2e

mod cli;
mod switching;

use bsdnet::command::{CommandTable, Dispatcher, Session};
use bsdnet::kernel::{Kernel, SimKernel};
use bsdnet::shell::Shell;
use bsdnet::Error;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

/// Command output shared between the session and the test.
#[derive(Clone, Default)]
pub struct Sink(Arc<Mutex<Vec<u8>>>);

impl Sink {
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock().unwrap());
        String::from_utf8(bytes).unwrap()
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn setup() -> (Arc<SimKernel>, Dispatcher, Sink) {
    let kernel = Arc::new(SimKernel::with_defaults());
    let sink = Sink::default();
    let shared: Arc<dyn Kernel> = kernel.clone();
    let session = Session::new(shared, Box::new(sink.clone()));
    (kernel, Dispatcher::new(CommandTable::builtin(), session), sink)
}

/// Delete the FIB binding twice: both succeed and the interface ends in FIB 0.
#[test]
fn test_delete_fib_twice() {
    let (_, mut d, out) = setup();
    d.execute("set interface em0 fib 2").unwrap();
    d.execute("show interface em0").unwrap();
    assert!(out.take().contains("fib 2"));

    d.execute("delete interface em0 fib").unwrap();
    d.execute("delete interface em0 fib").unwrap();
    d.execute("show interface em0").unwrap();
    assert!(out.take().contains("fib 0"));
}

/// An unknown verb fails alone; the next command still runs.
#[test]
fn test_unknown_verb_then_next_command() {
    let (_, mut d, out) = setup();
    assert!(matches!(
        d.execute("frobnicate em0"),
        Err(Error::UnknownCommand(_))
    ));
    d.execute("show interface em1").unwrap();
    assert!(out.take().starts_with("em1:"));

    let metrics = d.metrics();
    assert_eq!(metrics.dispatched.get(), 2);
    assert_eq!(metrics.unknown.get(), 1);
    assert_eq!(metrics.verb_count("show"), 1);
}

#[test]
fn test_interface_lifecycle() {
    let (kernel, mut d, out) = setup();
    d.execute("create interface vlan").unwrap();
    let name = out.take().trim().to_string();
    assert_eq!(name, "vlan0");

    d.execute("set interface vlan0 mtu 1496").unwrap();
    d.execute("set interface vlan0 address 192.0.2.10/24").unwrap();
    d.execute("set interface vlan0 group uplinks").unwrap();
    d.execute("set interface vlan0 up").unwrap();
    d.execute("show interface vlan0").unwrap();
    let text = out.take();
    assert!(text.contains("mtu 1496"));
    assert!(text.contains("inet 192.0.2.10 netmask 255.255.255.0 broadcast 192.0.2.255"));
    assert!(text.contains("uplinks"));

    d.execute("delete interface vlan0 address 192.0.2.10").unwrap();
    d.execute("delete interface vlan0").unwrap();
    assert!(kernel.links().unwrap().iter().all(|l| l.name != "vlan0"));
    assert!(matches!(
        d.execute("show interface vlan0"),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_physical_interface_cannot_be_destroyed() {
    let (kernel, mut d, _) = setup();
    assert!(d.execute("delete interface em1").is_err());
    assert!(kernel.links().unwrap().iter().any(|l| l.name == "em1"));
}

#[test]
fn test_system_forwarding_round_trip() {
    let (_, mut d, out) = setup();
    d.execute("show system").unwrap();
    assert!(out.take().contains("ipv4 forwarding:     disabled"));

    d.execute("set system forwarding on").unwrap();
    d.execute("set system forwarding6 on").unwrap();
    d.execute("show system").unwrap();
    let text = out.take();
    assert!(text.contains("ipv4 forwarding:     enabled"));
    assert!(text.contains("ipv6 forwarding:     enabled"));
    assert!(text.contains("fibs:                4"));
}

#[test]
fn test_shell_session() {
    let (_, mut d, out) = setup();
    let script = "create interface bridge\nbogus\nbridge bridge0 add em0\nexit\nshow interfaces\n";
    let mut term = Vec::new();
    let failures = Shell::new("nettool> ", &mut term)
        .run(&mut d, Cursor::new(script))
        .unwrap();
    assert_eq!(failures, 1);

    let term = String::from_utf8(term).unwrap();
    assert!(term.contains("error: unknown command 'bogus'"));
    assert_eq!(term.matches("nettool> ").count(), 4);
    assert_eq!(out.take(), "bridge0\n");
}
