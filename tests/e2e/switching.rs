//! Bridge and port tests
//!
//! Topology:
//! ```text
//!   em0 ──┐
//!         ├── bridge0
//!   em1 ──┘
//! ```

use super::{setup, Sink};
use bsdnet::command::Dispatcher;
use bsdnet::bridge::{Bridge, PortFlags, StpState};
use bsdnet::kernel::{IfCounters, Kernel};
use bsdnet::Error;
use std::sync::Arc;

fn two_port_bridge() -> (Arc<dyn Kernel>, Dispatcher, Sink) {
    let (kernel, mut d, out) = setup();
    d.execute("create interface bridge").unwrap();
    d.execute("bridge bridge0 add em0").unwrap();
    d.execute("bridge bridge0 add em1").unwrap();
    out.take();
    let kernel: Arc<dyn Kernel> = kernel;
    (kernel, d, out)
}

#[test]
fn test_ports_start_disabled_and_walk_to_forwarding() {
    let (kernel, mut d, out) = two_port_bridge();
    d.execute("show bridge bridge0").unwrap();
    let text = out.take();
    assert!(text.contains("member em0 state disabled"));
    assert!(text.contains("member em1 state disabled"));

    for state in ["listening", "learning", "forwarding"] {
        d.execute(&format!("bridge bridge0 port em0 state {}", state))
            .unwrap();
    }

    let bridge = Bridge::open(kernel, "bridge0").unwrap();
    assert_eq!(bridge.ports().count(), 2);
    assert_eq!(bridge.port("em0").unwrap().state(), StpState::Forwarding);
    assert_eq!(bridge.port("em1").unwrap().state(), StpState::Disabled);
}

#[test]
fn test_learning_only_reaches_kernel_when_forwarding() {
    let (kernel, mut d, _) = two_port_bridge();
    d.execute("bridge bridge0 port em1 learning on").unwrap();
    let bridge = Bridge::open(kernel.clone(), "bridge0").unwrap();
    assert!(!bridge
        .port("em1")
        .unwrap()
        .kernel_flags()
        .contains(PortFlags::LEARNING));

    for state in ["listening", "learning", "forwarding"] {
        d.execute(&format!("bridge bridge0 port em1 state {}", state))
            .unwrap();
    }
    let bridge = Bridge::open(kernel, "bridge0").unwrap();
    assert!(bridge
        .port("em1")
        .unwrap()
        .kernel_flags()
        .contains(PortFlags::LEARNING));
}

#[test]
fn test_any_state_can_be_disabled() {
    let (_, mut d, out) = two_port_bridge();
    d.execute("bridge bridge0 port em0 state listening").unwrap();
    d.execute("bridge bridge0 port em0 state blocking").unwrap();
    d.execute("bridge bridge0 port em0 state disabled").unwrap();
    assert!(matches!(
        d.execute("bridge bridge0 port em0 state learning"),
        Err(Error::InvalidTransition { .. })
    ));
    d.execute("show bridge bridge0").unwrap();
    assert!(out.take().contains("member em0 state disabled"));
}

#[test]
fn test_port_stats_reset() {
    let (kernel, mut d, out) = setup();
    d.execute("create interface bridge").unwrap();
    d.execute("bridge bridge0 add em0").unwrap();
    kernel.add_counters(
        "em0",
        IfCounters {
            ipackets: 10,
            opackets: 4,
            ..Default::default()
        },
    );
    out.take();
    d.execute("show bridge bridge0").unwrap();
    assert!(out.take().contains("in 10 pkts"));

    d.execute("bridge bridge0 port em0 reset-stats").unwrap();
    kernel.add_counters(
        "em0",
        IfCounters {
            ipackets: 1,
            ..Default::default()
        },
    );
    d.execute("show bridge bridge0").unwrap();
    let text = out.take();
    assert!(text.contains("in 1 pkts"));
    assert!(text.contains("out 0 pkts"));
}

#[test]
fn test_member_removed_with_interface() {
    let (kernel, mut d, _) = two_port_bridge();
    d.execute("create interface vlan").unwrap();
    d.execute("bridge bridge0 add vlan0").unwrap();
    d.execute("delete interface vlan0").unwrap();

    let bridge = Bridge::open(kernel, "bridge0").unwrap();
    assert!(matches!(
        bridge.port("vlan0"),
        Err(Error::NotFound { .. })
    ));
}
