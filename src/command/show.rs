//! `show` handlers

use super::{need, Session};
use crate::altq::{Bandwidth, Queue};
use crate::iface::media::IFM_ETHER;
use crate::iface::Interface;
use crate::system::SystemConfig;
use crate::{Error, Result};
use std::io::Write;

const USAGE: &str = "show interfaces | interface <name> | system | bridge <name> | queues";

pub(super) fn run(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 2, USAGE)?;
    match tokens[1].to_ascii_lowercase().as_str() {
        "interface" | "interfaces" => match tokens.get(2) {
            Some(name) => {
                let iface = session.registry.require_interface(name)?;
                write_interface(&mut session.out, &iface)
            }
            None => {
                for iface in session.registry.list_interfaces()? {
                    write_interface(&mut session.out, &iface)?;
                }
                Ok(())
            }
        },
        "system" => {
            let snapshot = SystemConfig::new(session.kernel()).read()?;
            writeln!(session.out, "{}", snapshot)?;
            Ok(())
        }
        "bridge" => {
            need(tokens, 3, "show bridge <name>")?;
            show_bridge(session, tokens[2])
        }
        "queues" => show_queues(session),
        _ => Err(Error::Usage(USAGE.to_string())),
    }
}

/// ifconfig-style block for one interface.
fn write_interface(out: &mut dyn Write, iface: &Interface) -> Result<()> {
    writeln!(
        out,
        "{}: flags={} mtu {}",
        iface.name(),
        iface.flags()?,
        iface.mtu()?
    )?;
    writeln!(
        out,
        "\ttype {} index {} fib {}",
        iface.kind(),
        iface.index(),
        iface.fib()?
    )?;

    let caps = iface.capabilities()?;
    if !caps.supported.is_empty() {
        writeln!(out, "\toptions={}", caps.enabled & caps.supported)?;
        writeln!(out, "\tcapabilities={}", caps.supported)?;
    }
    if let Some(mac) = iface.mac_address()? {
        writeln!(out, "\tether {}", mac)?;
    }
    for addr in iface.addresses()? {
        write!(out, "\tinet {} netmask {}", addr.addr, addr.netmask())?;
        if addr.prefix_len < 31 {
            write!(out, " broadcast {}", addr.broadcast())?;
        }
        writeln!(out)?;
    }
    if let Some(media) = iface.media()? {
        let network = if media.current.network() == IFM_ETHER {
            "Ethernet "
        } else {
            ""
        };
        if media.active != media.current {
            writeln!(out, "\tmedia: {}{} ({})", network, media.current, media.active)?;
        } else {
            writeln!(out, "\tmedia: {}{}", network, media.current)?;
        }
        match media.link_active() {
            Some(true) => writeln!(out, "\tstatus: active")?,
            Some(false) => writeln!(out, "\tstatus: no carrier")?,
            None => {}
        }
    }
    let groups = iface.groups()?;
    if !groups.is_empty() {
        writeln!(out, "\tgroups: {}", groups.join(" "))?;
    }
    let counters = iface.counters()?;
    writeln!(
        out,
        "\tpackets in {} out {} errors in {} out {}",
        counters.ipackets, counters.opackets, counters.ierrors, counters.oerrors
    )?;
    Ok(())
}

fn show_bridge(session: &mut Session, name: &str) -> Result<()> {
    let kernel = session.kernel();
    let bridge = session.bridges.get_mut(&kernel, name)?;
    writeln!(session.out, "{}:", bridge.name())?;
    for port in bridge.ports() {
        let stats = bridge.port_stats(port.member())?;
        writeln!(
            session.out,
            "\tmember {} state {} learning {} flooding {} stp {}",
            port.member(),
            port.state(),
            on_off(port.learning()),
            on_off(port.flooding()),
            on_off(port.stp()),
        )?;
        writeln!(
            session.out,
            "\t\tin {} pkts {} bytes out {} pkts {} bytes drops {}",
            stats.packets_in, stats.bytes_in, stats.packets_out, stats.bytes_out, stats.drops
        )?;
    }
    Ok(())
}

fn show_queues(session: &mut Session) -> Result<()> {
    let queues = Queue::list(&session.kernel())?;
    if queues.is_empty() {
        writeln!(session.out, "no queues")?;
    }
    for status in queues {
        let q = &status.config;
        write!(
            session.out,
            "{} on {} bandwidth {} priority {} weight {}",
            q.name,
            q.interface,
            Bandwidth(q.bandwidth),
            q.priority,
            q.weight
        )?;
        if q.min_bandwidth > 0 {
            write!(session.out, " min {}", Bandwidth(q.min_bandwidth))?;
        }
        if q.max_bandwidth > 0 {
            write!(session.out, " max {}", Bandwidth(q.max_bandwidth))?;
        }
        writeln!(
            session.out,
            " {}",
            if status.enabled { "enabled" } else { "disabled" }
        )?;
    }
    Ok(())
}

fn on_off(b: bool) -> &'static str {
    if b {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use crate::command::tests::dispatcher;
    use crate::Error;

    #[test]
    fn test_show_all_interfaces() {
        let (_, mut d, out) = dispatcher();
        d.execute("show interfaces").unwrap();
        let text = out.take();
        let names: Vec<&str> = text
            .lines()
            .filter(|l| !l.starts_with('\t'))
            .filter_map(|l| l.split(':').next())
            .collect();
        assert_eq!(names, vec!["lo0", "em0", "em1"]);
        assert!(text.contains("inet 127.0.0.1 netmask 255.0.0.0"));
        assert!(text.contains("ether 00:0c:29:3e:5a:01"));
    }

    #[test]
    fn test_show_one_interface() {
        let (_, mut d, out) = dispatcher();
        d.execute("show interface em0").unwrap();
        let text = out.take();
        assert!(text.starts_with("em0: flags="));
        assert!(text.contains("type ethernet"));
        assert!(text.contains("media: Ethernet autoselect"));
        assert!(!text.contains("lo0"));

        assert!(matches!(
            d.execute("show interface em7"),
            Err(Error::NotFound { what: "interface", .. })
        ));
    }

    #[test]
    fn test_show_system() {
        let (_, mut d, out) = dispatcher();
        d.execute("show system").unwrap();
        let text = out.take();
        assert!(text.contains("fibs:                4"));
        assert!(text.contains("ipv4 forwarding:     disabled"));
    }

    #[test]
    fn test_show_usage() {
        let (_, mut d, _) = dispatcher();
        assert!(matches!(d.execute("show"), Err(Error::Usage(_))));
        assert!(matches!(d.execute("show routes"), Err(Error::Usage(_))));
        assert!(matches!(d.execute("show bridge"), Err(Error::Usage(_))));
    }

    #[test]
    fn test_show_bridge_and_queues() {
        let (_, mut d, out) = dispatcher();
        d.execute("create interface bridge").unwrap();
        d.execute("bridge bridge0 add em1").unwrap();
        out.take();
        d.execute("show bridge bridge0").unwrap();
        let text = out.take();
        assert!(text.starts_with("bridge0:"));
        assert!(text.contains("member em1 state disabled learning on flooding on stp off"));

        d.execute("show queues").unwrap();
        assert_eq!(out.take(), "no queues\n");
        d.execute("queue add bulk em0 10Mb priority 3").unwrap();
        d.execute("show queues").unwrap();
        assert_eq!(
            out.take(),
            "bulk on em0 bandwidth 10Mb priority 3 weight 1 disabled\n"
        );
    }
}
