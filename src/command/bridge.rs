//! `bridge` handler

use super::{need, parse_on_off, Session};
use crate::bridge::StpState;
use crate::{Error, Result};

const USAGE: &str = "bridge <bridge> add | remove <member> | port <member> <setting> [value]";

pub(super) fn run(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 4, USAGE)?;
    let kernel = session.kernel();
    let bridge = session.bridges.get_mut(&kernel, tokens[1])?;
    let member = tokens[3];

    match tokens[2].to_ascii_lowercase().as_str() {
        "add" | "addm" => bridge.add_port(member).map(|_| ()),
        "remove" | "deletem" => bridge.remove_port(member),
        "port" => {
            need(tokens, 5, USAGE)?;
            let setting = tokens[4].to_ascii_lowercase();
            if setting == "reset-stats" {
                return bridge.reset_stats(member);
            }
            need(tokens, 6, USAGE)?;
            let value = tokens[5];
            match setting.as_str() {
                "state" => bridge.set_port_state(member, value.parse::<StpState>()?),
                "learning" => bridge.set_learning(member, parse_on_off(value)?),
                "flooding" | "discover" => bridge.set_flooding(member, parse_on_off(value)?),
                "stp" => bridge.set_stp(member, parse_on_off(value)?),
                _ => Err(Error::Usage(USAGE.to_string())),
            }
        }
        _ => Err(Error::Usage(USAGE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use crate::bridge::{Bridge, PortFlags, StpState};
    use crate::command::tests::dispatcher;
    use crate::Error;

    #[test]
    fn test_port_state_walk() {
        let (kernel, mut d, _) = dispatcher();
        d.execute("create interface bridge").unwrap();
        d.execute("bridge bridge0 add em0").unwrap();
        for state in ["listening", "learning", "forwarding"] {
            d.execute(&format!("bridge bridge0 port em0 state {}", state))
                .unwrap();
        }

        // a fresh view of the kernel sees the forwarding member
        let bridge = Bridge::open(kernel, "bridge0").unwrap();
        let port = bridge.port("em0").unwrap();
        assert_eq!(port.state(), StpState::Forwarding);
        assert!(port
            .kernel_flags()
            .contains(PortFlags::LEARNING | PortFlags::DISCOVER));
    }

    #[test]
    fn test_illegal_transition_keeps_state() {
        let (_, mut d, out) = dispatcher();
        d.execute("create interface bridge").unwrap();
        d.execute("bridge bridge0 add em1").unwrap();
        assert!(matches!(
            d.execute("bridge bridge0 port em1 state forwarding"),
            Err(Error::InvalidTransition { from: "disabled", to: "forwarding", .. })
        ));
        out.take();
        d.execute("show bridge bridge0").unwrap();
        assert!(out.take().contains("member em1 state disabled"));
    }

    #[test]
    fn test_toggles_and_removal() {
        let (_, mut d, out) = dispatcher();
        d.execute("create interface bridge").unwrap();
        d.execute("bridge bridge0 add em1").unwrap();
        d.execute("bridge bridge0 port em1 learning off").unwrap();
        d.execute("bridge bridge0 port em1 stp on").unwrap();
        d.execute("bridge bridge0 port em1 reset-stats").unwrap();
        out.take();
        d.execute("show bridge bridge0").unwrap();
        assert!(out
            .take()
            .contains("member em1 state disabled learning off flooding on stp on"));

        d.execute("bridge bridge0 remove em1").unwrap();
        d.execute("show bridge bridge0").unwrap();
        assert_eq!(out.take(), "bridge0:\n");
        assert!(matches!(
            d.execute("bridge bridge0 port em1 stp on"),
            Err(Error::NotFound { what: "bridge member", .. })
        ));
    }

    #[test]
    fn test_bridge_errors() {
        let (_, mut d, _) = dispatcher();
        assert!(matches!(
            d.execute("bridge em0 add em1"),
            Err(Error::UnsupportedType(_))
        ));
        assert!(matches!(
            d.execute("bridge bridge3 add em1"),
            Err(Error::NotFound { .. })
        ));
        d.execute("create interface bridge").unwrap();
        assert!(matches!(d.execute("bridge bridge0 add"), Err(Error::Usage(_))));
        assert!(matches!(
            d.execute("bridge bridge0 add em7"),
            Err(Error::NotFound { .. })
        ));
        d.execute("bridge bridge0 add em0").unwrap();
        assert!(matches!(
            d.execute("bridge bridge0 add em0"),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            d.execute("bridge bridge0 port em0 state sleeping"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            d.execute("bridge bridge0 port em0 colour red"),
            Err(Error::Usage(_))
        ));
    }

    #[test]
    fn test_destroyed_bridge_is_forgotten() {
        let (_, mut d, _) = dispatcher();
        d.execute("create interface bridge").unwrap();
        d.execute("bridge bridge0 add em0").unwrap();
        d.execute("delete interface bridge0").unwrap();
        assert!(matches!(
            d.execute("bridge bridge0 add em0"),
            Err(Error::NotFound { .. })
        ));
    }
}
