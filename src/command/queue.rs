//! `queue` handler

use super::{need, parse_num, Session};
use crate::altq::{parse_bandwidth, Queue, QueueConfig};
use crate::{Error, Result};

const USAGE: &str = "queue add <name> <interface> <bandwidth> [min|max <bw>] [priority|weight <n>] | queue enable|disable|remove <name>";

pub(super) fn run(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 3, USAGE)?;
    let kernel = session.kernel();
    let name = tokens[2];
    match tokens[1].to_ascii_lowercase().as_str() {
        "add" => {
            need(tokens, 5, USAGE)?;
            let config = parse_config(name, tokens[3], tokens[4], &tokens[5..])?;
            Queue::create(kernel, config).map(|_| ())
        }
        "enable" => Queue::open(kernel, name)?.enable(),
        "disable" => Queue::open(kernel, name)?.disable(),
        "remove" | "delete" => Queue::open(kernel, name)?.remove(),
        _ => Err(Error::Usage(USAGE.to_string())),
    }
}

/// Build a queue from its positional arguments and `key value` options.
fn parse_config(name: &str, interface: &str, bandwidth: &str, options: &[&str]) -> Result<QueueConfig> {
    let mut config = QueueConfig::new(name, interface, parse_bandwidth(bandwidth)?);
    for pair in options.chunks(2) {
        let [key, value] = pair else {
            return Err(Error::Usage(USAGE.to_string()));
        };
        match key.to_ascii_lowercase().as_str() {
            "min" => config.min_bandwidth = parse_bandwidth(value)?,
            "max" => config.max_bandwidth = parse_bandwidth(value)?,
            "priority" => config.priority = parse_num("priority", value)?,
            "weight" => config.weight = parse_num("weight", value)?,
            _ => return Err(Error::Usage(USAGE.to_string())),
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::dispatcher;
    use crate::kernel::SysctlValue;

    #[test]
    fn test_parse_config_options() {
        let config = parse_config("voip", "em0", "2Mb", &["min", "512Kb", "priority", "7"]).unwrap();
        assert_eq!(config.bandwidth, 2_000_000);
        assert_eq!(config.min_bandwidth, 512_000);
        assert_eq!(config.priority, 7);
        assert_eq!(config.weight, 1);

        assert!(matches!(
            parse_config("voip", "em0", "2Mb", &["min"]),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            parse_config("voip", "em0", "fast", &[]),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_queue_lifecycle() {
        let (_, mut d, out) = dispatcher();
        d.execute("queue add bulk em0 10Mb max 20Mb weight 5").unwrap();
        d.execute("queue enable bulk").unwrap();
        d.execute("show queues").unwrap();
        assert_eq!(
            out.take(),
            "bulk on em0 bandwidth 10Mb priority 1 weight 5 max 20Mb enabled\n"
        );
        d.execute("queue disable bulk").unwrap();
        d.execute("queue remove bulk").unwrap();
        assert!(matches!(
            d.execute("queue enable bulk"),
            Err(Error::NotFound { what: "queue", .. })
        ));
    }

    #[test]
    fn test_queue_rejections() {
        let (kernel, mut d, _) = dispatcher();
        assert!(matches!(
            d.execute("queue add bulk em0 10Mb priority 99"),
            Err(Error::InvalidQueue { .. })
        ));
        assert!(matches!(
            d.execute("queue add bulk em9 10Mb"),
            Err(Error::NotFound { what: "interface", .. })
        ));
        d.execute("queue add bulk em0 10Mb").unwrap();
        assert!(matches!(
            d.execute("queue add bulk em1 1Mb"),
            Err(Error::AlreadyExists(_))
        ));

        kernel.set_sysctl("kern.features.altq", SysctlValue::Int(0));
        assert!(matches!(
            d.execute("queue add voip em0 1Mb"),
            Err(Error::NotSupported(_))
        ));
    }
}
