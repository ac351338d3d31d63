//! `set system` handler

use super::{need, parse_on_off, Session};
use crate::system::SystemConfig;
use crate::{Error, Result};

const USAGE: &str = "set system forwarding | forwarding6 on | off";

pub(super) fn set(session: &mut Session, tokens: &[&str]) -> Result<()> {
    need(tokens, 4, USAGE)?;
    let system = SystemConfig::new(session.kernel());
    let enabled = parse_on_off(tokens[3])?;
    match tokens[2].to_ascii_lowercase().as_str() {
        "forwarding" => system.set_ip_forwarding(enabled),
        "forwarding6" => system.set_ip6_forwarding(enabled),
        _ => Err(Error::Usage(USAGE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use crate::command::tests::dispatcher;
    use crate::system::SystemConfig;
    use crate::Error;

    #[test]
    fn test_set_forwarding() {
        let (kernel, mut d, _) = dispatcher();
        let system = SystemConfig::new(kernel);
        d.execute("set system forwarding on").unwrap();
        assert!(system.ip_forwarding().unwrap());
        d.execute("set system forwarding6 on").unwrap();
        assert!(system.read().unwrap().ip6_forwarding);
        d.execute("set system forwarding off").unwrap();
        assert!(!system.ip_forwarding().unwrap());

        assert!(matches!(
            d.execute("set system forwarding"),
            Err(Error::Usage(_))
        ));
        assert!(matches!(
            d.execute("set system ttl on"),
            Err(Error::Usage(_))
        ));
    }
}
