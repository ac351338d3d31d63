//! Command dispatch
//!
//! A [`CommandTable`] maps lowercase verbs to handlers and is built once,
//! explicitly, from the built-in commands plus configured aliases. The
//! [`Dispatcher`] tokenizes a line on whitespace (no quoting), resolves the
//! verb and hands the full token list, verb included, to the handler. Each
//! handler checks its own arguments.

mod bridge;
mod interface;
mod queue;
mod show;
mod system;

use crate::bridge::BridgeTable;
use crate::iface::Registry;
use crate::kernel::Kernel;
use crate::telemetry::CommandMetrics;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a handler may touch.
pub struct Session {
    pub(crate) registry: Registry,
    pub(crate) bridges: BridgeTable,
    pub(crate) out: Box<dyn Write>,
}

impl Session {
    pub fn new(kernel: Arc<dyn Kernel>, out: Box<dyn Write>) -> Self {
        Self {
            registry: Registry::new(kernel),
            bridges: BridgeTable::new(),
            out,
        }
    }

    pub fn kernel(&self) -> Arc<dyn Kernel> {
        self.registry.kernel().clone()
    }

    pub fn registry(&mut self) -> &mut Registry {
        &mut self.registry
    }
}

pub type Handler = fn(&mut Session, &[&str]) -> Result<()>;

#[derive(Clone, Copy)]
pub struct Command {
    pub verb: &'static str,
    pub usage: &'static [&'static str],
    pub handler: Handler,
}

const BUILTIN: &[Command] = &[
    Command {
        verb: "show",
        usage: &[
            "show interfaces",
            "show interface <name>",
            "show system",
            "show bridge <name>",
            "show queues",
        ],
        handler: show::run,
    },
    Command {
        verb: "create",
        usage: &["create interface <type> [name]"],
        handler: interface::create,
    },
    Command {
        verb: "delete",
        usage: &["delete interface <name> [fib | address <addr> | group <group>]"],
        handler: interface::delete,
    },
    Command {
        verb: "set",
        usage: &[
            "set interface <name> up | down",
            "set interface <name> fib <n> | mtu <n> | mac <addr>",
            "set interface <name> media <media> [full-duplex | half-duplex]",
            "set interface <name> group <group> | address <addr/prefix>",
            "set interface <name> capability enable | disable | set <cap[,cap...]>",
            "set system forwarding | forwarding6 on | off",
        ],
        handler: interface::set,
    },
    Command {
        verb: "bridge",
        usage: &[
            "bridge <bridge> add | remove <member>",
            "bridge <bridge> port <member> state <state>",
            "bridge <bridge> port <member> learning | flooding | stp on | off",
            "bridge <bridge> port <member> reset-stats",
        ],
        handler: bridge::run,
    },
    Command {
        verb: "queue",
        usage: &[
            "queue add <name> <interface> <bandwidth> [min <bw>] [max <bw>] [priority <n>] [weight <n>]",
            "queue enable | disable | remove <name>",
        ],
        handler: queue::run,
    },
    Command {
        verb: "help",
        usage: &["help"],
        handler: help,
    },
];

/// Verbs available without configuration.
pub const BUILTIN_VERBS: &[&str] = &["show", "create", "delete", "set", "bridge", "queue", "help"];

/// Verb to command mapping, immutable once built.
pub struct CommandTable {
    commands: HashMap<String, Command>,
}

impl CommandTable {
    pub fn builtin() -> Self {
        Self {
            commands: BUILTIN
                .iter()
                .map(|cmd| (cmd.verb.to_string(), *cmd))
                .collect(),
        }
    }

    /// Built-in commands plus `aliases` (alias -> built-in verb).
    pub fn with_aliases(aliases: &BTreeMap<String, String>) -> Result<Self> {
        let mut table = Self::builtin();
        for (alias, target) in aliases {
            let alias = alias.to_lowercase();
            if table.commands.contains_key(&alias) {
                return Err(Error::Config(format!(
                    "alias '{}' shadows an existing command",
                    alias
                )));
            }
            let command = table
                .commands
                .get(&target.to_lowercase())
                .copied()
                .ok_or_else(|| {
                    Error::Config(format!("alias '{}' targets unknown command '{}'", alias, target))
                })?;
            table.commands.insert(alias, command);
        }
        Ok(table)
    }

    pub fn lookup(&self, verb: &str) -> Option<&Command> {
        self.commands.get(verb)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Resolves and runs command lines against a session.
pub struct Dispatcher {
    table: CommandTable,
    session: Session,
    metrics: CommandMetrics,
}

impl Dispatcher {
    pub fn new(table: CommandTable, session: Session) -> Self {
        Self {
            table,
            session,
            metrics: CommandMetrics::new(),
        }
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn metrics(&self) -> &CommandMetrics {
        &self.metrics
    }

    /// Run one line. Empty lines succeed without doing anything; a failure
    /// never ends the session.
    pub fn execute(&mut self, line: &str) -> Result<()> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            return Ok(());
        };
        let verb = first.to_lowercase();

        let Some(command) = self.table.lookup(&verb).copied() else {
            let err = Error::UnknownCommand(verb);
            self.metrics.record(None, Err(&err));
            return Err(err);
        };

        debug!("dispatch {:?}", tokens);
        let result = (command.handler)(&mut self.session, &tokens);
        self.metrics.record(Some(command.verb), result.as_ref().map(|_| ()));
        if let Err(e) = &result {
            warn!("{} failed: {}", command.verb, e);
        }
        // keep output ordered with whatever the caller prints next
        self.session.out.flush()?;
        result
    }
}

fn help(session: &mut Session, _tokens: &[&str]) -> Result<()> {
    for command in BUILTIN {
        for line in command.usage {
            writeln!(session.out, "  {}", line)?;
        }
    }
    writeln!(session.out, "  exit | quit | clear")?;
    Ok(())
}

/// Fail with a usage error unless at least `n` tokens are present.
fn need(tokens: &[&str], n: usize, usage: &str) -> Result<()> {
    if tokens.len() < n {
        return Err(Error::Usage(usage.to_string()));
    }
    Ok(())
}

fn parse_num<T: FromStr>(what: &str, s: &str) -> Result<T> {
    s.parse()
        .map_err(|_| Error::Parse(format!("invalid {} '{}'", what, s)))
}

fn parse_on_off(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "on" | "enable" | "yes" => Ok(true),
        "off" | "disable" | "no" => Ok(false),
        _ => Err(Error::Parse(format!("expected on or off, got '{}'", s))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::kernel::SimKernel;
    use std::sync::Mutex;

    /// Output sink the test can read back.
    #[derive(Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn take(&self) -> String {
            let mut buf = self.0.lock().unwrap();
            String::from_utf8(std::mem::take(&mut *buf)).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn dispatcher() -> (Arc<SimKernel>, Dispatcher, Capture) {
        let kernel = Arc::new(SimKernel::with_defaults());
        let capture = Capture::default();
        let session = Session::new(kernel.clone(), Box::new(capture.clone()));
        (kernel, Dispatcher::new(CommandTable::builtin(), session), capture)
    }

    #[test]
    fn test_empty_line_is_a_no_op() {
        let (_, mut d, out) = dispatcher();
        d.execute("").unwrap();
        d.execute("   \t ").unwrap();
        assert_eq!(out.take(), "");
        assert_eq!(d.metrics().dispatched.get(), 0);
    }

    #[test]
    fn test_unknown_verb_does_not_end_session() {
        let (_, mut d, out) = dispatcher();
        assert!(matches!(
            d.execute("frobnicate em0"),
            Err(Error::UnknownCommand(ref v)) if v == "frobnicate"
        ));
        d.execute("show interface em0").unwrap();
        assert!(out.take().starts_with("em0:"));
        assert_eq!(d.metrics().unknown.get(), 1);
    }

    #[test]
    fn test_verb_is_case_insensitive() {
        let (_, mut d, out) = dispatcher();
        d.execute("SHOW interface lo0").unwrap();
        assert!(out.take().starts_with("lo0:"));
    }

    #[test]
    fn test_aliases() {
        let mut aliases = BTreeMap::new();
        aliases.insert("LS".to_string(), "show".to_string());
        let table = CommandTable::with_aliases(&aliases).unwrap();
        assert_eq!(table.len(), BUILTIN_VERBS.len() + 1);
        assert_eq!(table.lookup("ls").map(|c| c.verb), Some("show"));

        aliases.insert("set".to_string(), "show".to_string());
        assert!(matches!(
            CommandTable::with_aliases(&aliases),
            Err(Error::Config(_))
        ));

        let mut bad = BTreeMap::new();
        bad.insert("zap".to_string(), "destroy".to_string());
        assert!(matches!(CommandTable::with_aliases(&bad), Err(Error::Config(_))));
    }

    #[test]
    fn test_builtin_verbs_match_table() {
        let table = CommandTable::builtin();
        for verb in BUILTIN_VERBS {
            assert!(table.lookup(verb).is_some(), "{verb}");
        }
        assert_eq!(table.len(), BUILTIN_VERBS.len());
    }

    #[test]
    fn test_help_lists_usage() {
        let (_, mut d, out) = dispatcher();
        d.execute("help").unwrap();
        let text = out.take();
        assert!(text.contains("create interface <type> [name]"));
        assert!(text.contains("exit | quit | clear"));
    }

    #[test]
    fn test_parse_helpers() {
        assert!(parse_on_off("ON").unwrap());
        assert!(!parse_on_off("off").unwrap());
        assert!(parse_on_off("maybe").is_err());
        assert_eq!(parse_num::<u32>("mtu", "9000").unwrap(), 9000);
        assert!(matches!(parse_num::<u32>("mtu", "big"), Err(Error::Parse(_))));
        assert!(matches!(need(&["set"], 2, "set ..."), Err(Error::Usage(_))));
    }
}
