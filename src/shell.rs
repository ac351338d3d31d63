//! Interactive line loop
//!
//! Reads one command per line and hands it to the [`Dispatcher`]. `exit`,
//! `quit` and `clear` are handled here and never reach the command table.
//! A failing command prints its error and the loop carries on.

use crate::command::Dispatcher;
use crate::{Error, Result};
use std::io::{BufRead, Write};
use tracing::debug;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub struct Shell<W: Write> {
    prompt: String,
    /// Prompt, error and terminal-control output.
    term: W,
}

impl<W: Write> Shell<W> {
    pub fn new(prompt: impl Into<String>, term: W) -> Self {
        Self {
            prompt: prompt.into(),
            term,
        }
    }

    /// Run until end of input or `exit`/`quit`. Returns the number of
    /// commands that failed.
    pub fn run(&mut self, dispatcher: &mut Dispatcher, input: impl BufRead) -> Result<u64> {
        let mut failures = 0;
        let mut lines = input.lines();
        loop {
            write!(self.term, "{}", self.prompt)?;
            self.term.flush()?;

            let Some(line) = lines.next().transpose()? else {
                writeln!(self.term)?;
                break;
            };
            let line = line.trim();

            match line.to_ascii_lowercase().as_str() {
                "exit" | "quit" => break,
                "clear" => {
                    write!(self.term, "{}", CLEAR_SCREEN)?;
                    continue;
                }
                _ => {}
            }

            if let Err(e) = dispatcher.execute(line) {
                failures += 1;
                self.report(&e)?;
            }
        }
        debug!("shell finished with {} failed command(s)", failures);
        Ok(failures)
    }

    fn report(&mut self, err: &Error) -> Result<()> {
        writeln!(self.term, "error: {}", err)?;
        if err.is_usage() {
            writeln!(self.term, "type 'help' for command syntax")?;
        }
        Ok(())
    }
}
