use bsdnet::command::{CommandTable, Dispatcher, Session};
use bsdnet::config::{self, Config, KernelBackend};
use bsdnet::shell::Shell;
use bsdnet::telemetry::init_logging;
use bsdnet::kernel::{self, Kernel};
use bsdnet::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "nettool")]
#[command(about = "Configure FreeBSD interfaces, bridges and traffic queues")]
struct Cli {
    /// Path to nettool.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory kernel instead of the running system
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single command, e.g. `nettool exec show interfaces`
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Start the interactive shell (the default)
    Shell,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check nettool.toml and report problems
    Validate,
}

fn main() {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::Config {
            action: ConfigAction::Validate,
        }) => cmd_config_validate(cli.config.as_deref()),
        Some(Commands::Exec { words }) => {
            cmd_exec(cli.config.as_deref(), cli.simulate, &words.join(" "))
        }
        Some(Commands::Shell) | None => cmd_shell(cli.config.as_deref(), cli.simulate),
    };

    if let Err(e) = outcome {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

/// Load configuration, start logging and build a dispatcher writing to stdout.
fn start(config_path: Option<&Path>, simulate: bool, default_level: Level) -> Result<(Config, Dispatcher)> {
    let cfg = config::load_or_default(config_path)?;
    init_logging(cfg.logging.as_ref(), default_level);

    let backend = if simulate {
        KernelBackend::Simulated
    } else {
        cfg.kernel.backend
    };
    let kernel = kernel::open(backend, &cfg.simulated)?;
    info!("kernel binding: {}", kernel.name());

    let table = CommandTable::with_aliases(&cfg.commands.aliases)?;
    let session = Session::new(kernel, Box::new(io::stdout()));
    Ok((cfg, Dispatcher::new(table, session)))
}

fn cmd_exec(config_path: Option<&Path>, simulate: bool, line: &str) -> Result<()> {
    let (_, mut dispatcher) = start(config_path, simulate, Level::INFO)?;
    dispatcher.execute(line)
}

fn cmd_shell(config_path: Option<&Path>, simulate: bool) -> Result<()> {
    let (cfg, mut dispatcher) = start(config_path, simulate, Level::WARN)?;
    println!("nettool: type 'help' for commands, 'exit' to leave");

    let mut shell = Shell::new(cfg.shell.prompt, io::stderr());
    shell.run(&mut dispatcher, io::stdin().lock())?;
    dispatcher.metrics().log_summary();
    Ok(())
}

fn cmd_config_validate(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.unwrap_or(Path::new(config::DEFAULT_PATH));
    println!("[INFO] Validating {}...", path.display());

    let cfg = config::load(path)?;
    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err(bsdnet::Error::Config("validation failed".to_string()))
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
