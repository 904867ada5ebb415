use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::host::{Display, Network, Owner, StaticCatalog};
use crate::machine::{Collaborators, Instance};
use crate::parser::{parse_program, semantic_validator};
use crate::types::Value;

/// Address of the echo component the loopback network exposes
pub const LOOPBACK_ADDRESS: &str = "loopback";

#[derive(Parser)]
#[command(name = "machine")]
#[command(about = "Machine - run and inspect virtual computer kernels", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Boot a kernel and drive it for a number of ticks
    Run {
        /// Kernel source file
        kernel: PathBuf,

        /// Number of host ticks to run (default: 100)
        #[arg(short = 't', long = "ticks", default_value = "100")]
        ticks: u64,

        /// Signal to queue after the first tick, as name[:arg,...]
        #[arg(short = 's', long = "signal")]
        signals: Vec<String>,
    },

    /// Parse and validate a guest program
    Check {
        /// Source file to check
        file: PathBuf,
    },

    /// Run a kernel, then write the saved machine record as JSON
    Snapshot {
        /// Kernel source file
        kernel: PathBuf,

        /// Number of host ticks to run (default: 100)
        #[arg(short = 't', long = "ticks", default_value = "100")]
        ticks: u64,

        /// Signal to queue after the first tick, as name[:arg,...]
        #[arg(short = 's', long = "signal")]
        signals: Vec<String>,

        /// Output file
        #[arg(short = 'o', long = "out")]
        out: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with already-split arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Config errors surface before any command output
    let config = Config::builder().config_path(cli.config.clone()).build()?;

    match cli.command {
        Commands::Run {
            kernel,
            ticks,
            signals,
        } => {
            let (instance, engine) = drive(&config, &kernel, ticks, &signals)?;
            println!("State: {:?}", instance.state());
            println!("Kernel memory: {} bytes", instance.kernel_memory());
            println!("CPU time: {:.3} ms", instance.cpu_time_ns() as f64 / 1e6);
            if let Some(message) = instance.message() {
                println!("Message: {}", message);
            }
            finish(instance, engine);
        }

        Commands::Check { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let program = match parse_program(&source) {
                Ok(program) => program,
                Err(e) => bail!("{}: {}", file.display(), e),
            };

            let problems = semantic_validator::validate_program(&program);
            for problem in &problems {
                println!("{}: {}", file.display(), problem);
            }

            let errors = problems.iter().filter(|p| p.is_error()).count();
            if errors > 0 {
                bail!("{} error(s) in {}", errors, file.display());
            }
            println!("✓ {} is valid", file.display());
        }

        Commands::Snapshot {
            kernel,
            ticks,
            signals,
            out,
        } => {
            let (instance, engine) = drive(&config, &kernel, ticks, &signals)?;
            let record = instance.save()?;
            let json = serde_json::to_string_pretty(&record)?;
            std::fs::write(&out, json)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("✓ Saved {:?} machine to {}", instance.state(), out.display());
            finish(instance, engine);
        }

        Commands::Config => {
            let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{}", text);
        }
    }

    Ok(())
}

/// Boot one instance on a loopback network and tick it `ticks` times
fn drive(
    config: &Config,
    kernel: &Path,
    ticks: u64,
    signals: &[String],
) -> Result<(Instance, Arc<Engine>)> {
    let source = std::fs::read_to_string(kernel)
        .with_context(|| format!("Failed to read {}", kernel.display()))?;
    let signals = signals
        .iter()
        .map(|arg| parse_signal(arg))
        .collect::<Result<Vec<_>>>()?;

    let engine = Arc::new(Engine::new(&config.pool)?);
    let owner = Arc::new(ConsoleOwner::default());
    let collaborators = Collaborators {
        network: Arc::new(LoopbackNetwork),
        owner: owner.clone(),
        catalog: Arc::new(StaticCatalog::new().with_kernel(source)),
    };

    let address = uuid::Uuid::new_v4().to_string();
    let instance = Instance::new(address, config.machine.clone(), engine.clone(), collaborators);

    if !instance.start() {
        let reason = instance.message().unwrap_or_else(|| "unknown error".to_string());
        bail!("Machine failed to start: {}", reason);
    }
    tracing::info!(address = %instance.address(), "Booted");

    let tick = Duration::from_millis(1000 / u64::from(config.machine.ticks_per_second.max(1)));
    for n in 0..ticks {
        owner.advance();
        instance.update();
        if n == 0 {
            for (name, args) in &signals {
                if !instance.signal(name, args.clone()) {
                    tracing::warn!(signal = %name, "Signal dropped");
                }
            }
        }
        std::thread::sleep(tick);
    }

    // Let an in-flight resume land before the caller inspects or saves
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while instance.is_busy() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    Ok((instance, engine))
}

/// Stop the instance and wind down the worker pool
fn finish(instance: Instance, engine: Arc<Engine>) {
    drop(instance);
    if let Ok(engine) = Arc::try_unwrap(engine) {
        engine.shutdown(Duration::from_secs(1));
    }
}

/// Parse `name[:arg,...]`; arguments are numbers, booleans, `nil` or strings
pub fn parse_signal(arg: &str) -> Result<(String, Vec<Value>)> {
    let (name, rest) = match arg.split_once(':') {
        Some((name, rest)) => (name, Some(rest)),
        None => (arg, None),
    };
    if name.is_empty() {
        bail!("Signal name missing in '{}'", arg);
    }

    let args = rest
        .map(|rest| rest.split(',').map(parse_arg).collect())
        .unwrap_or_default();
    Ok((name.to_string(), args))
}

fn parse_arg(text: &str) -> Value {
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" => Value::Nothing,
        _ => text
            .parse::<f64>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::Str(text.to_string())),
    }
}

/* ===================== Console collaborators ===================== */

/// Network with one echo component that answers every method with its arguments
struct LoopbackNetwork;

impl Network for LoopbackNetwork {
    fn send_to_address(
        &self,
        _sender: &str,
        target: &str,
        method: &str,
        args: &[Value],
    ) -> Option<Vec<Value>> {
        if target != LOOPBACK_ADDRESS {
            return None;
        }
        tracing::debug!(method, "Loopback call");
        Some(args.to_vec())
    }

    fn lookup_node(&self, address: &str) -> Option<String> {
        (address == LOOPBACK_ADDRESS).then(|| "echo".to_string())
    }

    fn connected_peers(&self, _address: &str) -> Vec<String> {
        vec![LOOPBACK_ADDRESS.to_string()]
    }

    fn connect(&self, _address: &str) {}

    fn remove(&self, _address: &str) {}

    fn send_to_visible(&self, sender: &str, event: &str, _args: &[Value]) {
        tracing::debug!(sender, event, "Broadcast");
    }

    fn send_to_neighbors(&self, sender: &str, event: &str, _args: &[Value]) {
        tracing::info!(sender, event, "Event");
    }
}

#[derive(Default)]
struct ConsoleOwner {
    ticks: AtomicI64,
}

impl ConsoleOwner {
    fn advance(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }
}

impl Owner for ConsoleOwner {
    fn world_time(&self) -> i64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {}

    fn displays(&self) -> Vec<Arc<dyn Display>> {
        vec![Arc::new(ConsoleDisplay)]
    }
}

/// Writes display lines to stderr
struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn width(&self) -> usize {
        50
    }

    fn clear(&self) {}

    fn set_line(&self, row: usize, text: &str) {
        eprintln!("[screen {:>2}] {}", row, text);
    }
}
