//! Configuration loading
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. TOML file (`machine.toml`, or `MACHINE_CONFIG_PATH`, or an explicit path)
//! 3. Environment variables prefixed with `MACHINE_` (`__` separates sections)
//! 4. Programmatic overrides from [`ConfigBuilder`]

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "machine.toml";
const ENV_PREFIX: &str = "MACHINE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub machine: MachineConfig,
}

/// Shared worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub worker_threads: usize,
    pub thread_name: String,
    /// Scheduling niceness applied to worker threads on unix
    pub niceness: i32,
}

/// Per-instance resource limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Bytes available to user programs on top of the kernel's own footprint
    pub memory_budget: usize,
    /// Fixed overhead added to the measured kernel footprint
    pub kernel_overhead: usize,
    pub signal_queue_capacity: usize,
    /// Timeout budget exposed to the guest so it can yield cooperatively
    pub timeout_secs: f64,
    /// Wall time without an `update()` after which the host counts as paused
    pub pause_threshold_ms: i64,
    pub ticks_per_second: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            thread_name: "machine-worker".to_string(),
            niceness: 5,
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_budget: 192 * 1024,
            kernel_overhead: 16 * 1024,
            signal_queue_capacity: 256,
            timeout_secs: 5.0,
            pause_threshold_ms: 100,
            ticks_per_second: 20,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            machine: MachineConfig::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from the default sources
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.worker_threads == 0 {
            bail!("pool.worker_threads must be at least 1");
        }
        if self.machine.signal_queue_capacity == 0 {
            bail!("machine.signal_queue_capacity must be at least 1");
        }
        if self.machine.memory_budget == 0 {
            bail!("machine.memory_budget must be at least 1 byte");
        }
        if !(self.machine.timeout_secs >= 0.0) {
            bail!(
                "machine.timeout_secs must be non-negative, got {}",
                self.machine.timeout_secs
            );
        }
        if self.machine.pause_threshold_ms <= 0 {
            bail!("machine.pause_threshold_ms must be positive");
        }
        if self.machine.ticks_per_second == 0 {
            bail!("machine.ticks_per_second must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    worker_threads: Option<usize>,
    memory_budget: Option<usize>,
    pause_threshold_ms: Option<i64>,
    skip_environment: bool,
}

impl ConfigBuilder {
    /// Set the config file path (overrides default search)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    pub fn pause_threshold_ms(mut self, ms: i64) -> Self {
        self.pause_threshold_ms = Some(ms);
        self
    }

    /// Ignore `.env` and `MACHINE_*` variables (used by tests)
    pub fn skip_environment(mut self) -> Self {
        self.skip_environment = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_environment {
            // A missing .env file is not an error
            let _ = dotenvy::dotenv();
        }

        let explicit_path = self.config_path.clone().or_else(|| {
            if self.skip_environment {
                None
            } else {
                std::env::var("MACHINE_CONFIG_PATH").ok().map(PathBuf::from)
            }
        });

        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to build default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        builder = match &explicit_path {
            Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        if !self.skip_environment {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Some(threads) = self.worker_threads {
            config.pool.worker_threads = threads;
        }
        if let Some(bytes) = self.memory_budget {
            config.machine.memory_budget = bytes;
        }
        if let Some(ms) = self.pause_threshold_ms {
            config.machine.pause_threshold_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }
}
