//! Embedding-facing configuration surface (spec §10.3).
//!
//! A host doesn't configure codecs or media modules through this crate
//! — it configures the runtime's own ambient knobs: queue depths, pool
//! capacities, a couple of probes' parameters. `RuntimeConfig` collects
//! those under one aggregate, the same shape as the teacher's top-level
//! `Config` in `config/mod.rs`.

pub mod types;

use crate::uprobe::LogLevel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use types::{DejitterConfig, LoggingConfig, PoolConfig, QueueConfig, SelflowConfig};

/// Top-level runtime configuration. Hosts either build one with
/// `RuntimeConfig::default()` and override the fields they care about,
/// or load one from a TOML file via [`RuntimeConfig::load`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub dejitter: DejitterConfig,
    #[serde(default)]
    pub selflow: SelflowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Load and validate a `RuntimeConfig` from a TOML file. Mirrors the
    /// teacher's `Config::load(path) -> anyhow::Result<Self>` shape —
    /// the only place in this crate `anyhow` is used outside `demos/`,
    /// since this is the host-facing startup path (spec §10.2).
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(format!("failed to read config file: {path}"))?;
        let config: RuntimeConfig = toml::from_str(&content).context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would immediately misbehave: zero-sized
    /// queues/pools deadlock rather than fail loudly, and an empty
    /// selector string is valid syntax (spec §4.3's "reject everything")
    /// but worth distinguishing from a typo via a non-empty logging level.
    pub fn validate(&self) -> Result<()> {
        if self.queue.command_queue_len == 0 {
            anyhow::bail!("queue.command_queue_len must be > 0");
        }
        if self.dejitter.divider == 0 {
            anyhow::bail!("dejitter.divider must be > 0");
        }
        self.log_level().context("invalid logging.level")?;
        Ok(())
    }

    /// Parse `logging.level` into the threshold [`crate::uprobe::stdio::StdioProbe`] expects.
    pub fn log_level(&self) -> Result<LogLevel> {
        match self.logging.level.as_str() {
            "verbose" => Ok(LogLevel::Verbose),
            "debug" => Ok(LogLevel::Debug),
            "notice" => Ok(LogLevel::Notice),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => anyhow::bail!("unknown logging level: {other}"),
        }
    }
}
