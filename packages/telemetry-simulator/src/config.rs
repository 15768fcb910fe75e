//! config.rs — Run configuration
//!
//! Sources, lowest precedence first:
//!   1. `config.toml` embedded at build time
//!   2. the config file on disk (`--config`)
//!   3. environment (`TELEMETRY_GROUP`, `TELEMETRY_PORT`)
//!   4. CLI flags, applied by `main`

use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use telemetry_types::{ContainerError, ParameterSet, RecordSpec, SpecError};
use thiserror::Error;
use tracing::warn;

use crate::pipeline::PipelineConfig;
use crate::seeder::SeederConfig;
use crate::sender::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rate must be finite and greater than zero (got {0})")]
    InvalidRate(f64),
    #[error("start time {start} must not be after end time {end}")]
    InvalidWindow { start: f64, end: f64 },
    #[error("queue capacity must be at least 1")]
    QueueCapacity,
    #[error(transparent)]
    Record(#[from] SpecError),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub start_time: f64,
    pub end_time: f64,
    pub hz: f64,
    pub queue_capacity: usize,
    /// Log a progress line every N records (0 = never)
    pub progress_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 10.0,
            hz: 2.0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_every: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    pub ttl: u32,
    /// Local interface to send from; any when unset
    pub interface: Option<Ipv4Addr>,
    pub loopback: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 0, 0, 1),
            port: 12345,
            ttl: 1,
            interface: None,
            loopback: true,
        }
    }
}

impl NetworkConfig {
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TELEMETRY_GROUP") {
            match v.parse() {
                Ok(group) => self.group = group,
                Err(_) => warn!("Config: ignoring TELEMETRY_GROUP={v}"),
            }
        }
        if let Some(v) = lookup("TELEMETRY_PORT") {
            match v.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Config: ignoring TELEMETRY_PORT={v}"),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

// ── Full config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FullConfig {
    pub record: RecordSpec,
    pub simulation: SimulationConfig,
    pub network: NetworkConfig,
    pub control: ControlConfig,
    pub parameters: ParameterSet,
}

impl FullConfig {
    /// Parse and normalize (packet length rounded up to a multiple of 4).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut cfg: FullConfig = toml::from_str(s)?;
        cfg.record = cfg.record.normalized();
        Ok(cfg)
    }

    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Read `path`, falling back to the embedded config when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(s) => Self::from_toml_str(&s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Config: {} not found, using built-in defaults", path.display());
                Self::embedded()
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn seeder_config(&self) -> SeederConfig {
        SeederConfig {
            start_time: self.simulation.start_time,
            end_time: self.simulation.end_time,
            hz: self.simulation.hz,
            progress_every: self.simulation.progress_every,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            seeder: self.seeder_config(),
            queue_capacity: self.simulation.queue_capacity,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.record.validate()?;
        self.pipeline_config().validate()
    }
}
