//! # config
//!
//! Where the listener gets its record geometry and parameter definitions:
//! a `.dat` container, the simulator's TOML config, or neither (defaults plus
//! a single float minor-cycle parameter at packet 0, offset 100).

use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use telemetry_types::{ContainerError, Parameter, ParameterSet, RecordSpec, SamplingCycle, SpecError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("rate must be finite and greater than zero (got {0})")]
    InvalidRate(f64),
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("idle timeout must be a finite number of seconds, 0 to disable (got {0})")]
    InvalidIdleTimeout(f64),
}

/// The subset of the simulator's `config.toml` the listener cares about.
/// Other sections are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SimulatorToml {
    pub record: RecordSpec,
    pub simulation: SimulationSection,
    pub network: NetworkSection,
    pub parameters: ParameterSet,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub hz: f64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self { hz: 2.0 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub group: Ipv4Addr,
    pub port: u16,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 0, 0, 1),
            port: 12345,
        }
    }
}

impl SimulatorToml {
    pub fn from_toml_str(s: &str) -> Result<Self, ListenerError> {
        let mut cfg: SimulatorToml = toml::from_str(s)?;
        cfg.record = cfg.record.normalized();
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ListenerError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ListenerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }
}

/// Fallback when no parameter definitions are given.
pub fn default_parameter() -> Parameter {
    Parameter::float("param_0_100", 0, 100, 0.0, 1.0).with_cycle(SamplingCycle::Minor)
}

/// Seconds from the command line; `0` waits forever.
pub fn idle_timeout_from_secs(secs: f64) -> Result<Option<Duration>, ListenerError> {
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| ListenerError::InvalidIdleTimeout(secs))
}

/// Everything the receive loop needs.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    pub interface: Option<Ipv4Addr>,
    pub spec: RecordSpec,
    pub params: ParameterSet,
    /// Sender rate, used to rebuild minor-cycle sample times
    pub hz: f64,
    /// Parameter written to the table; first enabled parameter when unset
    pub log_param: Option<String>,
    /// Stop after this long without a packet; never when unset
    pub idle_timeout: Option<Duration>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        let net = NetworkSection::default();
        Self {
            group: net.group,
            port: net.port,
            interface: None,
            spec: RecordSpec::default(),
            params: [default_parameter()].into_iter().collect(),
            hz: SimulationSection::default().hz,
            log_param: None,
            idle_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<(), ListenerError> {
        self.spec.validate()?;
        if !(self.hz.is_finite() && self.hz > 0.0) {
            return Err(ListenerError::InvalidRate(self.hz));
        }
        self.logged_parameter()?;
        Ok(())
    }

    /// Name of the parameter the table follows.
    pub fn logged_parameter(&self) -> Result<String, ListenerError> {
        match &self.log_param {
            Some(name) => match self.params.get(name) {
                Some(p) if p.enabled => Ok(name.clone()),
                _ => Err(ListenerError::UnknownParameter(name.clone())),
            },
            None => self
                .params
                .enabled()
                .next()
                .map(|p| p.name.clone())
                .ok_or_else(|| ListenerError::UnknownParameter("<none enabled>".into())),
        }
    }
}
