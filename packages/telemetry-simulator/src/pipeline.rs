//! pipeline.rs — One simulation run
//!
//! Owns a fresh queue, sender and seeder. Start order is sender then seeder;
//! stop order is seeder then sender, both joined. A new run allocates all of
//! it again, so stop/start cycles never share state.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{ConfigError, NetworkConfig};
use crate::events::{EventBus, SimEvent};
use crate::seeder::{Seeder, SeederConfig, SeederHandle, SeederState};
use crate::seeding::SeedingEngine;
use crate::sender::{record_queue, PacketSender, SenderHandle, StatsSnapshot, DEFAULT_QUEUE_CAPACITY};
use crate::udp_tx::{MulticastSender, PacketSink};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("transport: {0}")]
    Transport(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub seeder: SeederConfig,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seeder: SeederConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        self.seeder.validate()
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub state: SeederState,
    pub stats: StatsSnapshot,
}

pub struct Pipeline {
    seeder: SeederHandle,
    sender: SenderHandle,
    events: EventBus,
}

impl Pipeline {
    /// Validate everything, then spawn. On error nothing has been spawned.
    pub fn start<S: PacketSink>(
        config: PipelineConfig,
        engine: SeedingEngine,
        sink: S,
        events: EventBus,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        engine.spec().validate()?;

        let (queue_tx, queue_rx) = record_queue(config.queue_capacity);
        let sender = PacketSender::new(sink, events.clone()).spawn(queue_rx);
        let seeder = Seeder::new(config.seeder, Arc::new(engine), events.clone()).spawn(queue_tx)?;

        info!("▶ Pipeline started (queue capacity {})", config.queue_capacity);
        Ok(Self { seeder, sender, events })
    }

    /// Bind a multicast sender for this run, then [`Self::start`].
    pub async fn start_multicast(
        config: PipelineConfig,
        engine: SeedingEngine,
        network: &NetworkConfig,
        events: EventBus,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        engine.spec().validate().map_err(ConfigError::from)?;
        let sink = MulticastSender::bind(network).await?;
        Ok(Self::start(config, engine, sink, events)?)
    }

    pub fn pause(&self) {
        self.seeder.pause();
        self.sender.pause();
        info!("⏸ Pipeline paused");
    }

    pub fn resume(&self) {
        self.seeder.resume();
        self.sender.resume();
        info!("▶ Pipeline resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.seeder.is_paused()
    }

    pub fn set_hz(&self, hz: f64) -> Result<(), ConfigError> {
        self.seeder.set_hz(hz)
    }

    pub fn hz(&self) -> f64 {
        self.seeder.hz()
    }

    pub fn state(&self) -> SeederState {
        self.seeder.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.sender.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Resolves once the seeder has stopped; the sender may still be draining.
    pub async fn finished(&self) -> SeederState {
        self.seeder.finished().await
    }

    /// Let the run complete: seeder reaches its end, sender drains the queue.
    /// Does not return while the sender is paused with records queued.
    pub async fn wait(self) -> RunSummary {
        let state = self.seeder.join().await;
        let stats = self.sender.join().await;
        RunSummary { state, stats }
    }

    /// Stop now. Seeder first so nothing new is queued, then the sender.
    pub async fn stop(self) -> RunSummary {
        let state = self.seeder.stop().await;
        let stats = self.sender.stop().await;
        info!("⏹ Pipeline stopped ({})", state.label());
        RunSummary { state, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udp_tx::MemorySink;
    use telemetry_types::{ParameterSet, RecordSpec};

    #[tokio::test]
    async fn invalid_config_spawns_nothing() {
        let (sink, _rx) = MemorySink::new();
        let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::default());
        let config = PipelineConfig {
            queue_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::start(config, engine, sink, EventBus::default()),
            Err(ConfigError::QueueCapacity)
        ));

        let (sink, _rx) = MemorySink::new();
        let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::new(64, 0));
        assert!(matches!(
            Pipeline::start(PipelineConfig::default(), engine, sink, EventBus::default()),
            Err(ConfigError::Record(_))
        ));
    }
}
