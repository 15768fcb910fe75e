//! events.rs — Typed event bus
//!
//! Everything observable about a run (live samples, record/packet progress,
//! log lines, errors, task state) goes out on one broadcast channel. Control
//! panel clients and tests subscribe; nobody is required to listen.

use serde::Serialize;
use telemetry_types::Sample;
use tokio::sync::broadcast;

/// Default capacity; slow subscribers see `Lagged` rather than stalling a run.
pub const EVENT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Seeder,
    Sender,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    /// 1 or 5 samples for one parameter in one record
    SampleGenerated { parameter: String, samples: Vec<Sample> },
    RecordReady {
        record_index: u64,
        record_time: f64,
        packet_count: usize,
    },
    PacketSent {
        record_index: u64,
        packet_index: usize,
        bytes: usize,
    },
    RecordSent {
        record_index: u64,
        bytes: usize,
        total_bytes: u64,
    },
    Log { level: LogLevel, message: String },
    Error { source: String, message: String },
    StateChanged { task: TaskKind, state: String },
}

/// Cheap to clone; every clone publishes onto the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SimEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.tx.subscribe()
    }

    /// Never blocks; an event with no subscribers is simply dropped.
    pub fn publish(&self, event: SimEvent) {
        let _ = self.tx.send(event);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.publish(SimEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn error(&self, source: impl Into<String>, message: impl Into<String>) {
        self.publish(SimEvent::Error {
            source: source.into(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.log(LogLevel::Info, "nobody listening");
        bus.error("sender", "still fine");
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(SimEvent::RecordReady {
            record_index: 0,
            record_time: 0.0,
            packet_count: 10,
        });
        bus.log(LogLevel::Warn, "second");

        assert!(matches!(rx.recv().await.unwrap(), SimEvent::RecordReady { record_index: 0, .. }));
        assert!(matches!(rx.recv().await.unwrap(), SimEvent::Log { level: LogLevel::Warn, .. }));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(SimEvent::StateChanged {
            task: TaskKind::Seeder,
            state: "running".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["task"], "seeder");

        let json = serde_json::to_value(SimEvent::SampleGenerated {
            parameter: "temp".into(),
            samples: vec![Sample { time: 1.0, value: 2.0 }],
        })
        .unwrap();
        assert_eq!(json["samples"][0]["value"], 2.0);
    }
}
