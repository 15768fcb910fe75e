//! Telemetry simulator library.
//!
//! Synthesizes waveform-driven telemetry records and streams them as fixed
//! size UDP packets. The binary in `main.rs` wires these pieces to a config
//! file, the CLI and a WebSocket control panel; tests drive them directly.
//!
//! Data flow:
//!
//! ```text
//! ParameterSet + RecordSpec → SeedingEngine → Seeder ─(bounded queue)→ PacketSender → PacketSink
//!                                               └──────── EventBus ────────┘
//! ```

pub mod config;
pub mod control;
pub mod events;
pub mod pipeline;
pub mod seeder;
pub mod seeding;
pub mod sender;
pub mod udp_tx;
pub mod waveform;

pub use config::{ConfigError, ControlConfig, FullConfig, NetworkConfig, SimulationConfig};
pub use events::{EventBus, LogLevel, SimEvent, TaskKind};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, RunSummary};
pub use seeder::{Seeder, SeederConfig, SeederHandle, SeederState, StopReason};
pub use seeding::{ParameterFault, ParameterSamples, SeededRecord, SeedingEngine};
pub use sender::{record_queue, OutboundRecord, PacketSender, SenderHandle, StatsSnapshot};
pub use udp_tx::{MemorySink, MulticastSender, PacketSink};
