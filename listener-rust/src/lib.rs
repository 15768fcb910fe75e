//! Telemetry listener: joins the simulator's multicast group, reassembles
//! packets into records, decodes them with the shared parameter layout and
//! writes a `.dat` capture plus a parameter table.

pub mod assembler;
pub mod capture;
pub mod config;
pub mod listener;
pub mod multicast_rx;

pub use assembler::{AssembledRecord, AssemblerStats, RecordAssembler};
pub use capture::{format_row, DatCapture, ParameterTable};
pub use config::{default_parameter, idle_timeout_from_secs, ListenerConfig, ListenerError, SimulatorToml};
pub use listener::{run, Listener, ListenerSummary, StopCause};
pub use multicast_rx::MulticastReceiver;
