//! # telemetry-types
//!
//! Shared record layout for the telemetry simulator.
//!
//! These types are used by:
//! - `telemetry-simulator`: seeding records and streaming their packets over multicast
//! - `telemetry-listener`: reassembling received packets and decoding named values
//!
//! ## Wire layout
//!
//! - A record is `packets_per_record` packets of exactly `packet_length` bytes
//! - All multi-byte fields are little-endian
//! - Every packet carries the record timestamp (f32) at `timestamp_byte_offset`
//! - Float parameters: 4 bytes per sample; minor cycles lay 5 floats back to back
//! - Digital parameters: `bit_width / 8` bytes (major) or 8-byte slots with the
//!   level in the low byte (minor)

pub mod container;
pub mod decode;
pub mod error;
pub mod parameter;
pub mod record;

pub use container::{ContainerFile, PARAMS_SEPARATOR};
pub use decode::{DecodedRecord, DecodedValue, Decoder, Sample};
pub use error::{BufferError, ContainerError, DecodeError, EncodeError, SpecError};
pub use parameter::{
    BitWidth, DataType, LayoutIssue, Parameter, ParameterSet, SamplingCycle, WaveformKind,
    DIGITAL_MINOR_SLOT, MINOR_SAMPLES,
};
pub use record::{RecordBuffer, RecordSpec};
