//! Error types for the record layout.
//!
//! None of these are fatal to a run: buffer and encode errors are reported per
//! parameter by the seeding engine, decode errors become a missing value for a
//! single parameter, and container errors are surfaced to whoever loads a file.

use thiserror::Error;

/// Out-of-range access on a [`crate::RecordBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("packet index {packet_index} out of range (record has {packets_per_record} packets)")]
    PacketOutOfRange {
        packet_index: usize,
        packets_per_record: usize,
    },
    #[error("field at offset {offset} with length {len} exceeds packet length {packet_length}")]
    OffsetOutOfRange {
        offset: usize,
        len: usize,
        packet_length: usize,
    },
}

/// A parameter could not be written into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field {start}..{end} overflows packet length {packet_length}")]
    FieldOverflow {
        start: usize,
        end: usize,
        packet_length: usize,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// A parameter could not be read back out of a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet {packet_index} missing from record ({available} packets present)")]
    MissingPacket {
        packet_index: usize,
        available: usize,
    },
    #[error("truncated field: need {needed} bytes at offset {offset}, packet has {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Invalid record geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("packet length must be non-zero")]
    ZeroPacketLength,
    #[error("packets per record must be non-zero")]
    ZeroPackets,
    #[error("timestamp packet {packet_index} out of range (record has {packets_per_record} packets)")]
    TimestampPacket {
        packet_index: usize,
        packets_per_record: usize,
    },
    #[error("timestamp field at offset {offset} does not fit in a {packet_length}-byte packet")]
    TimestampOffset { offset: usize, packet_length: usize },
}

/// Malformed `.dat` parameter container.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container truncated while reading {field}")]
    Truncated { field: &'static str },
    #[error("parameter name is not valid UTF-8")]
    InvalidName(#[from] std::string::FromUtf8Error),
    #[error("parameter `{name}`: unknown type flag {flag}")]
    UnknownType { name: String, flag: u32 },
    #[error("parameter `{name}`: unsupported bit width {bits}")]
    UnknownBitWidth { name: String, bits: u32 },
    #[error("parameter `{name}`: unsupported samples per half second {samples}")]
    UnknownCycle { name: String, samples: u32 },
    #[error("duplicate parameter name `{0}`")]
    DuplicateName(String),
    #[error("missing END_PARAMS separator after parameter section")]
    MissingSeparator,
    #[error("container I/O: {0}")]
    Io(#[from] std::io::Error),
}
