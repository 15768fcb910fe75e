//! Decoder: reads named parameter values back out of a record, the inverse of
//! the simulator's seeding engine.

use serde::Serialize;

use crate::error::DecodeError;
use crate::parameter::{DataType, Parameter, ParameterSet, SamplingCycle, BitWidth, MINOR_SAMPLES};
use crate::record::RecordSpec;

/// One value at one point in simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

/// A decoded parameter, shaped the way the seeding engine produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Major(Sample),
    Minor([Sample; MINOR_SAMPLES]),
    /// Field could not be read; other parameters are unaffected
    Missing(DecodeError),
}

impl DecodedValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }

    pub fn samples(&self) -> &[Sample] {
        match self {
            Self::Major(s) => std::slice::from_ref(s),
            Self::Minor(s) => s,
            Self::Missing(_) => &[],
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples().iter().map(|s| s.value).collect()
    }
}

/// Everything decoded from one record.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Timestamp from the timestamp packet, `None` if that packet was short
    pub record_time: Option<f64>,
    /// Enabled parameters in set order
    pub values: Vec<(String, DecodedValue)>,
}

impl DecodedRecord {
    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|(_, v)| v.is_missing()).count()
    }
}

/// Decodes records for a fixed parameter set and geometry.
///
/// `record_interval` (seconds between records, `1/hz`) is only used to
/// reconstruct minor-cycle sample times; it is not carried on the wire.
#[derive(Debug, Clone)]
pub struct Decoder {
    params: ParameterSet,
    spec: RecordSpec,
    record_interval: f64,
}

impl Decoder {
    pub fn new(params: ParameterSet, spec: RecordSpec, record_interval: f64) -> Self {
        Self {
            params,
            spec,
            record_interval,
        }
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn spec(&self) -> &RecordSpec {
        &self.spec
    }

    /// Decode a record given as concatenated packet bytes.
    pub fn decode_bytes(&self, record: &[u8]) -> DecodedRecord {
        let packets: Vec<&[u8]> = record.chunks(self.spec.packet_length.max(1)).collect();
        self.decode_slices(&packets)
    }

    /// Decode a record given as its packets, in packet-index order.
    pub fn decode_packets<P: AsRef<[u8]>>(&self, packets: &[P]) -> DecodedRecord {
        let packets: Vec<&[u8]> = packets.iter().map(AsRef::as_ref).collect();
        self.decode_slices(&packets)
    }

    /// Read the record timestamp only.
    pub fn record_time<P: AsRef<[u8]>>(&self, packets: &[P]) -> Option<f64> {
        let packet = packets.get(self.spec.timestamp_packet_index)?.as_ref();
        read_f32(packet, self.spec.timestamp_byte_offset).ok()
    }

    fn decode_slices(&self, packets: &[&[u8]]) -> DecodedRecord {
        let record_time = self.record_time(packets);
        // Sample times are meaningless without a timestamp; keep the values.
        let base = record_time.unwrap_or(f64::NAN);

        let values = self
            .params
            .enabled()
            .map(|p| (p.name.clone(), self.decode_parameter(p, packets, base)))
            .collect();

        DecodedRecord { record_time, values }
    }

    fn decode_parameter(&self, p: &Parameter, packets: &[&[u8]], base: f64) -> DecodedValue {
        let packet = match packets.get(p.packet_index) {
            Some(packet) => *packet,
            None => {
                return DecodedValue::Missing(DecodeError::MissingPacket {
                    packet_index: p.packet_index,
                    available: packets.len(),
                })
            }
        };

        match p.cycle {
            SamplingCycle::Major => match read_major(p, packet) {
                Ok(value) => DecodedValue::Major(Sample { time: base, value }),
                Err(e) => DecodedValue::Missing(e),
            },
            SamplingCycle::Minor => {
                let step = self.record_interval / MINOR_SAMPLES as f64;
                let stride = p.sample_stride();
                let mut samples = [Sample { time: base, value: 0.0 }; MINOR_SAMPLES];
                for (i, sample) in samples.iter_mut().enumerate() {
                    let offset = p.byte_offset + i * stride;
                    let value = match p.dtype {
                        DataType::Float32 => read_f32(packet, offset),
                        DataType::Digital => read_u64(packet, offset).map(|raw| (raw & 0xFF) as f64),
                    };
                    match value {
                        Ok(value) => {
                            *sample = Sample {
                                time: base + i as f64 * step,
                                value,
                            }
                        }
                        Err(e) => return DecodedValue::Missing(e),
                    }
                }
                DecodedValue::Minor(samples)
            }
        }
    }
}

fn field(packet: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    offset
        .checked_add(len)
        .and_then(|end| packet.get(offset..end))
        .ok_or(DecodeError::Truncated {
            offset,
            needed: len,
            available: packet.len(),
        })
}

fn read_f32(packet: &[u8], offset: usize) -> Result<f64, DecodeError> {
    let b = field(packet, offset, 4)?;
    Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
}

fn read_u64(packet: &[u8], offset: usize) -> Result<u64, DecodeError> {
    let b = field(packet, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_le_bytes(raw))
}

fn read_major(p: &Parameter, packet: &[u8]) -> Result<f64, DecodeError> {
    match p.dtype {
        DataType::Float32 => read_f32(packet, p.byte_offset),
        DataType::Digital => {
            let b = field(packet, p.byte_offset, p.bit_width.bytes())?;
            Ok(match p.bit_width {
                BitWidth::W8 => b[0] as f64,
                BitWidth::W16 => u16::from_le_bytes([b[0], b[1]]) as f64,
                BitWidth::W32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            })
        }
    }
}
