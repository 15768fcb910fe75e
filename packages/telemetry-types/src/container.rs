//! `.dat` container: an embedded parameter section followed by raw records.
//!
//! Layout (all little-endian):
//!
//! ```text
//! u32 parameter count
//! per parameter:
//!   u32 name length, name bytes (UTF-8)
//!   u32 packet_index, u32 byte_offset, u32 type flag (1 = float, 0 = digital)
//!   f32 min, f32 max, f32 frequency, f32 phase
//!   u32 samples per half second, u32 enabled flag, u32 bit width
//! "END_PARAMS"
//! raw record bytes (packets_per_record × packet_length each)
//! ```
//!
//! Fields the container does not carry (waveform shape, sweep mode, enable
//! window) come back as [`Parameter`] defaults.

use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ContainerError;
use crate::parameter::{BitWidth, DataType, Parameter, ParameterSet, SamplingCycle};
use crate::record::RecordSpec;

/// Marks the end of the parameter section.
pub const PARAMS_SEPARATOR: &[u8; 10] = b"END_PARAMS";

const TYPE_FLOAT: u32 = 1;
const TYPE_DIGITAL: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerFile {
    pub parameters: ParameterSet,
    /// Raw record bytes following the separator
    pub records: Vec<u8>,
}

fn need(buf: &[u8], len: usize, field: &'static str) -> Result<(), ContainerError> {
    if buf.remaining() < len {
        return Err(ContainerError::Truncated { field });
    }
    Ok(())
}

fn take_u32(buf: &mut &[u8], field: &'static str) -> Result<u32, ContainerError> {
    need(*buf, 4, field)?;
    Ok(buf.get_u32_le())
}

fn take_f32(buf: &mut &[u8], field: &'static str) -> Result<f32, ContainerError> {
    need(*buf, 4, field)?;
    Ok(buf.get_f32_le())
}

impl ContainerFile {
    pub fn new(parameters: ParameterSet, records: Vec<u8>) -> Self {
        Self { parameters, records }
    }

    pub fn parse(data: &[u8]) -> Result<Self, ContainerError> {
        let mut buf = data;
        let count = take_u32(&mut buf, "parameter count")?;
        let mut parameters = ParameterSet::new();

        for serial in 1..=count {
            let name_len = take_u32(&mut buf, "name length")? as usize;
            need(buf, name_len, "name")?;
            let name = String::from_utf8(buf[..name_len].to_vec())?;
            buf.advance(name_len);

            let packet_index = take_u32(&mut buf, "packet index")? as usize;
            let byte_offset = take_u32(&mut buf, "byte offset")? as usize;
            let type_flag = take_u32(&mut buf, "type flag")?;
            let min = take_f32(&mut buf, "min")?;
            let max = take_f32(&mut buf, "max")?;
            let frequency = take_f32(&mut buf, "frequency")?;
            let phase = take_f32(&mut buf, "phase")?;
            let samples = take_u32(&mut buf, "samples per half second")?;
            let enabled = take_u32(&mut buf, "enabled flag")? != 0;
            let bits = take_u32(&mut buf, "bit width")?;

            let dtype = match type_flag {
                TYPE_FLOAT => DataType::Float32,
                TYPE_DIGITAL => DataType::Digital,
                flag => return Err(ContainerError::UnknownType { name, flag }),
            };
            let Some(cycle) = SamplingCycle::from_samples(samples) else {
                return Err(ContainerError::UnknownCycle { name, samples });
            };
            // Float entries still carry a width field; only digital ones must be valid.
            let bit_width = match (dtype, BitWidth::from_bits(bits)) {
                (_, Some(w)) => w,
                (DataType::Float32, None) => BitWidth::default(),
                (DataType::Digital, None) => return Err(ContainerError::UnknownBitWidth { name, bits }),
            };

            if parameters.contains(&name) {
                return Err(ContainerError::DuplicateName(name));
            }

            let mut p = Parameter::float(name, packet_index, byte_offset, min as f64, max as f64)
                .with_waveform(Default::default(), frequency as f64, phase as f64)
                .with_cycle(cycle);
            p.serial = serial;
            p.dtype = dtype;
            p.bit_width = bit_width;
            p.enabled = enabled;
            parameters.insert(p);
        }

        if !buf.starts_with(PARAMS_SEPARATOR) {
            return Err(ContainerError::MissingSeparator);
        }
        buf.advance(PARAMS_SEPARATOR.len());

        Ok(Self {
            parameters,
            records: buf.to_vec(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(64 + self.parameters.len() * 64 + self.records.len());
        out.put_u32_le(self.parameters.len() as u32);
        for p in &self.parameters {
            out.put_u32_le(p.name.len() as u32);
            out.put_slice(p.name.as_bytes());
            out.put_u32_le(p.packet_index as u32);
            out.put_u32_le(p.byte_offset as u32);
            out.put_u32_le(match p.dtype {
                DataType::Float32 => TYPE_FLOAT,
                DataType::Digital => TYPE_DIGITAL,
            });
            out.put_f32_le(p.min_value as f32);
            out.put_f32_le(p.max_value as f32);
            out.put_f32_le(p.frequency_hz as f32);
            out.put_f32_le(p.phase_radians as f32);
            out.put_u32_le(p.cycle.into());
            out.put_u32_le(p.enabled as u32);
            out.put_u32_le(p.bit_width.into());
        }
        out.put_slice(PARAMS_SEPARATOR);
        out.put_slice(&self.records);
        out.to_vec()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Complete and partial records in the trailing data. A short final record
    /// is kept; it is zero-padded when used as a template.
    pub fn record_chunks(&self, spec: &RecordSpec) -> impl Iterator<Item = &[u8]> {
        self.records.chunks(spec.record_len().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> ParameterSet {
        [
            Parameter::float("temperature", 0, 4, 20.0, 100.0).with_waveform(Default::default(), 0.1, 0.0),
            Parameter::float("pressure", 0, 8, 0.0, 50.0).with_cycle(SamplingCycle::Minor),
            Parameter::digital("valve", 1, 0, BitWidth::W16, 0.0, 65535.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn write_then_parse_keeps_layout_and_records() {
        let records: Vec<u8> = (0..=255).collect();
        let file = ContainerFile::new(sample_params(), records.clone());
        let parsed = ContainerFile::parse(&file.to_bytes()).unwrap();

        assert_eq!(parsed.records, records);
        assert_eq!(parsed.parameters.len(), 3);
        let valve = parsed.parameters.get("valve").unwrap();
        assert_eq!(valve.dtype, DataType::Digital);
        assert_eq!(valve.bit_width, BitWidth::W16);
        assert_eq!((valve.packet_index, valve.byte_offset), (1, 0));
        assert_eq!(valve.serial, 3);

        let temp = parsed.parameters.get("temperature").unwrap();
        assert!((temp.frequency_hz - 0.1).abs() < 1e-6);
        assert_eq!(parsed.parameters.get("pressure").unwrap().cycle, SamplingCycle::Minor);
    }

    #[test]
    fn parses_hand_written_entry() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"volt");
        for v in [1u32, 0, 1] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        for v in [-10.0f32, 10.0, 1.0, 0.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        for v in [1u32, 1, 8] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(PARAMS_SEPARATOR);
        data.extend_from_slice(&[7, 7]);

        let file = ContainerFile::parse(&data).unwrap();
        let volt = file.parameters.get("volt").unwrap();
        assert_eq!(volt.packet_index, 1);
        assert_eq!(volt.min_value, -10.0);
        assert!(volt.enabled);
        assert_eq!(file.records, vec![7, 7]);
    }

    #[test]
    fn malformed_containers_are_rejected() {
        let good = ContainerFile::new(sample_params(), vec![]).to_bytes();

        assert!(matches!(
            ContainerFile::parse(&good[..good.len() - 3]),
            Err(ContainerError::MissingSeparator)
        ));
        assert!(matches!(
            ContainerFile::parse(&good[..20]),
            Err(ContainerError::Truncated { .. })
        ));

        let mut bytes = good.clone();
        // Patch the valve's bit width (last field before the separator) to 12.
        let at = bytes.len() - PARAMS_SEPARATOR.len() - 4;
        bytes[at..at + 4].copy_from_slice(&12u32.to_le_bytes());
        assert!(matches!(
            ContainerFile::parse(&bytes),
            Err(ContainerError::UnknownBitWidth { bits: 12, .. })
        ));
    }

    #[test]
    fn record_chunks_split_on_record_length() {
        let spec = RecordSpec::new(8, 2);
        let file = ContainerFile::new(ParameterSet::new(), vec![0u8; 40]);
        let sizes: Vec<usize> = file.record_chunks(&spec).map(<[u8]>::len).collect();
        assert_eq!(sizes, vec![16, 16, 8]);
    }
}
