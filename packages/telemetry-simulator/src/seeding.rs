//! seeding.rs — Seeding engine: parameter set + record time → populated record
//!
//! Responsibilities:
//!   - Rehydrate the record from a template (or start zero-filled)
//!   - Stamp the record time into every packet
//!   - Evaluate each active parameter (1 or 5 samples) and encode it in place
//!   - Reject fields that would overflow their packet, per parameter, without
//!     touching neighbouring bytes
//!
//! `seed_record` is pure; `seed` additionally reports to the event bus.

use telemetry_types::{
    BitWidth, BufferError, DataType, EncodeError, Parameter, ParameterSet, RecordBuffer, RecordSpec, Sample, SamplingCycle,
    MINOR_SAMPLES,
};
use tracing::warn;

use crate::events::{EventBus, SimEvent};
use crate::waveform;

/// Values produced for one parameter in one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSamples {
    pub parameter: String,
    pub samples: Vec<Sample>,
    /// Copied from the parameter so `seed` knows whether to publish
    pub graph: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterFault {
    pub parameter: String,
    pub error: EncodeError,
}

/// Output of one seeding pass.
#[derive(Debug, Clone)]
pub struct SeededRecord {
    pub buffer: RecordBuffer,
    /// Successfully written parameters only
    pub samples: Vec<ParameterSamples>,
    pub errors: Vec<ParameterFault>,
}

#[derive(Debug, Clone)]
pub struct SeedingEngine {
    params: ParameterSet,
    spec: RecordSpec,
    templates: Vec<Vec<u8>>,
}

impl SeedingEngine {
    pub fn new(params: ParameterSet, spec: RecordSpec) -> Self {
        Self {
            params,
            spec,
            templates: Vec::new(),
        }
    }

    /// Split captured bytes into per-record templates. Empty input means none.
    pub fn with_template(mut self, records: &[u8]) -> Self {
        self.templates = records
            .chunks(self.spec.record_len().max(1))
            .map(<[u8]>::to_vec)
            .collect();
        self
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn spec(&self) -> &RecordSpec {
        &self.spec
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Template used for record `record_index`, cycling through those loaded.
    pub fn template_for(&self, record_index: u64) -> Option<&[u8]> {
        if self.templates.is_empty() {
            return None;
        }
        let idx = (record_index % self.templates.len() as u64) as usize;
        Some(&self.templates[idx])
    }

    /// Build one record. Never fails as a whole; per-parameter problems land
    /// in [`SeededRecord::errors`].
    pub fn seed_record(&self, record_time: f64, template: Option<&[u8]>, record_interval: f64) -> SeededRecord {
        let mut buffer = match template {
            Some(bytes) => RecordBuffer::from_template(self.spec, bytes),
            None => RecordBuffer::new(self.spec),
        };
        let mut samples = Vec::new();
        let mut errors = Vec::new();

        // Validated geometry always fits its own timestamp.
        if let Err(e) = buffer.set_record_time(record_time) {
            errors.push(ParameterFault {
                parameter: "timestamp".into(),
                error: e.into(),
            });
        }

        for p in self.params.iter().filter(|p| p.is_active_at(record_time)) {
            match encode_parameter(&mut buffer, p, record_time, record_interval) {
                Ok(written) => samples.push(ParameterSamples {
                    parameter: p.name.clone(),
                    samples: written,
                    graph: p.enabled_in_graph,
                }),
                Err(error) => errors.push(ParameterFault {
                    parameter: p.name.clone(),
                    error,
                }),
            }
        }

        SeededRecord { buffer, samples, errors }
    }

    /// [`Self::seed_record`] with the record's template, plus live sample and
    /// error events.
    pub fn seed(&self, record_time: f64, record_index: u64, record_interval: f64, events: &EventBus) -> SeededRecord {
        let seeded = self.seed_record(record_time, self.template_for(record_index), record_interval);

        for s in seeded.samples.iter().filter(|s| s.graph) {
            events.publish(SimEvent::SampleGenerated {
                parameter: s.parameter.clone(),
                samples: s.samples.clone(),
            });
        }
        for fault in &seeded.errors {
            warn!("Seed: record {record_index} parameter '{}' skipped: {}", fault.parameter, fault.error);
            events.error("seeder", format!("{}: {}", fault.parameter, fault.error));
        }
        seeded
    }
}

/// Whole field must fit before anything is written.
fn check_field(buffer: &RecordBuffer, p: &Parameter) -> Result<(), EncodeError> {
    let spec = buffer.spec();
    if p.packet_index >= spec.packets_per_record {
        return Err(BufferError::PacketOutOfRange {
            packet_index: p.packet_index,
            packets_per_record: spec.packets_per_record,
        }
        .into());
    }
    let range = p.field_range();
    if range.end > spec.packet_length || range.end - range.start < p.encoded_len() {
        return Err(EncodeError::FieldOverflow {
            start: range.start,
            end: p.byte_offset.saturating_add(p.encoded_len()),
            packet_length: spec.packet_length,
        });
    }
    Ok(())
}

fn encode_parameter(
    buffer: &mut RecordBuffer,
    p: &Parameter,
    record_time: f64,
    record_interval: f64,
) -> Result<Vec<Sample>, EncodeError> {
    check_field(buffer, p)?;

    match p.cycle {
        SamplingCycle::Major => {
            let value = match (p.dtype, p.fixed_value) {
                (DataType::Float32, Some(fixed)) => fixed,
                _ => waveform::sample(p, record_time),
            };
            write_major(buffer, p, value)?;
            Ok(vec![Sample {
                time: record_time,
                value,
            }])
        }
        SamplingCycle::Minor => {
            let step = record_interval / MINOR_SAMPLES as f64;
            let stride = p.sample_stride();
            let mut written = Vec::with_capacity(MINOR_SAMPLES);
            for i in 0..MINOR_SAMPLES {
                let time = record_time + i as f64 * step;
                let value = waveform::sample(p, time);
                let offset = p.byte_offset + i * stride;
                match p.dtype {
                    DataType::Float32 => buffer.insert_f32(p.packet_index, offset, value as f32)?,
                    DataType::Digital => buffer.insert_u64(p.packet_index, offset, u64::from(value as u8))?,
                }
                written.push(Sample { time, value });
            }
            Ok(written)
        }
    }
}

fn write_major(buffer: &mut RecordBuffer, p: &Parameter, value: f64) -> Result<(), BufferError> {
    let (pkt, off) = (p.packet_index, p.byte_offset);
    match p.dtype {
        DataType::Float32 => buffer.insert_f32(pkt, off, value as f32),
        // `as` saturates float → int.
        DataType::Digital => match p.bit_width {
            BitWidth::W8 => buffer.insert_u8(pkt, off, value as u8),
            BitWidth::W16 => buffer.insert_u16(pkt, off, value as u16),
            BitWidth::W32 => buffer.insert_u32(pkt, off, value as u32),
        },
    }
}
