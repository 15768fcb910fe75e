//! Parameter model: one telemetry quantity, where it lives on the wire and how
//! its values are synthesized.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordSpec;

/// Sub-samples per record for a minor-cycle parameter.
pub const MINOR_SAMPLES: usize = 5;

/// Bytes occupied by one digital minor-cycle sample (level in the low byte).
pub const DIGITAL_MINOR_SLOT: usize = 8;

const FLOAT_LEN: usize = 4;

// ── Value kind ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 4-byte little-endian IEEE754
    #[default]
    #[serde(alias = "float", alias = "f32")]
    Float32,
    /// Two-level value encoded as an unsigned integer
    #[serde(alias = "bit")]
    Digital,
}

/// Integer encoding width of a digital major-cycle value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BitWidth {
    #[default]
    W8,
    W16,
    W32,
}

impl BitWidth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::W8),
            16 => Some(Self::W16),
            32 => Some(Self::W32),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Largest level a field of this width holds.
    pub fn max_level(self) -> u64 {
        (1u64 << self.bits()) - 1
    }
}

impl TryFrom<u32> for BitWidth {
    type Error = String;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        Self::from_bits(bits).ok_or_else(|| format!("unsupported bit width {bits} (expected 8, 16 or 32)"))
    }
}

impl From<BitWidth> for u32 {
    fn from(w: BitWidth) -> u32 {
        w.bits()
    }
}

/// Sampling cadence, serialized as samples per half second (1 or 5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SamplingCycle {
    /// One sample per record
    #[default]
    Major,
    /// Five evenly spaced sub-samples per record interval
    Minor,
}

impl SamplingCycle {
    pub fn from_samples(samples: u32) -> Option<Self> {
        match samples {
            1 => Some(Self::Major),
            5 => Some(Self::Minor),
            _ => None,
        }
    }

    pub fn samples(self) -> usize {
        match self {
            Self::Major => 1,
            Self::Minor => MINOR_SAMPLES,
        }
    }
}

impl TryFrom<u32> for SamplingCycle {
    type Error = String;

    fn try_from(samples: u32) -> Result<Self, Self::Error> {
        Self::from_samples(samples)
            .ok_or_else(|| format!("unsupported samples per half second {samples} (expected 1 or 5)"))
    }
}

impl From<SamplingCycle> for u32 {
    fn from(c: SamplingCycle) -> u32 {
        c.samples() as u32
    }
}

// ── Waveform shape ────────────────────────────────────────────────────────────

/// Shape of the normalized [-1, 1] signal behind a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum WaveformKind {
    #[default]
    #[serde(alias = "sine", alias = "sin")]
    Sine,
    #[serde(alias = "cosine", alias = "cos")]
    Cosine,
    #[serde(alias = "triangle", alias = "tri")]
    Triangle,
    #[serde(alias = "square", alias = "sqr")]
    Square,
    #[serde(alias = "step", alias = "stepper")]
    Step,
    #[serde(alias = "noise", alias = "random")]
    Noise,
    /// Fixed normalized level, independent of time
    #[serde(alias = "constant", alias = "const")]
    Constant(f64),
}

impl WaveformKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sine => "Sine",
            Self::Cosine => "Cosine",
            Self::Triangle => "Triangle",
            Self::Square => "Square",
            Self::Step => "Step",
            Self::Noise => "Noise",
            Self::Constant(_) => "Constant",
        }
    }
}

// ── Parameter ─────────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_frequency() -> f64 {
    1.0
}

fn default_amplitude() -> f64 {
    1.0
}

/// One telemetry quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique within a [`ParameterSet`]
    pub name: String,
    /// Display ordering only
    #[serde(default)]
    pub serial: u32,
    /// Packet within the record (0-based)
    pub packet_index: usize,
    /// Start offset within that packet
    pub byte_offset: usize,
    #[serde(default)]
    pub dtype: DataType,
    /// Only meaningful for digital major-cycle values
    #[serde(default)]
    pub bit_width: BitWidth,
    pub min_value: f64,
    pub max_value: f64,
    #[serde(default)]
    pub waveform: WaveformKind,
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    #[serde(default)]
    pub phase_radians: f64,
    /// Derive amplitude/offset from the min/max range instead of the explicit pair
    #[serde(default = "default_true")]
    pub full_sweep: bool,
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default, rename = "samples_per_half_second")]
    pub cycle: SamplingCycle,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Emit live sample events for this parameter
    #[serde(default = "default_true")]
    pub enabled_in_graph: bool,
    /// Inclusive enable window; `None` is unbounded on that side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Override for major-cycle float parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<f64>,
}

impl Parameter {
    /// Enabled major-cycle float parameter sweeping `[min, max]` with a 1 Hz sine.
    pub fn float(name: impl Into<String>, packet_index: usize, byte_offset: usize, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            serial: 0,
            packet_index,
            byte_offset,
            dtype: DataType::Float32,
            bit_width: BitWidth::W8,
            min_value: min,
            max_value: max,
            waveform: WaveformKind::Sine,
            frequency_hz: default_frequency(),
            phase_radians: 0.0,
            full_sweep: true,
            amplitude: default_amplitude(),
            offset: 0.0,
            cycle: SamplingCycle::Major,
            enabled: true,
            enabled_in_graph: true,
            start_time: None,
            end_time: None,
            fixed_value: None,
        }
    }

    /// Enabled major-cycle digital parameter toggling between `min` and `max`.
    pub fn digital(
        name: impl Into<String>,
        packet_index: usize,
        byte_offset: usize,
        bit_width: BitWidth,
        min: f64,
        max: f64,
    ) -> Self {
        Self {
            dtype: DataType::Digital,
            bit_width,
            waveform: WaveformKind::Square,
            ..Self::float(name, packet_index, byte_offset, min, max)
        }
    }

    pub fn with_waveform(mut self, waveform: WaveformKind, frequency_hz: f64, phase_radians: f64) -> Self {
        self.waveform = waveform;
        self.frequency_hz = frequency_hz;
        self.phase_radians = phase_radians;
        self
    }

    pub fn with_cycle(mut self, cycle: SamplingCycle) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_window(mut self, start_time: Option<f64>, end_time: Option<f64>) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Use an explicit amplitude/offset pair instead of the full min/max sweep.
    pub fn with_explicit_scale(mut self, amplitude: f64, offset: f64) -> Self {
        self.full_sweep = false;
        self.amplitude = amplitude;
        self.offset = offset;
        self
    }

    pub fn with_fixed_value(mut self, value: f64) -> Self {
        self.fixed_value = Some(value);
        self
    }

    pub fn is_digital(&self) -> bool {
        self.dtype == DataType::Digital
    }

    /// Distance in bytes between consecutive sub-samples (or the single sample).
    pub fn sample_stride(&self) -> usize {
        match (self.dtype, self.cycle) {
            (DataType::Float32, _) => FLOAT_LEN,
            (DataType::Digital, SamplingCycle::Major) => self.bit_width.bytes(),
            (DataType::Digital, SamplingCycle::Minor) => DIGITAL_MINOR_SLOT,
        }
    }

    /// Total bytes this parameter occupies within its packet.
    pub fn encoded_len(&self) -> usize {
        self.sample_stride() * self.cycle.samples()
    }

    /// Byte range within the parameter's packet. Saturates instead of wrapping.
    pub fn field_range(&self) -> Range<usize> {
        self.byte_offset..self.byte_offset.saturating_add(self.encoded_len())
    }

    /// Whether `t` falls inside the inclusive enable window.
    pub fn in_window(&self, t: f64) -> bool {
        self.start_time.map_or(true, |s| t >= s) && self.end_time.map_or(true, |e| t <= e)
    }

    /// Enabled and inside its window at `t`.
    pub fn is_active_at(&self, t: f64) -> bool {
        self.enabled && self.in_window(t)
    }

    /// Threshold separating the two digital levels.
    pub fn midpoint(&self) -> f64 {
        (self.min_value + self.max_value) / 2.0
    }

    /// Largest level the wire keeps for a digital parameter: the bit width for
    /// major cycles, the low byte of each slot for minor cycles.
    pub fn digital_level_limit(&self) -> Option<u64> {
        match (self.dtype, self.cycle) {
            (DataType::Float32, _) => None,
            (DataType::Digital, SamplingCycle::Major) => Some(self.bit_width.max_level()),
            (DataType::Digital, SamplingCycle::Minor) => Some(u64::from(u8::MAX)),
        }
    }
}

// ── Layout validation ─────────────────────────────────────────────────────────

/// Problems found by [`ParameterSet::validate_layout`]. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutIssue {
    #[error("`{name}`: field {start}..{end} overflows packet length {packet_length}")]
    FieldOverflow {
        name: String,
        start: usize,
        end: usize,
        packet_length: usize,
    },
    #[error("`{name}`: packet {packet_index} out of range ({packets_per_record} packets per record)")]
    PacketOutOfRange {
        name: String,
        packet_index: usize,
        packets_per_record: usize,
    },
    #[error("`{first}` and `{second}` overlap in packet {packet_index}")]
    Overlap {
        first: String,
        second: String,
        packet_index: usize,
    },
    #[error("`{name}`: field overlaps the record timestamp")]
    TimestampOverlap { name: String },
    #[error("`{name}`: enable window starts after it ends")]
    InvertedWindow { name: String },
    #[error("`{name}`: min value {min} is greater than max value {max}")]
    InvertedRange { name: String, min: f64, max: f64 },
    #[error("`{name}`: digital levels {min} and {max} must be whole numbers in 0..={limit}")]
    DigitalLevelRange { name: String, min: f64, max: f64, limit: u64 },
}

fn ranges_overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

// ── Parameter set ─────────────────────────────────────────────────────────────

/// Ordered, name-unique collection of parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter. A parameter with the same name is replaced in place
    /// and returned.
    pub fn insert(&mut self, param: Parameter) -> Option<Parameter> {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => Some(std::mem::replace(existing, param)),
            None => {
                self.params.push(param);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let idx = self.params.iter().position(|p| p.name == name)?;
        Some(self.params.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| p.enabled)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Check every parameter against the record geometry and each other.
    /// Overlaps are only reported between enabled parameters.
    pub fn validate_layout(&self, spec: &RecordSpec) -> Vec<LayoutIssue> {
        let mut issues = Vec::new();
        let ts_range = spec.timestamp_byte_offset..spec.timestamp_byte_offset.saturating_add(4);

        for p in &self.params {
            if p.min_value > p.max_value {
                issues.push(LayoutIssue::InvertedRange {
                    name: p.name.clone(),
                    min: p.min_value,
                    max: p.max_value,
                });
            }
            if let (Some(s), Some(e)) = (p.start_time, p.end_time) {
                if s > e {
                    issues.push(LayoutIssue::InvertedWindow { name: p.name.clone() });
                }
            }
            if p.packet_index >= spec.packets_per_record {
                issues.push(LayoutIssue::PacketOutOfRange {
                    name: p.name.clone(),
                    packet_index: p.packet_index,
                    packets_per_record: spec.packets_per_record,
                });
            }
            if let Some(limit) = p.digital_level_limit() {
                let fits = |v: f64| v.fract() == 0.0 && (0.0..=limit as f64).contains(&v);
                if !(fits(p.min_value) && fits(p.max_value)) {
                    issues.push(LayoutIssue::DigitalLevelRange {
                        name: p.name.clone(),
                        min: p.min_value,
                        max: p.max_value,
                        limit,
                    });
                }
            }
            let field = p.field_range();
            if field.end > spec.packet_length {
                issues.push(LayoutIssue::FieldOverflow {
                    name: p.name.clone(),
                    start: field.start,
                    end: field.end,
                    packet_length: spec.packet_length,
                });
            }
            if p.enabled && ranges_overlap(&field, &ts_range) {
                issues.push(LayoutIssue::TimestampOverlap { name: p.name.clone() });
            }
        }

        let enabled: Vec<&Parameter> = self.enabled().collect();
        for (i, a) in enabled.iter().enumerate() {
            for b in &enabled[i + 1..] {
                if a.packet_index == b.packet_index && ranges_overlap(&a.field_range(), &b.field_range()) {
                    issues.push(LayoutIssue::Overlap {
                        first: a.name.clone(),
                        second: b.name.clone(),
                        packet_index: a.packet_index,
                    });
                }
            }
        }

        issues
    }
}

impl FromIterator<Parameter> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut set = Self::new();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
