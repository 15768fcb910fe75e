//! waveform.rs — Waveform evaluation and range mapping
//!
//! Pure math, no state: every shape maps `(t, frequency, phase)` to a
//! normalized value in [-1, 1], which is then rescaled into the parameter's
//! engineering range. Noise is the only non-deterministic shape.

use std::f64::consts::PI;

use rand::Rng;
use telemetry_types::{Parameter, WaveformKind};

/// Normalized value of `kind` at time `t` (seconds), in [-1, 1].
pub fn evaluate(kind: &WaveformKind, t: f64, frequency_hz: f64, phase_radians: f64) -> f64 {
    let angle = 2.0 * PI * frequency_hz * t + phase_radians;
    match kind {
        WaveformKind::Sine => angle.sin(),
        WaveformKind::Cosine => angle.cos(),
        WaveformKind::Triangle => triangle(t, frequency_hz, phase_radians),
        WaveformKind::Square | WaveformKind::Step => sign(angle.sin()),
        WaveformKind::Noise => rand::thread_rng().gen_range(-1.0..=1.0),
        WaveformKind::Constant(level) => level.clamp(-1.0, 1.0),
    }
}

/// +1 for zero and positive values.
fn sign(x: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

fn triangle(t: f64, frequency_hz: f64, phase_radians: f64) -> f64 {
    let frac = if frequency_hz == 0.0 {
        (phase_radians / (2.0 * PI)).rem_euclid(1.0)
    } else {
        let period = 1.0 / frequency_hz;
        (t + phase_radians / (2.0 * PI * frequency_hz)).rem_euclid(period) / period
    };
    if frac < 0.5 {
        -1.0 + 4.0 * frac
    } else {
        3.0 - 4.0 * frac
    }
}

/// Map a normalized value into `[min, max]`.
///
/// Full sweep spans the whole range. Otherwise the explicit amplitude/offset
/// pair is used and the result clamped, unless the pair itself would leave
/// the range, in which case the full-sweep centering applies.
pub fn rescale(p: &Parameter, norm: f64) -> f64 {
    let (min, max) = (p.min_value, p.max_value);
    let full = min + (max - min) * (norm + 1.0) / 2.0;
    if p.full_sweep {
        return full;
    }
    let amplitude = p.amplitude.abs();
    if p.offset + amplitude > max || p.offset - amplitude < min {
        return full;
    }
    (p.offset + p.amplitude * norm).clamp(min, max)
}

/// Collapse an analog value onto the two digital levels.
pub fn digital_level(p: &Parameter, analog: f64) -> f64 {
    if analog < p.midpoint() {
        p.min_value
    } else {
        p.max_value
    }
}

/// Engineering value of `p` at time `t`: rescaled analog for floats, one of
/// the two levels for digital parameters. Ignores `fixed_value`.
pub fn sample(p: &Parameter, t: f64) -> f64 {
    let norm = evaluate(&p.waveform, t, p.frequency_hz, p.phase_radians);
    let analog = rescale(p, norm);
    if p.is_digital() {
        digital_level(p, analog)
    } else {
        analog
    }
}
