//! Seeding engine output read back through the shared decoder.

use telemetry_simulator::{waveform, SeedingEngine};
use telemetry_types::{
    BitWidth, ContainerFile, DecodedValue, Decoder, Parameter, ParameterSet, RecordSpec, SamplingCycle, WaveformKind,
};

const INTERVAL: f64 = 0.5;

fn spec() -> RecordSpec {
    RecordSpec::new(1400, 10)
}

fn mixed_params() -> ParameterSet {
    [
        Parameter::float("temperature", 0, 4, 20.0, 100.0).with_waveform(WaveformKind::Sine, 0.1, 0.0),
        Parameter::float("angle", 0, 40, -180.0, 180.0).with_waveform(WaveformKind::Cosine, 0.3, 0.7),
        Parameter::float("ramp", 2, 0, 0.0, 5.0).with_waveform(WaveformKind::Triangle, 0.2, 0.0),
        Parameter::float("pressure", 0, 100, 0.0, 50.0)
            .with_waveform(WaveformKind::Triangle, 0.2, 0.0)
            .with_cycle(SamplingCycle::Minor),
        Parameter::digital("pump", 1, 40, BitWidth::W16, 0.0, 65535.0),
        Parameter::digital("relay", 1, 44, BitWidth::W32, 10.0, 4_000_000.0).with_waveform(WaveformKind::Step, 0.5, 0.0),
        Parameter::digital("heater_bits", 2, 64, BitWidth::W8, 0.0, 1.0)
            .with_waveform(WaveformKind::Square, 2.0, 0.3)
            .with_cycle(SamplingCycle::Minor),
    ]
    .into_iter()
    .collect()
}

#[test]
fn major_and_minor_values_survive_the_wire() {
    let params = mixed_params();
    assert!(params.validate_layout(&spec()).is_empty());

    let engine = SeedingEngine::new(params.clone(), spec());
    let decoder = Decoder::new(params.clone(), spec(), INTERVAL);

    for t in [0.0, 0.35, 2.5, 7.25, 9.0] {
        let seeded = engine.seed_record(t, None, INTERVAL);
        assert!(seeded.errors.is_empty());
        let decoded = decoder.decode_bytes(&seeded.buffer.to_bytes());
        assert_eq!(decoded.missing_count(), 0);
        assert!((decoded.record_time.unwrap() - t).abs() < 1e-6);

        for p in params.iter() {
            let value = decoded.get(&p.name).unwrap();
            match (p.cycle, value) {
                (SamplingCycle::Major, DecodedValue::Major(s)) => {
                    let expected = waveform::sample(p, t);
                    let wire = if p.is_digital() { expected } else { expected as f32 as f64 };
                    assert!((s.value - wire).abs() < 1e-6, "{} at t={t}: {} vs {wire}", p.name, s.value);
                }
                (SamplingCycle::Minor, DecodedValue::Minor(samples)) => {
                    for (i, s) in samples.iter().enumerate() {
                        let time = t + i as f64 * INTERVAL / 5.0;
                        assert!((s.time - time).abs() < 1e-6, "{} sample {i} time", p.name);
                        let expected = waveform::sample(p, time);
                        let wire = if p.is_digital() { expected } else { expected as f32 as f64 };
                        assert!((s.value - wire).abs() < 1e-6, "{} sample {i} value", p.name);
                    }
                }
                (cycle, other) => panic!("{}: {cycle:?} decoded as {other:?}", p.name),
            }
        }
    }
}

#[test]
fn digital_values_are_exactly_one_of_two_levels() {
    let params = mixed_params();
    let engine = SeedingEngine::new(params.clone(), spec());
    let decoder = Decoder::new(params, spec(), INTERVAL);

    for step in 0..40 {
        let t = step as f64 * 0.137;
        let decoded = decoder.decode_bytes(&engine.seed_record(t, None, INTERVAL).buffer.to_bytes());
        for v in decoded.get("pump").unwrap().values() {
            assert!(v == 0.0 || v == 65535.0);
        }
        for v in decoded.get("relay").unwrap().values() {
            assert!(v == 10.0 || v == 4_000_000.0);
        }
        for v in decoded.get("heater_bits").unwrap().values() {
            assert!(v == 0.0 || v == 1.0);
        }
    }
}

#[test]
fn sixteen_bit_square_follows_the_sine_sign() {
    let params: ParameterSet = [Parameter::digital("valve", 0, 0, BitWidth::W16, 0.0, 65535.0)
        .with_waveform(WaveformKind::Square, 1.0, 0.0)]
    .into_iter()
    .collect();
    let engine = SeedingEngine::new(params.clone(), spec());
    let decoder = Decoder::new(params, spec(), INTERVAL);

    for (t, expected) in [(0.1, 65535.0), (0.25, 65535.0), (0.4, 65535.0), (0.6, 0.0), (0.75, 0.0), (0.9, 0.0)] {
        let seeded = engine.seed_record(t, None, INTERVAL);
        assert_eq!(seeded.buffer.read_u16(0, 0).unwrap() as f64, expected, "t={t}");
        let decoded = decoder.decode_bytes(&seeded.buffer.to_bytes());
        assert_eq!(decoded.get("valve").unwrap().values(), vec![expected]);
    }
}

#[test]
fn every_packet_carries_the_record_time() {
    let engine = SeedingEngine::new(mixed_params(), spec());
    let seeded = engine.seed_record(4.5, None, INTERVAL);
    for packet in seeded.buffer.packets() {
        assert_eq!(packet.len(), 1400);
        assert_eq!(f32::from_le_bytes(packet[24..28].try_into().unwrap()), 4.5);
    }
}

#[test]
fn overflowing_parameter_is_isolated() {
    let mut params = mixed_params();
    params.insert(Parameter::float("edge", 3, 1398, 0.0, 1.0));
    params.insert(Parameter::float("neighbour", 3, 1392, 0.0, 1.0).with_fixed_value(0.75));

    let template = vec![0x5Au8; spec().record_len()];
    let engine = SeedingEngine::new(params.clone(), spec());
    let seeded = engine.seed_record(1.0, Some(&template), INTERVAL);

    assert_eq!(seeded.errors.len(), 1);
    assert_eq!(seeded.errors[0].parameter, "edge");
    assert_eq!(seeded.buffer.read_bytes(3, 1396, 4).unwrap(), &[0x5A; 4]);
    assert_eq!(seeded.buffer.read_f32(3, 1392).unwrap(), 0.75);

    let decoded = Decoder::new(params, spec(), INTERVAL).decode_bytes(&seeded.buffer.to_bytes());
    assert!(decoded.get("edge").unwrap().is_missing());
    assert_eq!(decoded.get("neighbour").unwrap().values(), vec![0.75]);
}

#[test]
fn container_template_survives_disk_and_reseeding() {
    let params: ParameterSet = [Parameter::float("temperature", 0, 4, 20.0, 100.0)].into_iter().collect();
    let mut records = vec![0u8; spec().record_len()];
    records[500] = 0x42;
    records[1400 * 9 + 8] = 0x24;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.dat");
    ContainerFile::new(params, records).save(&path).unwrap();

    let loaded = ContainerFile::load(&path).unwrap();
    let engine = SeedingEngine::new(loaded.parameters.clone(), spec()).with_template(&loaded.records);
    let seeded = engine.seed_record(3.0, engine.template_for(0), INTERVAL);

    assert_eq!(seeded.buffer.read_u8(0, 500).unwrap(), 0x42);
    assert_eq!(seeded.buffer.read_u8(9, 8).unwrap(), 0x24);
    assert_eq!(seeded.buffer.read_f32(9, 24).unwrap(), 3.0);
    let expected = waveform::sample(loaded.parameters.get("temperature").unwrap(), 3.0) as f32;
    assert_eq!(seeded.buffer.read_f32(0, 4).unwrap(), expected);
}
