use telemetry_types::{
    BitWidth, ContainerFile, DecodeError, DecodedValue, Decoder, Parameter, ParameterSet, RecordBuffer, RecordSpec,
    SamplingCycle, DIGITAL_MINOR_SLOT,
};

fn spec() -> RecordSpec {
    RecordSpec::new(128, 3).with_timestamp(0, 24)
}

fn params() -> ParameterSet {
    [
        Parameter::float("temperature", 0, 4, 20.0, 100.0),
        Parameter::digital("pump_state", 1, 40, BitWidth::W16, 0.0, 1000.0),
        Parameter::digital("heater_bits", 2, 32, BitWidth::W8, 0.0, 1.0).with_cycle(SamplingCycle::Minor),
    ]
    .into_iter()
    .collect()
}

fn record(t: f64) -> RecordBuffer {
    let mut rec = RecordBuffer::new(spec());
    rec.set_record_time(t).unwrap();
    rec.insert_f32(0, 4, 42.5).unwrap();
    rec.insert_u16(1, 40, 1000).unwrap();
    for i in 0..5 {
        // High bytes are not part of the level.
        rec.insert_u64(2, 32 + i * DIGITAL_MINOR_SLOT, 0xAB00 | (i as u64 % 2)).unwrap();
    }
    rec
}

#[test]
fn records_stored_in_a_container_decode_with_its_parameters() {
    let records: Vec<u8> = [0.0, 0.25].iter().flat_map(|&t| record(t).to_bytes()).collect();
    let bytes = ContainerFile::new(params(), records).to_bytes();

    let file = ContainerFile::parse(&bytes).unwrap();
    let decoder = Decoder::new(file.parameters.clone(), spec(), 0.25);
    let decoded: Vec<_> = file.record_chunks(&spec()).map(|r| decoder.decode_bytes(r)).collect();

    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[1].record_time, Some(0.25));
    assert_eq!(decoded[1].missing_count(), 0);
    assert_eq!(decoded[1].get("temperature").unwrap().values(), vec![42.5]);
    assert_eq!(decoded[1].get("pump_state").unwrap().values(), vec![1000.0]);

    let bits = decoded[1].get("heater_bits").unwrap();
    assert_eq!(bits.values(), vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    for (i, s) in bits.samples().iter().enumerate() {
        assert!((s.time - (0.25 + i as f64 * 0.05)).abs() < 1e-12);
    }
}

#[test]
fn short_record_marks_only_the_affected_parameters_missing() {
    let rec = record(1.0);
    let decoder = Decoder::new(params(), spec(), 0.5);
    let decoded = decoder.decode_packets(&rec.packets()[..2]);

    assert_eq!(decoded.record_time, Some(1.0));
    assert_eq!(decoded.missing_count(), 1);
    assert!(matches!(
        decoded.get("heater_bits"),
        Some(DecodedValue::Missing(DecodeError::MissingPacket { packet_index: 2, available: 2 }))
    ));
    assert!(!decoded.get("temperature").unwrap().is_missing());
}
