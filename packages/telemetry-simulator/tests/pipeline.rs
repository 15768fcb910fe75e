//! Timing-dependent pipeline behaviour, on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use telemetry_simulator::{
    record_queue, ConfigError, EventBus, MemorySink, PacketSender, Pipeline, PipelineConfig, Seeder, SeederConfig,
    SeederState, SeedingEngine, SimEvent, StopReason,
};
use telemetry_types::{Parameter, ParameterSet, RecordSpec, WaveformKind};
use tokio::sync::{broadcast, mpsc};

fn drain_events(rx: &mut broadcast::Receiver<SimEvent>) -> Vec<SimEvent> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return out,
        }
    }
}

fn ready_times(events: &[SimEvent]) -> Vec<(u64, f64)> {
    events
        .iter()
        .filter_map(|e| match e {
            SimEvent::RecordReady {
                record_index,
                record_time,
                ..
            } => Some((*record_index, *record_time)),
            _ => None,
        })
        .collect()
}

fn drain_packets(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Ok(packet) = rx.try_recv() {
        out.push(packet);
    }
    out
}

fn f32_at(packet: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(packet[offset..offset + 4].try_into().unwrap())
}

fn config(start_time: f64, end_time: f64, hz: f64) -> PipelineConfig {
    PipelineConfig {
        seeder: SeederConfig {
            start_time,
            end_time,
            hz,
            progress_every: 0,
        },
        queue_capacity: 100,
    }
}

#[tokio::test(start_paused = true)]
async fn full_run_streams_every_record_in_order() {
    let spec = RecordSpec::new(1400, 10);
    let params: ParameterSet = [Parameter::float("temperature", 0, 4, 20.0, 100.0).with_waveform(WaveformKind::Sine, 0.1, 0.0)]
        .into_iter()
        .collect();
    let (sink, mut rx) = MemorySink::new();
    let events = EventBus::default();
    let mut ev = events.subscribe();

    let pipeline = Pipeline::start(config(0.0, 10.0, 2.0), SeedingEngine::new(params, spec), sink, events).unwrap();
    let summary = pipeline.wait().await;

    assert_eq!(summary.state, SeederState::Stopped(StopReason::Completed));
    assert_eq!(summary.stats.records_sent, 21);
    assert_eq!(summary.stats.packets_sent, 210);
    assert_eq!(summary.stats.bytes_sent, 210 * 1400);
    assert_eq!(summary.stats.send_errors, 0);

    let packets = drain_packets(&mut rx);
    assert_eq!(packets.len(), 210);
    for (r, record) in packets.chunks(10).enumerate() {
        let t = r as f64 * 0.5;
        for packet in record {
            assert_eq!(packet.len(), 1400);
            assert_eq!(f32_at(packet, 24), t as f32);
        }
        let expected = 60.0 + 40.0 * (2.0 * std::f64::consts::PI * 0.1 * t).sin();
        assert!((f32_at(&record[0], 4) as f64 - expected).abs() < 1e-4, "record {r}");
    }

    let ready = ready_times(&drain_events(&mut ev));
    let indices: Vec<u64> = ready.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..21).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn full_queue_blocks_the_seeder_until_the_sender_resumes() {
    let spec = RecordSpec::new(64, 2);
    let engine = Arc::new(SeedingEngine::new(ParameterSet::new(), spec));
    let events = EventBus::default();
    let mut ev = events.subscribe();
    let (sink, mut out) = MemorySink::new();
    let (tx, rx) = record_queue(2);

    let sender = PacketSender::new(sink, events.clone()).spawn(rx);
    sender.pause();
    let seeder = Seeder::new(config(0.0, 2.0, 2.0).seeder, engine, events.clone())
        .spawn(tx)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;

    // Two records fit; the third publish is waiting for capacity.
    assert_eq!(ready_times(&drain_events(&mut ev)).len(), 2);
    assert_eq!(seeder.state(), SeederState::Running);
    assert!(out.try_recv().is_err());

    sender.resume();
    assert_eq!(seeder.join().await, SeederState::Stopped(StopReason::Completed));
    let stats = sender.join().await;
    assert_eq!(stats.records_sent, 5);

    let stamps: Vec<f32> = drain_packets(&mut out).iter().map(|p| f32_at(p, 24)).collect();
    assert_eq!(stamps, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.5, 1.5, 2.0, 2.0]);
}

#[tokio::test(start_paused = true)]
async fn pause_holds_both_tasks_and_resume_continues_the_sequence() {
    let (sink, mut rx) = MemorySink::new();
    let events = EventBus::default();
    let mut ev = events.subscribe();
    let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::new(64, 2));
    let pipeline = Pipeline::start(config(0.0, 100.0, 2.0), engine, sink, events).unwrap();

    tokio::time::sleep(Duration::from_millis(1250)).await;
    pipeline.pause();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(pipeline.state(), SeederState::Paused);
    let before = ready_times(&drain_events(&mut ev));
    let sent_before = drain_packets(&mut rx).len();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(ready_times(&drain_events(&mut ev)).is_empty());
    assert!(drain_packets(&mut rx).is_empty());

    pipeline.resume();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let after = ready_times(&drain_events(&mut ev));
    assert!(!after.is_empty());
    assert_eq!(after[0].0, before.last().unwrap().0 + 1);
    assert!((after[0].1 - before.last().unwrap().1 - 0.5).abs() < 1e-9);
    assert_eq!(pipeline.state(), SeederState::Running);

    let summary = pipeline.stop().await;
    assert_eq!(summary.state, SeederState::Stopped(StopReason::Cancelled));
    assert!(sent_before > 0);
}

#[tokio::test(start_paused = true)]
async fn rate_change_applies_from_the_next_tick() {
    let (sink, _rx) = MemorySink::new();
    let events = EventBus::default();
    let mut ev = events.subscribe();
    let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::new(64, 2));
    let pipeline = Pipeline::start(config(0.0, 100.0, 2.0), engine, sink, events).unwrap();

    tokio::time::sleep(Duration::from_millis(1250)).await;
    assert!(pipeline.set_hz(0.0).is_err());
    assert!(pipeline.set_hz(f64::NAN).is_err());
    assert!(pipeline.set_hz(1e10).is_err());
    assert_eq!(pipeline.hz(), 2.0);
    pipeline.set_hz(10.0).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    pipeline.stop().await;

    let ready = ready_times(&drain_events(&mut ev));
    assert!(ready.len() > 10, "only {} records", ready.len());
    let first_step = ready[1].1 - ready[0].1;
    let last_step = ready[ready.len() - 1].1 - ready[ready.len() - 2].1;
    assert!((first_step - 0.5).abs() < 1e-9);
    assert!((last_step - 0.1).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn rate_too_fast_for_the_timer_is_rejected_at_start() {
    let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::new(64, 2));
    let (sink, mut rx) = MemorySink::new();
    let started = Pipeline::start(config(0.0, 1.0, 1e10), engine, sink, EventBus::default());
    assert!(matches!(started, Err(ConfigError::InvalidRate(_))));
    // Nothing was spawned, so the sink was dropped unused.
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_then_start_gives_a_fresh_run() {
    let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::new(64, 2));
    let events = EventBus::default();

    let (sink, mut first_rx) = MemorySink::new();
    let first = Pipeline::start(config(5.0, 1000.0, 4.0), engine.clone(), sink, events.clone()).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let summary = first.stop().await;
    assert_eq!(summary.state, SeederState::Stopped(StopReason::Cancelled));

    let first_packets = drain_packets(&mut first_rx);
    assert_eq!(first_packets.len() as u64, summary.stats.packets_sent);
    // Sink was released with the sender: nothing more can arrive.
    assert!(first_rx.recv().await.is_none());

    let (sink, mut second_rx) = MemorySink::new();
    let second = Pipeline::start(config(5.0, 1000.0, 4.0), engine, sink, events).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = second.stats();
    second.stop().await;

    let packets = drain_packets(&mut second_rx);
    assert!(!packets.is_empty());
    assert_eq!(f32_at(&packets[0], 24), 5.0);
    assert!(stats.records_sent <= 1);
}

#[tokio::test(start_paused = true)]
async fn single_point_window_yields_one_record() {
    let (sink, mut rx) = MemorySink::new();
    let engine = SeedingEngine::new(ParameterSet::new(), RecordSpec::new(64, 3));
    let pipeline = Pipeline::start(config(3.0, 3.0, 2.0), engine, sink, EventBus::default()).unwrap();
    let summary = pipeline.wait().await;

    assert_eq!(summary.stats.records_sent, 1);
    let packets = drain_packets(&mut rx);
    assert_eq!(packets.len(), 3);
    assert!(packets.iter().all(|p| f32_at(p, 24) == 3.0));
}
