//! sender.rs — Consumer side of the record queue
//!
//! Dequeues records in order and writes every packet to a [`PacketSink`].
//! The pause gate is checked before each dequeue and again before each send,
//! so a paused sender holds whatever it already took. Transport errors are
//! logged, counted and published; the task keeps going with the next record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::control::{PauseGate, PauseSwitch, Shutdown, ShutdownSignal};
use crate::events::{EventBus, SimEvent, TaskKind};
use crate::udp_tx::PacketSink;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One record on its way to the wire, packets in packet-index order.
#[derive(Debug, Clone)]
pub struct OutboundRecord {
    pub record_index: u64,
    pub record_time: f64,
    pub packets: Vec<Bytes>,
}

/// Bounded FIFO between seeder and sender.
pub fn record_queue(capacity: usize) -> (mpsc::Sender<OutboundRecord>, mpsc::Receiver<OutboundRecord>) {
    mpsc::channel(capacity.max(1))
}

// ── Statistics ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SenderStats {
    records_sent: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub records_sent: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

impl SenderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_sent: self.records_sent.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

pub struct PacketSender<S> {
    sink: S,
    events: EventBus,
}

impl<S: PacketSink> PacketSender<S> {
    pub fn new(sink: S, events: EventBus) -> Self {
        Self { sink, events }
    }

    pub fn spawn(self, queue: mpsc::Receiver<OutboundRecord>) -> SenderHandle {
        let pause = PauseSwitch::default();
        let shutdown = Shutdown::default();
        let stats = Arc::new(SenderStats::default());

        let task = tokio::spawn(run(
            self.sink,
            queue,
            pause.gate(),
            shutdown.signal(),
            stats.clone(),
            self.events,
        ));

        SenderHandle {
            pause,
            shutdown,
            stats,
            task,
        }
    }
}

pub struct SenderHandle {
    pause: PauseSwitch,
    shutdown: Shutdown,
    stats: Arc<SenderStats>,
    task: JoinHandle<()>,
}

impl SenderHandle {
    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop promptly. The queue receiver and the sink are dropped before this
    /// returns; records still queued are discarded.
    pub async fn stop(self) -> StatsSnapshot {
        self.shutdown.trigger();
        self.join().await
    }

    /// Wait for the queue to close and drain.
    pub async fn join(self) -> StatsSnapshot {
        if let Err(e) = self.task.await {
            warn!("Sender: task ended abnormally: {e}");
        }
        self.stats.snapshot()
    }
}

fn publish_state(events: &EventBus, state: &str) {
    events.publish(SimEvent::StateChanged {
        task: TaskKind::Sender,
        state: state.to_string(),
    });
}

/// Hold until resumed. `false` if shutdown arrived first.
async fn hold_while_paused(gate: &mut PauseGate, shutdown: &mut ShutdownSignal, events: &EventBus) -> bool {
    if !gate.is_paused() {
        return true;
    }
    publish_state(events, "paused");
    let resumed = tokio::select! {
        biased;
        _ = shutdown.triggered() => false,
        _ = gate.wait_resumed() => true,
    };
    if resumed {
        publish_state(events, "running");
    }
    resumed
}

async fn run<S: PacketSink>(
    mut sink: S,
    mut queue: mpsc::Receiver<OutboundRecord>,
    mut gate: PauseGate,
    mut shutdown: ShutdownSignal,
    stats: Arc<SenderStats>,
    events: EventBus,
) {
    publish_state(&events, "running");

    loop {
        if !hold_while_paused(&mut gate, &mut shutdown, &events).await {
            break;
        }

        let record = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            next = queue.recv() => match next {
                Some(record) => record,
                None => {
                    debug!("Sender: queue closed and drained");
                    break;
                }
            },
        };

        // Pause may have been requested while waiting on the queue.
        if !hold_while_paused(&mut gate, &mut shutdown, &events).await {
            break;
        }

        send_record(&mut sink, &record, &stats, &events).await;
    }

    // Dropping the receiver unblocks a producer waiting for capacity.
    drop(queue);
    drop(sink);

    let s = stats.snapshot();
    info!(
        "📤 Sender stopped: {} records, {} packets, {} bytes, {} errors",
        s.records_sent, s.packets_sent, s.bytes_sent, s.send_errors
    );
    publish_state(&events, "stopped");
}

/// A failed packet abandons the rest of its record.
async fn send_record<S: PacketSink>(sink: &mut S, record: &OutboundRecord, stats: &SenderStats, events: &EventBus) {
    let mut record_bytes = 0usize;

    for (packet_index, packet) in record.packets.iter().enumerate() {
        match sink.send(packet).await {
            Ok(n) => {
                record_bytes += n;
                stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                stats.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                events.publish(SimEvent::PacketSent {
                    record_index: record.record_index,
                    packet_index,
                    bytes: n,
                });
            }
            Err(e) => {
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!("UDP: record {} packet {packet_index} send failed: {e}", record.record_index);
                events.error(
                    "sender",
                    format!("record {} packet {packet_index}: {e}", record.record_index),
                );
                return;
            }
        }
    }

    stats.records_sent.fetch_add(1, Ordering::Relaxed);
    events.publish(SimEvent::RecordSent {
        record_index: record.record_index,
        bytes: record_bytes,
        total_bytes: stats.bytes_sent.load(Ordering::Relaxed),
    });
}
