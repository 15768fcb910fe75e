//! # assembler
//!
//! Regroups datagrams into records. Every packet of a record carries the same
//! timestamp, so a change of timestamp before a record is complete means
//! packets were lost: the partial record is dropped and counted.

use telemetry_types::RecordSpec;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRecord {
    pub record_time: f64,
    /// `packets_per_record` packets in arrival order
    pub packets: Vec<Vec<u8>>,
}

impl AssembledRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.packets.concat()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub packets_accepted: u64,
    pub wrong_size: u64,
    pub incomplete_dropped: u64,
    pub records: u64,
}

#[derive(Debug)]
pub struct RecordAssembler {
    spec: RecordSpec,
    pending: Vec<Vec<u8>>,
    /// Raw bits of the pending record's timestamp; exact comparison
    pending_stamp: Option<u32>,
    stats: AssemblerStats,
}

impl RecordAssembler {
    pub fn new(spec: RecordSpec) -> Self {
        Self {
            spec,
            pending: Vec::with_capacity(spec.packets_per_record),
            pending_stamp: None,
            stats: AssemblerStats::default(),
        }
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    fn stamp(&self, packet: &[u8]) -> u32 {
        let o = self.spec.timestamp_byte_offset;
        u32::from_le_bytes([packet[o], packet[o + 1], packet[o + 2], packet[o + 3]])
    }

    /// Feed one datagram; returns a record once it is complete.
    pub fn push(&mut self, packet: Vec<u8>) -> Option<AssembledRecord> {
        // A validated geometry keeps the timestamp inside the packet.
        let stamp_fits = self.spec.timestamp_byte_offset.checked_add(4).is_some_and(|end| end <= packet.len());
        if packet.len() != self.spec.packet_length || !stamp_fits {
            self.stats.wrong_size += 1;
            debug!("Assembler: ignoring {}B datagram", packet.len());
            return None;
        }
        self.stats.packets_accepted += 1;

        let stamp = self.stamp(&packet);
        if self.pending_stamp.is_some_and(|s| s != stamp) {
            debug!(
                "Assembler: timestamp changed after {} of {} packets, dropping partial record",
                self.pending.len(),
                self.spec.packets_per_record
            );
            self.discard_pending();
        }

        self.pending_stamp = Some(stamp);
        self.pending.push(packet);

        if self.pending.len() < self.spec.packets_per_record {
            return None;
        }

        self.pending_stamp = None;
        self.stats.records += 1;
        Some(AssembledRecord {
            record_time: f32::from_bits(stamp) as f64,
            packets: std::mem::take(&mut self.pending),
        })
    }

    /// Drop whatever partial record is pending (end of capture).
    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.discard_pending();
        }
    }

    fn discard_pending(&mut self) {
        self.stats.incomplete_dropped += 1;
        self.pending.clear();
        self.pending_stamp = None;
    }
}
