//! Record geometry and the in-memory record buffer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{BufferError, SpecError};

// ── Record geometry ───────────────────────────────────────────────────────────────

/// Fixed per-run record geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSpec {
    /// Bytes per packet, always a multiple of 4 once normalized
    pub packet_length: usize,
    pub packets_per_record: usize,
    /// Packet the listener reads the record time from
    pub timestamp_packet_index: usize,
    /// Offset of the f32 timestamp stamped into every packet
    pub timestamp_byte_offset: usize,
}

impl Default for RecordSpec {
    fn default() -> Self {
        Self {
            packet_length: 1400,
            packets_per_record: 10,
            timestamp_packet_index: 0,
            timestamp_byte_offset: 24,
        }
    }
}

impl RecordSpec {
    /// Geometry with the default timestamp location. `packet_length` is rounded
    /// up to a multiple of 4.
    pub fn new(packet_length: usize, packets_per_record: usize) -> Self {
        Self {
            packet_length,
            packets_per_record,
            ..Self::default()
        }
        .normalized()
    }

    pub fn with_timestamp(mut self, packet_index: usize, byte_offset: usize) -> Self {
        self.timestamp_packet_index = packet_index;
        self.timestamp_byte_offset = byte_offset;
        self
    }

    /// Round `packet_length` up to the next multiple of 4.
    pub fn normalized(mut self) -> Self {
        let rem = self.packet_length % 4;
        if rem != 0 {
            self.packet_length = self.packet_length.saturating_add(4 - rem);
        }
        self
    }

    /// Bytes in one complete record.
    pub fn record_len(&self) -> usize {
        self.packet_length * self.packets_per_record
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.packet_length == 0 {
            return Err(SpecError::ZeroPacketLength);
        }
        if self.packets_per_record == 0 {
            return Err(SpecError::ZeroPackets);
        }
        if self.timestamp_packet_index >= self.packets_per_record {
            return Err(SpecError::TimestampPacket {
                packet_index: self.timestamp_packet_index,
                packets_per_record: self.packets_per_record,
            });
        }
        let fits = self
            .timestamp_byte_offset
            .checked_add(4)
            .is_some_and(|end| end <= self.packet_length);
        if !fits {
            return Err(SpecError::TimestampOffset {
                offset: self.timestamp_byte_offset,
                packet_length: self.packet_length,
            });
        }
        Ok(())
    }
}

// ── Record buffer ─────────────────────────────────────────────────────────────

/// One record under construction: `packets_per_record` independent packets of
/// `packet_length` bytes. Owned by whoever is building or sending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBuffer {
    spec: RecordSpec,
    packets: Vec<Vec<u8>>,
}

impl RecordBuffer {
    /// Zero-filled record.
    pub fn new(spec: RecordSpec) -> Self {
        Self {
            spec,
            packets: vec![vec![0u8; spec.packet_length]; spec.packets_per_record],
        }
    }

    /// Record initialized from a captured template: split into packet-sized
    /// chunks, zero-padding a short trailing chunk. Bytes beyond one record are
    /// ignored, missing packets stay zero.
    pub fn from_template(spec: RecordSpec, template: &[u8]) -> Self {
        let mut buf = Self::new(spec);
        for (packet, chunk) in buf.packets.iter_mut().zip(template.chunks(spec.packet_length.max(1))) {
            packet[..chunk.len()].copy_from_slice(chunk);
        }
        buf
    }

    pub fn spec(&self) -> &RecordSpec {
        &self.spec
    }

    pub fn packet(&self, index: usize) -> Option<&[u8]> {
        self.packets.get(index).map(Vec::as_slice)
    }

    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }

    fn check(&self, packet_index: usize, offset: usize, len: usize) -> Result<(), BufferError> {
        if packet_index >= self.spec.packets_per_record {
            return Err(BufferError::PacketOutOfRange {
                packet_index,
                packets_per_record: self.spec.packets_per_record,
            });
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.spec.packet_length => Ok(()),
            _ => Err(BufferError::OffsetOutOfRange {
                offset,
                len,
                packet_length: self.spec.packet_length,
            }),
        }
    }

    /// Bounds-checked raw write. Nothing is written on error.
    pub fn write_bytes(&mut self, packet_index: usize, offset: usize, bytes: &[u8]) -> Result<(), BufferError> {
        self.check(packet_index, offset, bytes.len())?;
        self.packets[packet_index][offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Bounds-checked raw read.
    pub fn read_bytes(&self, packet_index: usize, offset: usize, len: usize) -> Result<&[u8], BufferError> {
        self.check(packet_index, offset, len)?;
        Ok(&self.packets[packet_index][offset..offset + len])
    }

    pub fn insert_f32(&mut self, packet_index: usize, offset: usize, value: f32) -> Result<(), BufferError> {
        self.write_bytes(packet_index, offset, &value.to_le_bytes())
    }

    pub fn insert_u8(&mut self, packet_index: usize, offset: usize, value: u8) -> Result<(), BufferError> {
        self.write_bytes(packet_index, offset, &[value])
    }

    pub fn insert_u16(&mut self, packet_index: usize, offset: usize, value: u16) -> Result<(), BufferError> {
        self.write_bytes(packet_index, offset, &value.to_le_bytes())
    }

    pub fn insert_u32(&mut self, packet_index: usize, offset: usize, value: u32) -> Result<(), BufferError> {
        self.write_bytes(packet_index, offset, &value.to_le_bytes())
    }

    pub fn insert_u64(&mut self, packet_index: usize, offset: usize, value: u64) -> Result<(), BufferError> {
        self.write_bytes(packet_index, offset, &value.to_le_bytes())
    }

    pub fn read_f32(&self, packet_index: usize, offset: usize) -> Result<f32, BufferError> {
        let b = self.read_bytes(packet_index, offset, 4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u8(&self, packet_index: usize, offset: usize) -> Result<u8, BufferError> {
        Ok(self.read_bytes(packet_index, offset, 1)?[0])
    }

    pub fn read_u16(&self, packet_index: usize, offset: usize) -> Result<u16, BufferError> {
        let b = self.read_bytes(packet_index, offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, packet_index: usize, offset: usize) -> Result<u32, BufferError> {
        let b = self.read_bytes(packet_index, offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&self, packet_index: usize, offset: usize) -> Result<u64, BufferError> {
        let b = self.read_bytes(packet_index, offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Stamp `record_time` into every packet at the timestamp offset.
    pub fn set_record_time(&mut self, record_time: f64) -> Result<(), BufferError> {
        let stamp = (record_time as f32).to_le_bytes();
        let offset = self.spec.timestamp_byte_offset;
        for idx in 0..self.packets.len() {
            self.write_bytes(idx, offset, &stamp)?;
        }
        Ok(())
    }

    /// Hand the packets off for transport, in packet-index order.
    pub fn materialize(self) -> Vec<Bytes> {
        self.packets.into_iter().map(Bytes::from).collect()
    }

    /// All packets concatenated.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.packets.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_length_rounds_up_to_multiple_of_four() {
        assert_eq!(RecordSpec::new(1401, 10).packet_length, 1404);
        assert_eq!(RecordSpec::new(1400, 10).packet_length, 1400);
        assert_eq!(RecordSpec::new(1400, 10).record_len(), 14_000);
    }

    #[test]
    fn validate_rejects_bad_geometry() {
        assert_eq!(RecordSpec::new(0, 10).validate(), Err(SpecError::ZeroPacketLength));
        assert_eq!(RecordSpec::new(64, 0).validate(), Err(SpecError::ZeroPackets));
        assert!(matches!(
            RecordSpec::new(64, 2).with_timestamp(2, 0).validate(),
            Err(SpecError::TimestampPacket { .. })
        ));
        assert!(matches!(
            RecordSpec::new(24, 2).validate(),
            Err(SpecError::TimestampOffset { .. })
        ));
        assert!(matches!(
            RecordSpec::new(64, 2).with_timestamp(0, usize::MAX - 1).validate(),
            Err(SpecError::TimestampOffset { .. })
        ));
        assert!(RecordSpec::default().validate().is_ok());
    }

    #[test]
    fn inserts_are_little_endian() {
        let mut buf = RecordBuffer::new(RecordSpec::new(32, 2));
        buf.insert_u16(1, 0, 0x1234).unwrap();
        buf.insert_u32(1, 4, 0xDEADBEEF).unwrap();
        buf.insert_f32(0, 0, 1.5).unwrap();

        assert_eq!(buf.read_bytes(1, 0, 2).unwrap(), &[0x34, 0x12]);
        assert_eq!(buf.read_bytes(1, 4, 4).unwrap(), &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(buf.read_f32(0, 0).unwrap(), 1.5);
    }

    #[test]
    fn out_of_range_writes_fail_without_touching_the_packet() {
        let mut buf = RecordBuffer::new(RecordSpec::new(32, 2));
        buf.insert_u8(0, 27, 0xAA).unwrap();

        assert!(matches!(
            buf.insert_u64(0, 28, u64::MAX),
            Err(BufferError::OffsetOutOfRange { offset: 28, len: 8, packet_length: 32 })
        ));
        assert!(matches!(buf.insert_u8(2, 0, 1), Err(BufferError::PacketOutOfRange { .. })));
        assert!(buf.insert_u8(0, usize::MAX, 1).is_err());

        let mut expected = vec![0u8; 32];
        expected[27] = 0xAA;
        assert_eq!(buf.packet(0).unwrap(), expected.as_slice());
    }

    #[test]
    fn template_is_split_and_zero_padded() {
        let spec = RecordSpec::new(8, 3);
        let template: Vec<u8> = (1..=12).collect();
        let buf = RecordBuffer::from_template(spec, &template);

        assert_eq!(buf.packet(0).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buf.packet(1).unwrap(), &[9, 10, 11, 12, 0, 0, 0, 0]);
        assert_eq!(buf.packet(2).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn record_time_is_stamped_into_every_packet() {
        let spec = RecordSpec::new(32, 4).with_timestamp(0, 24);
        let mut buf = RecordBuffer::new(spec);
        buf.set_record_time(12.5).unwrap();

        for idx in 0..4 {
            assert_eq!(buf.read_f32(idx, 24).unwrap(), 12.5);
        }
        let packets = buf.materialize();
        assert_eq!(packets.len(), 4);
        assert!(packets.iter().all(|p| p.len() == 32));
    }
}
