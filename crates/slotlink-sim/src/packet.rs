use bytes::Bytes;

use slotlink_core::net::interface::PacketUnit;

/// A packet, or a byte range of one, travelling through the simulated
/// downlink.
///
/// Splitting keeps `packet_id`, `original_len` and `arrival` on both halves
/// and advances `offset` on the remainder, so the receiver can check where
/// each fragment belongs.
#[derive(Debug, Clone, PartialEq)]
pub struct SimPacket {
    pub packet_id: u64,
    /// Position of `payload[0]` within the original packet.
    pub offset: usize,
    pub original_len: usize,
    /// Time the original packet entered its queue.
    pub arrival: f64,
    pub payload: Bytes,
}

impl SimPacket {
    /// Builds a packet whose payload follows [`pattern_byte`].
    pub fn generate(packet_id: u64, len: usize, arrival: f64) -> Self {
        let payload: Vec<u8> = (0..len).map(|i| pattern_byte(packet_id, i)).collect();
        Self {
            packet_id,
            offset: 0,
            original_len: len,
            arrival,
            payload: Bytes::from(payload),
        }
    }

    /// True if this fragment ends the original packet.
    pub fn is_last(&self) -> bool {
        self.offset + self.payload.len() == self.original_len
    }
}

/// Expected byte at `index` of packet `packet_id`.
pub fn pattern_byte(packet_id: u64, index: usize) -> u8 {
    (packet_id.wrapping_mul(31).wrapping_add(index as u64) % 251) as u8
}

impl PacketUnit for SimPacket {
    fn byte_size(&self) -> usize {
        self.payload.len()
    }

    fn split(mut self, prefix_bytes: usize) -> (Self, Self) {
        let head = self.payload.split_to(prefix_bytes);
        let prefix = SimPacket {
            packet_id: self.packet_id,
            offset: self.offset,
            original_len: self.original_len,
            arrival: self.arrival,
            payload: head,
        };
        self.offset += prefix_bytes;
        (prefix, self)
    }
}
