use serde::Serialize;
use tracing::warn;

use crate::packet::{pattern_byte, SimPacket};

/// Receiver-side statistics for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReassemblyStats {
    pub fragments: u64,
    pub completed_packets: u64,
    pub completed_bytes: u64,
    /// Bytes received so far of the packet still being reassembled.
    pub partial_bytes: usize,
    /// Fragments that did not continue the expected byte stream.
    pub out_of_order: u64,
    /// Fragments whose payload did not match the generated pattern.
    pub corrupted: u64,
    pub mean_delay: f64,
    pub max_delay: f64,
}

impl ReassemblyStats {
    pub fn errors(&self) -> u64 {
        self.out_of_order + self.corrupted
    }
}

#[derive(Debug, Clone, Copy)]
struct Partial {
    packet_id: u64,
    next_offset: usize,
}

/// Rebuilds packets from the fragments a user's link delivers.
///
/// Fragments must arrive in order: the next fragment either continues the
/// current packet at exactly the next byte, or starts a later packet at
/// offset zero once the current one is complete. Anything else is counted
/// and dropped.
#[derive(Debug, Default)]
pub struct Reassembler {
    current: Option<Partial>,
    last_completed: Option<u64>,
    delay_sum: f64,
    stats: ReassemblyStats,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frag: &SimPacket, now: f64) {
        self.stats.fragments += 1;

        let corrupt = frag
            .payload
            .iter()
            .enumerate()
            .any(|(i, b)| *b != pattern_byte(frag.packet_id, frag.offset + i));
        if corrupt {
            self.stats.corrupted += 1;
            warn!(packet = frag.packet_id, offset = frag.offset, "corrupted fragment");
        }

        let next_offset = match self.current {
            Some(p) if p.packet_id == frag.packet_id && p.next_offset == frag.offset => {
                p.next_offset
            }
            None if frag.offset == 0 && self.last_completed.is_none_or(|id| frag.packet_id > id) => 0,
            _ => {
                self.stats.out_of_order += 1;
                warn!(
                    packet = frag.packet_id,
                    offset = frag.offset,
                    expected = ?self.current.map(|p| (p.packet_id, p.next_offset)),
                    "fragment out of order"
                );
                return;
            }
        };

        let received = next_offset + frag.payload.len();
        if received < frag.original_len {
            self.current = Some(Partial {
                packet_id: frag.packet_id,
                next_offset: received,
            });
            self.stats.partial_bytes = received;
            return;
        }

        self.current = None;
        self.stats.partial_bytes = 0;
        self.last_completed = Some(frag.packet_id);
        self.stats.completed_packets += 1;
        self.stats.completed_bytes += frag.original_len as u64;
        let delay = now - frag.arrival;
        self.delay_sum += delay;
        self.stats.max_delay = self.stats.max_delay.max(delay);
        self.stats.mean_delay = self.delay_sum / self.stats.completed_packets as f64;
    }

    pub fn stats(&self) -> &ReassemblyStats {
        &self.stats
    }
}
