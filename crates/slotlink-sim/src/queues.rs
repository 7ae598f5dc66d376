use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;
use tracing::warn;

use slotlink_core::net::interface::{PacketUnit, UserId, UserQueues};

use crate::packet::SimPacket;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub accepted_packets: u64,
    pub accepted_bytes: u64,
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
    pub queued_packets: usize,
    pub queued_bytes: usize,
}

#[derive(Debug)]
struct UserQueue {
    packets: VecDeque<(SimPacket, f64)>,
    bytes: usize,
    limit_bytes: usize,
    stats: QueueStats,
}

impl UserQueue {
    fn new(limit_bytes: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            bytes: 0,
            limit_bytes,
            stats: QueueStats::default(),
        }
    }
}

/// Per-user drop-tail FIFOs with a byte limit.
///
/// Cloning gives another handle to the same queues, so the traffic source,
/// the rate estimator and the scheduler can all see one backlog.
#[derive(Debug, Clone)]
pub struct SimQueues {
    inner: Rc<RefCell<Vec<UserQueue>>>,
}

impl SimQueues {
    pub fn new(limits_bytes: &[usize]) -> Self {
        Self {
            inner: Rc::new(RefCell::new(
                limits_bytes.iter().map(|&l| UserQueue::new(l)).collect(),
            )),
        }
    }

    /// Appends `packet` unless it would push the queue past its limit.
    pub fn enqueue(&self, user: UserId, packet: SimPacket, arrival: f64) -> bool {
        let mut queues = self.inner.borrow_mut();
        let Some(q) = queues.get_mut(user) else {
            warn!(user, "enqueue for unknown user");
            return false;
        };
        let size = packet.byte_size();
        if q.bytes + size > q.limit_bytes {
            q.stats.dropped_packets += 1;
            q.stats.dropped_bytes += size as u64;
            warn!(user, size, queued = q.bytes, limit = q.limit_bytes, "queue full, dropping packet");
            return false;
        }
        q.bytes += size;
        q.stats.accepted_packets += 1;
        q.stats.accepted_bytes += size as u64;
        q.packets.push_back((packet, arrival));
        true
    }

    pub fn stats(&self, user: UserId) -> QueueStats {
        let queues = self.inner.borrow();
        queues
            .get(user)
            .map(|q| QueueStats {
                queued_packets: q.packets.len(),
                queued_bytes: q.bytes,
                ..q.stats.clone()
            })
            .unwrap_or_default()
    }
}

impl UserQueues for SimQueues {
    type Unit = SimPacket;

    fn backlog_bytes(&self, user: UserId) -> usize {
        self.inner.borrow().get(user).map_or(0, |q| q.bytes)
    }

    fn head_of_line_arrival(&self, user: UserId) -> f64 {
        self.inner
            .borrow()
            .get(user)
            .and_then(|q| q.packets.front())
            .map_or(0.0, |(_, t)| *t)
    }

    fn dequeue(&mut self, user: UserId) -> Option<SimPacket> {
        let mut queues = self.inner.borrow_mut();
        let q = queues.get_mut(user)?;
        let (packet, _) = q.packets.pop_front()?;
        q.bytes -= packet.byte_size();
        Some(packet)
    }

    fn peek_head(&self, user: UserId) -> Option<SimPacket> {
        self.inner
            .borrow()
            .get(user)
            .and_then(|q| q.packets.front())
            .map(|(p, _)| p.clone())
    }
}
