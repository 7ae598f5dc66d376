use slotlink_core::net::interface::{Clock, LinkLayer, PacketUnit, UserId};
use tracing::warn;

use crate::calendar::SimClock;
use crate::channel::SharedTrace;
use crate::packet::SimPacket;
use crate::reassembly::Reassembler;

/// Per-user downlinks running at the channel's true current capacity.
///
/// Delivery is immediate: the scheduler already paces sends by their
/// transmission time. Each user's fragments go to its own [`Reassembler`].
pub struct SimLinks {
    trace: SharedTrace,
    clock: SimClock,
    receivers: Vec<Reassembler>,
}

impl SimLinks {
    pub fn new(num_users: usize, trace: SharedTrace, clock: SimClock) -> Self {
        Self {
            trace,
            clock,
            receivers: (0..num_users).map(|_| Reassembler::new()).collect(),
        }
    }

    pub fn receiver(&self, user: UserId) -> Option<&Reassembler> {
        self.receivers.get(user)
    }
}

impl LinkLayer for SimLinks {
    type Unit = SimPacket;

    fn bandwidth(&self, user: UserId) -> f64 {
        self.trace.borrow().current(user)
    }

    fn transmission_time(&self, user: UserId, unit: &SimPacket) -> f64 {
        let bandwidth = self.bandwidth(user);
        if bandwidth <= 0.0 {
            return f64::INFINITY;
        }
        unit.byte_size() as f64 * 8.0 / bandwidth
    }

    fn deliver(&mut self, user: UserId, unit: SimPacket) {
        let now = self.clock.now();
        match self.receivers.get_mut(user) {
            Some(rx) => rx.push(&unit, now),
            None => warn!(user, "delivery to unknown user dropped"),
        }
    }
}
