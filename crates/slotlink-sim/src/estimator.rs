use tracing::trace;

use slotlink_core::net::interface::{Clock, RateEstimator, UserId, UserQueues};

use crate::calendar::SimClock;
use crate::channel::SharedTrace;
use crate::queues::SimQueues;

/// Channel feedback that lags the true channel by a fixed delay.
///
/// Each refresh reads every user's capacity as it was `feedback_delay`
/// seconds ago. A user is feasible when that rate is non-zero and its queue
/// holds at least one byte.
pub struct DelayedEstimator {
    trace: SharedTrace,
    queues: SimQueues,
    clock: SimClock,
    feedback_delay: f64,
    rates: Vec<f64>,
    feasible: Vec<UserId>,
}

impl DelayedEstimator {
    pub fn new(
        num_users: usize,
        feedback_delay: f64,
        trace: SharedTrace,
        queues: SimQueues,
        clock: SimClock,
    ) -> Self {
        Self {
            trace,
            queues,
            clock,
            feedback_delay,
            rates: vec![0.0; num_users],
            feasible: Vec::with_capacity(num_users),
        }
    }
}

impl RateEstimator for DelayedEstimator {
    fn refresh_all(&mut self) {
        let seen_at = self.clock.now() - self.feedback_delay;
        let trace = self.trace.borrow();
        self.feasible.clear();
        for (user, rate) in self.rates.iter_mut().enumerate() {
            *rate = trace.as_of(user, seen_at);
            if *rate > 0.0 && self.queues.backlog_bytes(user) > 0 {
                self.feasible.push(user);
            }
        }
        trace!(seen_at, feasible = self.feasible.len(), "rates refreshed");
    }

    fn instantaneous_rate(&self, user: UserId) -> f64 {
        self.rates.get(user).copied().unwrap_or(0.0)
    }

    fn feasible_users(&self) -> Vec<UserId> {
        self.feasible.clone()
    }
}
