use std::collections::VecDeque;

use crate::net::interface::{
    Clock, Environment, LinkLayer, PacketUnit, RateEstimator, Timer, TimerStatus, UserId,
    UserQueues,
};

/// A byte range `[offset, offset + len)` of packet `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: u64,
    pub offset: usize,
    pub len: usize,
}

impl Chunk {
    pub fn new(id: u64, len: usize) -> Self {
        Self { id, offset: 0, len }
    }
}

impl PacketUnit for Chunk {
    fn byte_size(&self) -> usize {
        self.len
    }

    fn split(self, prefix_bytes: usize) -> (Self, Self) {
        let prefix = Chunk {
            id: self.id,
            offset: self.offset,
            len: prefix_bytes,
        };
        let rest = Chunk {
            id: self.id,
            offset: self.offset + prefix_bytes,
            len: self.len - prefix_bytes,
        };
        (prefix, rest)
    }
}

pub struct MockQueues {
    queues: Vec<VecDeque<(Chunk, f64)>>,
}

impl MockQueues {
    pub fn new(num_users: usize) -> Self {
        Self {
            queues: (0..num_users).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn push(&mut self, user: UserId, chunk: Chunk, arrival: f64) {
        self.queues[user].push_back((chunk, arrival));
    }

    pub fn len(&self, user: UserId) -> usize {
        self.queues[user].len()
    }
}

impl UserQueues for MockQueues {
    type Unit = Chunk;

    fn backlog_bytes(&self, user: UserId) -> usize {
        self.queues[user].iter().map(|(c, _)| c.len).sum()
    }

    fn head_of_line_arrival(&self, user: UserId) -> f64 {
        self.queues[user].front().map_or(0.0, |(_, t)| *t)
    }

    fn dequeue(&mut self, user: UserId) -> Option<Chunk> {
        self.queues[user].pop_front().map(|(c, _)| c)
    }

    fn peek_head(&self, user: UserId) -> Option<Chunk> {
        self.queues[user].front().map(|(c, _)| c.clone())
    }
}

pub struct MockLinks {
    pub bandwidth: Vec<f64>,
    delivered: Vec<Vec<Chunk>>,
}

impl MockLinks {
    pub fn new(bandwidth: &[f64]) -> Self {
        Self {
            bandwidth: bandwidth.to_vec(),
            delivered: bandwidth.iter().map(|_| Vec::new()).collect(),
        }
    }

    pub fn delivered(&self, user: UserId) -> &[Chunk] {
        &self.delivered[user]
    }
}

impl LinkLayer for MockLinks {
    type Unit = Chunk;

    fn bandwidth(&self, user: UserId) -> f64 {
        self.bandwidth[user]
    }

    fn transmission_time(&self, user: UserId, unit: &Chunk) -> f64 {
        unit.len as f64 * 8.0 / self.bandwidth[user]
    }

    fn deliver(&mut self, user: UserId, unit: Chunk) {
        self.delivered[user].push(unit);
    }
}

#[derive(Default)]
pub struct MockEstimator {
    pub rates: Vec<f64>,
    pub feasible: Vec<UserId>,
    pub refreshes: u32,
}

impl RateEstimator for MockEstimator {
    fn refresh_all(&mut self) {
        self.refreshes += 1;
    }

    fn instantaneous_rate(&self, user: UserId) -> f64 {
        self.rates.get(user).copied().unwrap_or(0.0)
    }

    fn feasible_users(&self) -> Vec<UserId> {
        self.feasible.clone()
    }
}

#[derive(Default)]
pub struct MockClock {
    pub now: f64,
}

impl Clock for MockClock {
    fn now(&self) -> f64 {
        self.now
    }
}

/// Records what the scheduler asked of it; tests drive firing by hand.
#[derive(Debug, Default)]
pub struct MockTimer {
    pub status: TimerStatus,
    pub delay: Option<f64>,
    pub schedules: u32,
    pub cancels: u32,
}

impl MockTimer {
    /// Marks a pending timer as firing, as a host does before the callback.
    pub fn fire(&mut self) {
        assert_eq!(self.status, TimerStatus::Pending, "firing a timer that is not pending");
        self.status = TimerStatus::Firing;
    }

    /// Ends a callback: a timer not re-armed inside it goes idle.
    pub fn finish(&mut self) {
        if self.status == TimerStatus::Firing {
            self.status = TimerStatus::Idle;
            self.delay = None;
        }
    }
}

impl Timer for MockTimer {
    fn schedule(&mut self, delay_s: f64) {
        self.status = TimerStatus::Pending;
        self.delay = Some(delay_s);
        self.schedules += 1;
    }

    fn cancel(&mut self) {
        if self.status != TimerStatus::Idle {
            self.cancels += 1;
        }
        self.status = TimerStatus::Idle;
        self.delay = None;
    }

    fn status(&self) -> TimerStatus {
        self.status
    }
}

pub struct MockEnv;

impl Environment for MockEnv {
    type Unit = Chunk;
    type Clock = MockClock;
    type Timer = MockTimer;
    type Estimator = MockEstimator;
    type Queues = MockQueues;
    type Links = MockLinks;
}
