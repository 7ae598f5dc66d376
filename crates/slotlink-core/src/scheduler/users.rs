use crate::net::interface::UserId;
use crate::scheduler::abeyance::Abeyant;
use crate::scheduler::ewma::DelayEwma;

/// Everything the scheduler owns about one user.
///
/// Rate history, the abeyant fragment, the head-of-line timestamp and the
/// delay estimate live together so they cannot drift out of step.
#[derive(Debug, Clone)]
pub struct UserRecord<P> {
    pub(crate) mean_achieved_rate: f64,
    pub(crate) abeyant: Option<Abeyant<P>>,
    pub(crate) hol_ts: f64,
    pub(crate) delay: DelayEwma,
    pub(crate) counters: UserCounters,
}

/// Monotonic per-user activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounters {
    /// Slots in which this user was the selected user.
    pub slots_won: u64,
    /// Units fully transmitted (whole packets or final fragments).
    pub units_sent: u64,
    /// Transmissions cut short at a slot boundary.
    pub slices: u64,
    pub bytes_dispatched: u64,
}

impl<P> UserRecord<P> {
    fn new(delay_time_constant: f64) -> Self {
        Self {
            mean_achieved_rate: 0.0,
            abeyant: None,
            hol_ts: 0.0,
            delay: DelayEwma::new(delay_time_constant),
            counters: UserCounters::default(),
        }
    }

    pub fn mean_achieved_rate(&self) -> f64 {
        self.mean_achieved_rate
    }

    pub fn head_of_line_timestamp(&self) -> f64 {
        self.hol_ts
    }

    pub fn abeyant(&self) -> Option<&Abeyant<P>> {
        self.abeyant.as_ref()
    }

    /// Smoothed queueing-plus-transmission delay of completed units.
    pub fn delay_estimate(&self) -> f64 {
        self.delay.value()
    }

    pub fn delay_samples(&self) -> u64 {
        self.delay.samples()
    }

    pub fn counters(&self) -> UserCounters {
        self.counters
    }
}

/// Fixed-size, bounds-checked table of [`UserRecord`]s, one per user.
#[derive(Debug, Clone)]
pub struct UserTable<P> {
    records: Box<[UserRecord<P>]>,
}

impl<P> UserTable<P> {
    pub fn new(num_users: usize, delay_time_constant: f64) -> Self {
        Self {
            records: (0..num_users)
                .map(|_| UserRecord::new(delay_time_constant))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, user: UserId) -> bool {
        user < self.records.len()
    }

    pub fn get(&self, user: UserId) -> Option<&UserRecord<P>> {
        self.records.get(user)
    }

    pub(crate) fn get_mut(&mut self, user: UserId) -> Option<&mut UserRecord<P>> {
        self.records.get_mut(user)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, &UserRecord<P>)> {
        self.records.iter().enumerate()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (UserId, &mut UserRecord<P>)> {
        self.records.iter_mut().enumerate()
    }

    pub fn mean_achieved_rate(&self, user: UserId) -> Option<f64> {
        self.get(user).map(|r| r.mean_achieved_rate)
    }
}
