/// Index of a user, `0..num_users`.
pub type UserId = usize;

/// A payload the scheduler can size, split and forward.
///
/// The scheduler never looks inside a unit. Splitting consumes the unit and
/// returns the first `prefix_bytes` bytes plus a remainder that carries the
/// original packet's metadata forward; the two must add up to the original
/// size exactly.
pub trait PacketUnit: Clone {
    /// Size of this unit in bytes.
    fn byte_size(&self) -> usize;
    /// Splits off the first `prefix_bytes` bytes. `prefix_bytes` is always
    /// strictly less than `byte_size()` when called by the scheduler.
    fn split(self, prefix_bytes: usize) -> (Self, Self);
}

/// Virtual time source, in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Lifecycle of a one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerStatus {
    #[default]
    Idle,
    Pending,
    /// The host is currently running this timer's callback.
    Firing,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Idle => "idle",
            TimerStatus::Pending => "pending",
            TimerStatus::Firing => "firing",
        }
    }
}

/// A one-shot timer owned by the host's event loop.
///
/// `schedule` replaces any pending expiry. After `cancel` the timer must not
/// deliver its old expiry; if the host still does, the scheduler sees a
/// status other than [`TimerStatus::Firing`] and ignores it.
pub trait Timer {
    fn schedule(&mut self, delay_s: f64);
    fn cancel(&mut self);
    fn status(&self) -> TimerStatus;
}

/// Per-user channel-rate estimation.
///
/// Results of `instantaneous_rate` and `feasible_users` are treated as a
/// snapshot between two `refresh_all` calls.
pub trait RateEstimator {
    fn refresh_all(&mut self);
    /// Current feasible rate for `user` in bits per second, `0.0` if the
    /// user cannot be served right now.
    fn instantaneous_rate(&self, user: UserId) -> f64;
    /// Users the estimator considers schedulable, in any order.
    fn feasible_users(&self) -> Vec<UserId>;
}

/// Per-user packet queues. Backlog accounting is owned by the implementor.
pub trait UserQueues {
    type Unit: PacketUnit;

    fn backlog_bytes(&self, user: UserId) -> usize;
    /// Arrival time of the current head-of-line packet. Only meaningful
    /// while the queue is non-empty.
    fn head_of_line_arrival(&self, user: UserId) -> f64;
    fn dequeue(&mut self, user: UserId) -> Option<Self::Unit>;
    /// A copy of the head-of-line unit, left in place.
    fn peek_head(&self, user: UserId) -> Option<Self::Unit>;
}

/// Per-user downlink.
pub trait LinkLayer {
    type Unit: PacketUnit;

    /// Link bandwidth in bits per second. `0.0` means the link is down.
    fn bandwidth(&self, user: UserId) -> f64;
    /// Seconds needed to put `unit` on the wire for `user`.
    fn transmission_time(&self, user: UserId, unit: &Self::Unit) -> f64;
    /// Hands `unit` to `user`'s link for delivery.
    fn deliver(&mut self, user: UserId, unit: Self::Unit);
}

/// Binds together the concrete collaborator types a scheduler runs against.
pub trait Environment {
    type Unit: PacketUnit;
    type Clock: Clock;
    type Timer: Timer;
    type Estimator: RateEstimator;
    type Queues: UserQueues<Unit = Self::Unit>;
    type Links: LinkLayer<Unit = Self::Unit>;
}

/// Owned collaborator instances injected into a scheduler.
pub struct Collaborators<E: Environment> {
    pub clock: E::Clock,
    pub estimator: E::Estimator,
    pub queues: E::Queues,
    pub links: E::Links,
    pub slot_timer: E::Timer,
    pub tx_timer: E::Timer,
}
