//! # Slot scheduler loop
//!
//! Drives the other components from two host timers:
//!
//! ```text
//!            slot timer                     completion timer
//!                │                                 │
//!   Idle ──► Ticking ──► Selecting ──► Sending ◄───┘
//!    ▲                                   │
//!    └───────────────────────────────────┘
//! ```
//!
//! A slot tick starts a new slot at the current time, cancels any pending
//! completion timer, refreshes the rate estimates, picks a user, updates the
//! rate history and sends one unit. After a whole unit goes out the
//! completion timer is armed for its transmission time and the same user is
//! served again when it fires. A slice ends the slot's sending. An empty
//! queue or a dead link re-arms the slot timer with zero delay so the slot
//! is re-evaluated at once; a second fruitless retry at the same instant
//! waits for the slot boundary instead, which keeps a discrete-event host
//! from spinning forever at one timestamp.

use tracing::{debug, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::error::ConfigError;
use crate::net::interface::{
    Clock, Collaborators, Environment, PacketUnit, RateEstimator, Timer, TimerStatus, UserId,
    UserQueues,
};
use crate::scheduler::rate_history::RateHistory;
use crate::scheduler::selector::{collect_candidates, UserSelector};
use crate::scheduler::slicer::{SendOutcome, TransmissionSlicer};
use crate::scheduler::slot::SlotClock;
use crate::scheduler::users::UserTable;
use crate::stats::{SchedulerStatsSnapshot, UserStatsSnapshot};

/// Where the loop is in its per-slot cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Ticking,
    Selecting,
    Sending,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Ticking => "ticking",
            LoopState::Selecting => "selecting",
            LoopState::Sending => "sending",
        }
    }
}

/// Scheduler-wide event counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopCounters {
    pub ticks: u64,
    /// Ticks in which no user was selected.
    pub idle_ticks: u64,
    pub link_down: u64,
    pub empty: u64,
    pub zero_delay_retries: u64,
    /// Timer callbacks ignored because the timer was not firing.
    pub stale_firings: u64,
}

pub struct SlotScheduler<E: Environment> {
    config: SchedulerConfig,
    slot: SlotClock,
    users: UserTable<E::Unit>,
    history: RateHistory,
    selector: UserSelector,
    parts: Collaborators<E>,
    rates: Vec<f64>,
    chosen: Option<UserId>,
    state: LoopState,
    activated: bool,
    shut_down: bool,
    last_zero_retry_at: Option<f64>,
    counters: LoopCounters,
}

impl<E: Environment> SlotScheduler<E> {
    /// Builds an inactive scheduler. Nothing happens until [`activate`].
    ///
    /// [`activate`]: SlotScheduler::activate
    pub fn new(config: SchedulerConfig, parts: Collaborators<E>) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            num_users = config.num_users,
            slot_duration = config.slot_duration,
            ewma_window = config.ewma_window,
            alpha = config.alpha,
            rule = %config.selection_rule,
            "slot scheduler created"
        );
        Ok(Self {
            slot: SlotClock::new(config.slot_duration),
            users: UserTable::new(config.num_users, config.delay_time_constant),
            history: RateHistory::new(config.ewma_window),
            selector: UserSelector::new(config.selection_rule, config.alpha),
            rates: vec![0.0; config.num_users],
            parts,
            config,
            chosen: None,
            state: LoopState::Idle,
            activated: false,
            shut_down: false,
            last_zero_retry_at: None,
            counters: LoopCounters::default(),
        })
    }

    /// Arms the first slot timer and runs a priming tick.
    pub fn activate(&mut self) {
        if self.shut_down {
            warn!("activate after shutdown ignored");
            return;
        }
        if self.activated {
            warn!("scheduler already active");
            return;
        }
        self.activated = true;
        info!(now = self.parts.clock.now(), "link scheduler activated");
        self.parts.slot_timer.schedule(self.config.slot_duration);
        self.parts.estimator.refresh_all();
        self.tick();
    }

    /// Host callback for the slot timer.
    pub fn on_slot_timer(&mut self) {
        if !self.accepts_firing(self.parts.slot_timer.status()) {
            return;
        }
        self.parts.slot_timer.schedule(self.config.slot_duration);
        self.tick();
    }

    /// Host callback for the transmission-completion timer.
    pub fn on_tx_timer(&mut self) {
        if !self.accepts_firing(self.parts.tx_timer.status()) {
            return;
        }
        self.transmit();
    }

    /// Cancels both timers. Later callbacks are no-ops.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.parts.slot_timer.cancel();
        self.parts.tx_timer.cancel();
        self.shut_down = true;
        self.state = LoopState::Idle;
        info!(ticks = self.counters.ticks, "link scheduler shut down");
    }

    fn accepts_firing(&mut self, status: TimerStatus) -> bool {
        if self.shut_down || !self.activated || status != TimerStatus::Firing {
            self.counters.stale_firings += 1;
            trace!(status = status.as_str(), "ignoring stale timer firing");
            return false;
        }
        true
    }

    fn tick(&mut self) {
        self.state = LoopState::Ticking;
        let now = self.parts.clock.now();
        self.slot.advance(now);
        self.counters.ticks += 1;

        if matches!(
            self.parts.tx_timer.status(),
            TimerStatus::Pending | TimerStatus::Firing
        ) {
            self.parts.tx_timer.cancel();
        }

        self.parts.estimator.refresh_all();
        for (user, rate) in self.rates.iter_mut().enumerate() {
            *rate = self.parts.estimator.instantaneous_rate(user);
        }

        self.state = LoopState::Selecting;
        let feasible = self.parts.estimator.feasible_users();
        let queues = &self.parts.queues;
        let candidates =
            collect_candidates(&feasible, &self.users, &self.rates, |u| queues.backlog_bytes(u));
        self.chosen = self.selector.pick(&candidates);
        self.history.update(&mut self.users, self.chosen, &self.rates);

        match self.chosen {
            Some(user) => {
                if let Some(rec) = self.users.get_mut(user) {
                    rec.counters.slots_won += 1;
                }
                debug!(
                    now,
                    user,
                    candidates = candidates.len(),
                    rate = self.rates[user],
                    "user selected"
                );
            }
            None => {
                self.counters.idle_ticks += 1;
                trace!(now, "no candidate this tick");
            }
        }

        self.transmit();
    }

    fn transmit(&mut self) {
        self.state = LoopState::Sending;
        let now = self.parts.clock.now();
        let outcome = TransmissionSlicer::send_one(
            &mut self.users,
            &self.slot,
            &mut self.parts.queues,
            &mut self.parts.links,
            self.chosen,
            now,
        );

        match outcome {
            SendOutcome::Sent { tx_time, .. } => {
                self.last_zero_retry_at = None;
                self.parts.tx_timer.schedule(tx_time);
            }
            SendOutcome::Sliced { .. } => {
                self.last_zero_retry_at = None;
            }
            SendOutcome::NoUser => {}
            SendOutcome::Empty | SendOutcome::LinkDown => {
                if outcome == SendOutcome::LinkDown {
                    self.counters.link_down += 1;
                } else {
                    self.counters.empty += 1;
                }
                if self.last_zero_retry_at == Some(now) {
                    trace!(now, outcome = outcome.as_str(), "retry already spent, waiting for slot end");
                } else {
                    self.last_zero_retry_at = Some(now);
                    self.counters.zero_delay_retries += 1;
                    self.parts.slot_timer.schedule(0.0);
                }
            }
        }
        self.state = LoopState::Idle;
    }

    /// Estimated delay the head-of-line unit of `user` would see if it were
    /// sent now: time already queued plus its transmission time at the
    /// current rate estimate. `None` if there is nothing to send or the
    /// estimate is zero.
    pub fn hol_delay(&self, user: UserId) -> Option<f64> {
        let rate = self.parts.estimator.instantaneous_rate(user);
        if rate <= 0.0 {
            return None;
        }
        let (hol_arrival, bytes) = match self.users.abeyant(user) {
            Some(fragment) => (fragment.hol_arrival, fragment.byte_size()),
            None => {
                let head = self.parts.queues.peek_head(user)?;
                (self.parts.queues.head_of_line_arrival(user), head.byte_size())
            }
        };
        let delay = self.parts.clock.now() - hol_arrival + 8.0 * bytes as f64 / rate;
        assert!(delay > 0.0, "non-positive head-of-line delay {delay} for user {user}");
        Some(delay)
    }

    pub fn stats_snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            now: self.parts.clock.now(),
            rule: self.config.selection_rule.as_str().to_string(),
            slot_start: self.slot.start(),
            ticks: self.counters.ticks,
            idle_ticks: self.counters.idle_ticks,
            link_down: self.counters.link_down,
            empty: self.counters.empty,
            zero_delay_retries: self.counters.zero_delay_retries,
            chosen_user: self.chosen,
            users: self
                .users
                .iter()
                .map(|(id, rec)| UserStatsSnapshot::from_record(id, rec, self.users.abeyant_bytes(id)))
                .collect(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn users(&self) -> &UserTable<E::Unit> {
        &self.users
    }

    pub fn slot(&self) -> &SlotClock {
        &self.slot
    }

    /// User chosen at the most recent tick.
    pub fn chosen_user(&self) -> Option<UserId> {
        self.chosen
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn counters(&self) -> LoopCounters {
        self.counters
    }

    pub fn is_active(&self) -> bool {
        self.activated && !self.shut_down
    }

    pub fn collaborators(&self) -> &Collaborators<E> {
        &self.parts
    }

    pub fn collaborators_mut(&mut self) -> &mut Collaborators<E> {
        &mut self.parts
    }
}
