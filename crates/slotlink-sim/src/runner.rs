//! Wires the scheduler to the simulated collaborators and drives the event
//! loop.

use anyhow::Result;
use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, trace};

use slotlink_core::net::interface::{Collaborators, Environment, UserId};
use slotlink_core::scheduler::SlotScheduler;
use slotlink_core::stats::{jain_index, SchedulerStatsSnapshot};

use crate::calendar::{EventCalendar, EventKind, SharedCalendar, SimClock, SimTimer, TimerId};
use crate::channel::{CapacityWalk, ChannelTrace, SharedTrace};
use crate::estimator::DelayedEstimator;
use crate::links::SimLinks;
use crate::packet::SimPacket;
use crate::queues::{QueueStats, SimQueues};
use crate::reassembly::ReassemblyStats;
use crate::scenario::ScenarioConfig;

/// Collaborator types of a simulated scheduler.
pub struct SimEnv;

impl Environment for SimEnv {
    type Unit = SimPacket;
    type Clock = SimClock;
    type Timer = SimTimer;
    type Estimator = DelayedEstimator;
    type Queues = SimQueues;
    type Links = SimLinks;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounters {
    pub processed: u64,
    pub arrivals: u64,
    pub channel_steps: u64,
    pub timer_firings: u64,
    /// Timer events dropped because the timer was re-armed or cancelled.
    pub stale_timers: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub user: UserId,
    pub queue: QueueStats,
    pub abeyant_bytes: usize,
    /// Bytes that reached the receiver, divided by elapsed time.
    pub throughput_bps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hol_delay: Option<f64>,
    pub reassembly: ReassemblyStats,
}

impl UserReport {
    pub fn delivered_bytes(&self) -> u64 {
        self.reassembly.completed_bytes + self.reassembly.partial_bytes as u64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub elapsed: f64,
    pub rule: String,
    pub events: EventCounters,
    /// Jain's index over per-user throughput.
    pub throughput_fairness: f64,
    pub users: Vec<UserReport>,
    pub scheduler: SchedulerStatsSnapshot,
}

impl SimulationReport {
    pub fn total_throughput_bps(&self) -> f64 {
        self.users.iter().map(|u| u.throughput_bps).sum()
    }

    pub fn reassembly_errors(&self) -> u64 {
        self.users.iter().map(|u| u.reassembly.errors()).sum()
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

struct TrafficSource {
    rate_pps: f64,
    packet_bytes: usize,
}

/// A scheduler running against simulated queues, channel and links.
pub struct Simulation {
    seed: u64,
    channel_step: f64,
    calendar: SharedCalendar,
    trace: SharedTrace,
    queues: SimQueues,
    walk: CapacityWalk,
    sources: Vec<TrafficSource>,
    arrival_rng: StdRng,
    next_packet_id: u64,
    scheduler: SlotScheduler<SimEnv>,
    counters: EventCounters,
    started: bool,
}

impl Simulation {
    pub fn new(scenario: &ScenarioConfig) -> Result<Self> {
        let config = scenario.resolve()?;
        let num_users = config.num_users;

        let calendar = EventCalendar::shared();
        let clock = SimClock::new(calendar.clone());
        let trace = ChannelTrace::shared(num_users, config.feedback_delay);
        let limits: Vec<usize> = scenario.users.iter().map(|u| u.queue_limit_bytes).collect();
        let queues = SimQueues::new(&limits);

        let parts = Collaborators::<SimEnv> {
            clock: clock.clone(),
            estimator: DelayedEstimator::new(
                num_users,
                config.feedback_delay,
                trace.clone(),
                queues.clone(),
                clock.clone(),
            ),
            queues: queues.clone(),
            links: SimLinks::new(num_users, trace.clone(), clock),
            slot_timer: SimTimer::new(TimerId::Slot, calendar.clone()),
            tx_timer: SimTimer::new(TimerId::Tx, calendar.clone()),
        };
        let scheduler = SlotScheduler::new(config, parts)?;

        let walk = CapacityWalk::new(
            scenario.seed,
            scenario.users.iter().map(|u| u.channel.clone()).collect(),
        );
        let sources = scenario
            .users
            .iter()
            .map(|u| TrafficSource {
                rate_pps: u.arrival_rate_pps,
                packet_bytes: u.packet_bytes,
            })
            .collect();

        Ok(Self {
            seed: scenario.seed,
            channel_step: scenario.channel_step,
            calendar,
            trace,
            queues,
            walk,
            sources,
            arrival_rng: StdRng::seed_from_u64(scenario.seed.wrapping_add(0x9e37_79b9_7f4a_7c15)),
            next_packet_id: 0,
            scheduler,
            counters: EventCounters::default(),
            started: false,
        })
    }

    pub fn now(&self) -> f64 {
        self.calendar.borrow().now()
    }

    pub fn scheduler(&self) -> &SlotScheduler<SimEnv> {
        &self.scheduler
    }

    pub fn queues(&self) -> &SimQueues {
        &self.queues
    }

    pub fn counters(&self) -> EventCounters {
        self.counters
    }

    /// Processes every event due up to `until` and reports the state there.
    /// Can be called repeatedly with increasing horizons.
    pub fn run(&mut self, until: f64) -> SimulationReport {
        if !self.started {
            self.start();
        }
        loop {
            let next = self.calendar.borrow_mut().pop_until(until);
            let Some(event) = next else {
                break;
            };
            self.counters.processed += 1;
            self.dispatch(event.kind);
        }
        self.calendar.borrow_mut().advance_to(until);

        let report = self.report();
        info!(
            now = report.elapsed,
            events = report.events.processed,
            throughput_bps = report.total_throughput_bps(),
            fairness = report.throughput_fairness,
            "simulation advanced"
        );
        report
    }

    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
    }

    fn start(&mut self) {
        self.started = true;
        let now = self.now();
        self.trace.borrow_mut().record(now, self.walk.capacities());
        self.calendar
            .borrow_mut()
            .push(now + self.channel_step, EventKind::ChannelStep);
        for user in 0..self.sources.len() {
            self.schedule_arrival(user);
        }
        info!(seed = self.seed, users = self.sources.len(), "simulation started");
        self.scheduler.activate();
    }

    fn dispatch(&mut self, kind: EventKind) {
        let now = self.now();
        match kind {
            EventKind::Timer { id, generation } => {
                if !self.calendar.borrow_mut().begin_firing(id, generation) {
                    self.counters.stale_timers += 1;
                    trace!(now, timer = id.as_str(), generation, "stale timer event");
                    return;
                }
                self.counters.timer_firings += 1;
                match id {
                    TimerId::Slot => self.scheduler.on_slot_timer(),
                    TimerId::Tx => self.scheduler.on_tx_timer(),
                }
                self.calendar.borrow_mut().end_firing(id);
            }
            EventKind::Arrival(user) => {
                self.counters.arrivals += 1;
                let id = self.next_packet_id;
                self.next_packet_id += 1;
                let packet = SimPacket::generate(id, self.sources[user].packet_bytes, now);
                self.queues.enqueue(user, packet, now);
                self.schedule_arrival(user);
            }
            EventKind::ChannelStep => {
                self.counters.channel_steps += 1;
                let capacities = self.walk.step();
                debug!(now, ?capacities, "channel step");
                self.trace.borrow_mut().record(now, capacities);
                self.calendar
                    .borrow_mut()
                    .push(now + self.channel_step, EventKind::ChannelStep);
            }
        }
    }

    fn schedule_arrival(&mut self, user: UserId) {
        let rate = self.sources[user].rate_pps;
        if rate <= 0.0 {
            return;
        }
        let u = self.arrival_rng.random::<f64>();
        let gap = -(1.0 - u).ln() / rate;
        let mut calendar = self.calendar.borrow_mut();
        let at = calendar.now() + gap;
        calendar.push(at, EventKind::Arrival(user));
    }

    pub fn report(&self) -> SimulationReport {
        let elapsed = self.now();
        let snapshot = self.scheduler.stats_snapshot();
        let links = &self.scheduler.collaborators().links;

        let users: Vec<UserReport> = (0..self.sources.len())
            .map(|user| {
                let reassembly = links
                    .receiver(user)
                    .map(|rx| rx.stats().clone())
                    .unwrap_or_default();
                let mut report = UserReport {
                    user,
                    queue: self.queues.stats(user),
                    abeyant_bytes: self.scheduler.users().abeyant_bytes(user),
                    throughput_bps: 0.0,
                    hol_delay: self.scheduler.hol_delay(user),
                    reassembly,
                };
                if elapsed > 0.0 {
                    report.throughput_bps = report.delivered_bytes() as f64 * 8.0 / elapsed;
                }
                report
            })
            .collect();

        SimulationReport {
            seed: self.seed,
            elapsed,
            rule: snapshot.rule.clone(),
            events: self.counters,
            throughput_fairness: jain_index(users.iter().map(|u| u.throughput_bps)),
            users,
            scheduler: snapshot,
        }
    }
}
