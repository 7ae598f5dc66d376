//! Time-varying per-user channel capacity.
//!
//! [`CapacityWalk`] produces capacities; [`ChannelTrace`] remembers them
//! long enough for a delayed estimator to look back.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Bounds and step sizes for one user's capacity walk, in bits per second.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub min_rate_bps: f64,
    pub max_rate_bps: f64,
    #[serde(default)]
    pub rate_step_bps: f64,
    /// Chance per step that an outage starts.
    #[serde(default)]
    pub outage_probability: f64,
    /// Steps an outage lasts once started.
    #[serde(default = "default_outage_steps")]
    pub outage_steps: u32,
}

fn default_outage_steps() -> u32 {
    10
}

impl ChannelConfig {
    pub fn fixed(rate_bps: f64) -> Self {
        Self {
            min_rate_bps: rate_bps,
            max_rate_bps: rate_bps,
            rate_step_bps: 0.0,
            outage_probability: 0.0,
            outage_steps: default_outage_steps(),
        }
    }
}

#[derive(Debug, Clone)]
struct WalkState {
    rate_bps: f64,
    outage_left: u32,
}

/// Deterministic random-walk capacity generator.
///
/// Each step moves every user's rate by a uniform amount in
/// `[-rate_step_bps, rate_step_bps]`, clamped to its bounds. An outage
/// forces the capacity to zero for `outage_steps` steps and leaves the
/// underlying rate where it was.
#[derive(Debug)]
pub struct CapacityWalk {
    links: Vec<ChannelConfig>,
    rng: StdRng,
    states: Vec<WalkState>,
    capacities: Vec<f64>,
}

impl CapacityWalk {
    pub fn new(seed: u64, links: Vec<ChannelConfig>) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let states: Vec<WalkState> = links
            .iter()
            .map(|link| {
                let range = (link.max_rate_bps - link.min_rate_bps).max(0.0);
                WalkState {
                    rate_bps: link.min_rate_bps + rng.random::<f64>() * range,
                    outage_left: 0,
                }
            })
            .collect();
        let capacities = states.iter().map(|s| s.rate_bps).collect();
        Self {
            links,
            rng,
            states,
            capacities,
        }
    }

    pub fn capacities(&self) -> &[f64] {
        &self.capacities
    }

    pub fn step(&mut self) -> &[f64] {
        for (idx, link) in self.links.iter().enumerate() {
            let delta = rand_signed(&mut self.rng, link.rate_step_bps);
            let state = &mut self.states[idx];
            state.rate_bps = (state.rate_bps + delta).clamp(link.min_rate_bps, link.max_rate_bps);

            if state.outage_left > 0 {
                state.outage_left -= 1;
            } else if link.outage_probability > 0.0
                && self.rng.random::<f64>() < link.outage_probability
            {
                state.outage_left = link.outage_steps;
            }

            self.capacities[idx] = if state.outage_left > 0 {
                0.0
            } else {
                state.rate_bps
            };
        }
        &self.capacities
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    if max_step <= 0.0 {
        return 0.0;
    }
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() { mag } else { -mag }
}

/// Capacity history per user, pruned to what a look-back of `horizon`
/// seconds still needs.
#[derive(Debug)]
pub struct ChannelTrace {
    horizon: f64,
    history: Vec<VecDeque<(f64, f64)>>,
}

pub type SharedTrace = Rc<RefCell<ChannelTrace>>;

impl ChannelTrace {
    pub fn new(num_users: usize, horizon: f64) -> Self {
        Self {
            horizon,
            history: (0..num_users).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn shared(num_users: usize, horizon: f64) -> SharedTrace {
        Rc::new(RefCell::new(Self::new(num_users, horizon)))
    }

    pub fn record(&mut self, now: f64, capacities: &[f64]) {
        let cutoff = now - self.horizon;
        for (hist, &cap) in self.history.iter_mut().zip(capacities) {
            hist.push_back((now, cap));
            while hist.len() >= 2 && hist[1].0 <= cutoff {
                hist.pop_front();
            }
        }
    }

    /// Capacity in effect right now; `0.0` before anything was recorded.
    pub fn current(&self, user: usize) -> f64 {
        self.history
            .get(user)
            .and_then(|h| h.back())
            .map_or(0.0, |(_, c)| *c)
    }

    /// Capacity that was in effect at time `t`. Looking back past the first
    /// record returns the first record.
    pub fn as_of(&self, user: usize, t: f64) -> f64 {
        let Some(hist) = self.history.get(user) else {
            return 0.0;
        };
        hist.iter()
            .rev()
            .find(|(at, _)| *at <= t)
            .or_else(|| hist.front())
            .map_or(0.0, |(_, c)| *c)
    }
}
