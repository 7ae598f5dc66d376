//! Discrete-event host for the slotlink scheduler.
//!
//! Provides a virtual clock and timers, drop-tail user queues, a seeded
//! random-walk channel with delayed feedback, and per-user links that
//! reassemble what they receive, so scheduling behaviour can be measured
//! deterministically.

pub mod calendar;
pub mod channel;
pub mod estimator;
pub mod links;
pub mod packet;
pub mod queues;
pub mod reassembly;
pub mod runner;
pub mod scenario;

pub use runner::{Simulation, SimulationReport};
pub use scenario::ScenarioConfig;
