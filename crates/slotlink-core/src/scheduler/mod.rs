//! Time-slotted downlink scheduling engine.
//!
//! Once per slot the scheduler picks one user to serve over a shared,
//! time-varying channel and sends that user's packets until the slot runs
//! out. Components:
//! - [`rate_history`]: per-user EWMA of the rate actually granted
//! - [`abeyance`]: the single carried-over fragment each user may hold
//! - [`slot`]: current slot start and fixed duration
//! - [`selector`]: proportional-fair and max-weight user selection
//! - [`slicer`]: sends one unit, splitting it at the slot boundary
//! - [`slot_scheduler`]: the timer-driven loop tying them together

pub mod abeyance;
pub mod ewma;
pub mod rate_history;
pub mod selector;
pub mod slicer;
pub mod slot;
pub mod slot_scheduler;
pub mod users;

#[cfg(test)]
pub(crate) mod test_util;

pub use slicer::SendOutcome;
pub use slot_scheduler::{LoopCounters, LoopState, SlotScheduler};
