//! Interfaces to the scheduler's external collaborators: clock and timers,
//! rate estimation, per-user queues and per-user links.

pub mod interface;
