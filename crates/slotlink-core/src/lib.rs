pub mod config;
pub mod error;
pub mod net;
pub mod scheduler;
pub mod stats;

pub fn init() {
    tracing::info!("Slotlink Core Initialized");
}
