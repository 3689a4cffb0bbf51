//! SQLite persistence for the monitoring engine.
//!
//! [`store::MonitorStore`] owns the SeaORM connection, runs migrations on
//! connect and implements every collaborator seam the engine consumes:
//! rules, channels, host and probe targets with their latest samples,
//! incidents and notification attempts.

pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use store::MonitorStore;
