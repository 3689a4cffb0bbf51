//! Alert evaluation and notification server.
//!
//! Runs one monitoring loop per tenant under a [`monitor::Supervisor`] and
//! exposes loop control, manual rule evaluation and incident transitions
//! over a small REST API.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod monitor;
pub mod seed;
pub mod state;
