//! Alert evaluation core for host and probe monitoring.
//!
//! A sweep takes each enabled [`AlertRule`](opsmon_common::types::AlertRule),
//! resolves its targets through a [`target::TargetDomain`], evaluates the latest
//! sample with [`evaluator::evaluate`], gates the result through the
//! [`hysteresis::HysteresisTracker`] and records confirmed breaches with the
//! [`incident::IncidentManager`]. The persistence seams ([`source::RuleSource`],
//! [`incident::IncidentStore`]) are traits so the same pipeline runs against
//! SQLite in the server and [`memory::MemoryIncidentStore`] in tests.

pub mod condition;
pub mod error;
pub mod evaluator;
pub mod hysteresis;
pub mod incident;
pub mod memory;
pub mod source;
pub mod target;
