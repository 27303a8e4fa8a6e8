//! Domain types for the batch network probe.
//!
//! Everything here is pure: test types and their defaults, target
//! validation and mount-table parsing, diagnostic script rendering,
//! job id generation, and the plain-text result report. Nothing in this
//! crate talks to the network or spawns processes.

pub mod error;
pub mod job_id;
pub mod report;
pub mod script;
pub mod target;
pub mod test_type;
