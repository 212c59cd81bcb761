//! Vitals - liveness and readiness probing for task-queue workers
//!
//! Long-running worker and scheduler processes prove they are healthy
//! through marker files: a liveness marker whose modification time is
//! refreshed while the event loop ticks, and a readiness marker that exists
//! while the process accepts work. A short-lived probe evaluator (the
//! `vitals` binary) reads those markers, optionally performs a broker ping
//! roundtrip, and exits with a code the orchestrator interprets.
//!
//! - [`beacon`] - marker file primitives (touch, remove, age, freshness)
//! - [`pulse`] - lifecycle observers a host runtime drives to maintain the
//!   markers
//! - [`sonar`] - broker ping roundtrip, client and worker-side responder
//! - [`triage`] - the probe evaluator mapping check outcomes to exit codes
//! - [`lookout`] - HTTP liveness check for the web application
//! - [`config`] - probe settings from defaults, `vitals.toml` and `VITALS_*`
//!   environment variables

pub mod beacon;
pub mod cli;
pub mod config;
pub mod error;
pub mod lookout;
pub mod pulse;
pub mod sonar;
pub mod triage;

pub use error::{Error, Result};
