//! Runtime glue that wires configuration, telemetry, the scheduler, the HTTP
//! trigger, and runner orchestration.

pub mod config;
pub mod profile;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod telemetry;
