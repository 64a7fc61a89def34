//! Runtime glue that wires configuration, CI detection, runner payloads, hook
//! outcomes, failure isolation, telemetry, and the host-facing reporter.

pub mod ci;
pub mod config;
pub mod events;
pub mod hooks;
pub mod isolation;
pub mod runner;
pub mod telemetry;
