//! Background services

pub mod probe_runner;

pub use probe_runner::{ProbeRunner, ProbeRunnerHandle, ProbeState, ProbeStatus, TriggerOutcome};
