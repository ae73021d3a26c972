//! File output for the telemetry recorder.

pub mod export;
