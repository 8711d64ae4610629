//! Observability setup for flowline: structured logging with an optional
//! OpenTelemetry bridge.

pub mod tracing_setup;
