//! Observability setup shared by courier binaries.

pub mod tracing_setup;
