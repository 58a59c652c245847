//! Core types for the oxidized-cell session layer
//!
//! This crate provides the foundational status codes, error handling,
//! configuration, performance counters and logging infrastructure.

pub mod config;
pub mod error;
pub mod logging;
pub mod perf;

pub use config::{Config, GraphicsApi, SharedConfig};
pub use error::{CoreError, EmulatorError, LoaderError, Result, ResultStatus};
pub use perf::{PerfCounters, PerfStats};
