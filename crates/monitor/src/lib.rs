//! Monitoring Orchestration Core
//!
//! One independent analysis loop per camera:
//! - `MonitorRegistry` owns the start/stop lifecycle, one session per device
//! - `MonitorWorker` samples frames, runs every enabled hazard check with
//!   fault isolation, applies debounce and cooldown, and records alarms

pub mod config;
pub mod registry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::MonitorConfig;
pub use registry::MonitorRegistry;
pub use worker::{CancelSignal, MonitorWorker, WorkerContext, WorkerStats};

use thiserror::Error;

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}
