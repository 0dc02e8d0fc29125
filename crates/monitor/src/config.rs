//! Monitor configuration

use alerting::PolicyConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monitor worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Only every Nth frame is sent to the detectors (default: 5)
    pub sample_every: u32,

    /// Wait before retrying a failed frame read (milliseconds, default: 2000)
    pub frame_retry_ms: u64,

    /// Pause after every frame read (milliseconds, default: 20)
    pub iteration_delay_ms: u64,

    /// How long a restart waits for the device's stopped worker to release
    /// its source (milliseconds, default: 3000)
    pub restart_wait_ms: u64,

    /// Debounce and cooldown rules
    pub policy: PolicyConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_every: 5,
            frame_retry_ms: 2000,
            iteration_delay_ms: 20,
            restart_wait_ms: 3000,
            policy: PolicyConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Sampling stride, never zero
    pub fn sample_stride(&self) -> u64 {
        u64::from(self.sample_every.max(1))
    }

    pub fn frame_retry(&self) -> Duration {
        Duration::from_millis(self.frame_retry_ms)
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }

    pub fn restart_wait(&self) -> Duration {
        Duration::from_millis(self.restart_wait_ms)
    }
}
