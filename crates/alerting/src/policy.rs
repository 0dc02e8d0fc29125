//! Debounce & cooldown policy for one device

use hazard_detect::{ConfirmationRule, HazardKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Which alarms share a cooldown window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One window per device: any alarm silences every kind on that device
    #[default]
    Device,
    /// One window per (device, hazard kind)
    Hazard,
}

/// Policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Consecutive signage misses before an alarm (default: 3)
    pub signage_miss_threshold: u32,
    /// Supervisor absence before an off-post alarm (seconds, default: 300)
    pub off_post_threshold_secs: u64,
    /// Minimum gap between emitted alarms (seconds, default: 5)
    pub cooldown_secs: u64,
    /// Cooldown sharing
    pub cooldown_scope: CooldownScope,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            signage_miss_threshold: 3,
            off_post_threshold_secs: 300,
            cooldown_secs: 5,
            cooldown_scope: CooldownScope::Device,
        }
    }
}

impl PolicyConfig {
    pub fn off_post_threshold(&self) -> Duration {
        Duration::from_secs(self.off_post_threshold_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Debounce bookkeeping for one (device, hazard kind)
#[derive(Debug, Clone)]
pub struct HazardState {
    /// Consecutive frames where required signage was missing
    pub consecutive_misses: u32,
    /// Last time the required subject was present
    pub last_seen_at: Instant,
    /// Absence alarm already raised for the current episode
    pub already_alarmed: bool,
    /// Last alarm emitted for this kind
    pub last_alarm_at: Option<Instant>,
}

impl HazardState {
    fn new(now: Instant) -> Self {
        Self {
            consecutive_misses: 0,
            last_seen_at: now,
            already_alarmed: false,
            last_alarm_at: None,
        }
    }
}

/// Per-device alarm decision state.
///
/// Owned by exactly one monitor worker; time is always passed in so the
/// decisions are reproducible.
#[derive(Debug)]
pub struct HazardPolicy {
    config: PolicyConfig,
    states: HashMap<HazardKind, HazardState>,
    /// Last alarm emitted on the device, any kind
    last_alarm_at: Option<Instant>,
}

impl HazardPolicy {
    /// Create a policy whose absence clocks start at `now`
    pub fn new(config: PolicyConfig, kinds: impl IntoIterator<Item = HazardKind>, now: Instant) -> Self {
        let states = kinds
            .into_iter()
            .map(|kind| (kind, HazardState::new(now)))
            .collect();
        Self {
            config,
            states,
            last_alarm_at: None,
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn state(&self, kind: HazardKind) -> Option<&HazardState> {
        self.states.get(&kind)
    }

    /// Feed one frame's verdict; returns whether the alarm is confirmed.
    ///
    /// Confirmation does not emit: the caller must still pass `try_emit`.
    pub fn observe(&mut self, kind: HazardKind, violated: bool, now: Instant) -> bool {
        let signage_threshold = self.config.signage_miss_threshold;
        let absence_threshold = self.config.off_post_threshold();
        let state = self
            .states
            .entry(kind)
            .or_insert_with(|| HazardState::new(now));

        match kind.rule() {
            ConfirmationRule::Immediate => violated,
            ConfirmationRule::ConsecutiveMisses => {
                if violated {
                    state.consecutive_misses = state.consecutive_misses.saturating_add(1);
                    debug!("{} miss #{}", kind, state.consecutive_misses);
                    state.consecutive_misses >= signage_threshold
                } else {
                    state.consecutive_misses = 0;
                    false
                }
            }
            ConfirmationRule::ProlongedAbsence => {
                if violated {
                    let absent_for = now.saturating_duration_since(state.last_seen_at);
                    absent_for >= absence_threshold && !state.already_alarmed
                } else {
                    state.last_seen_at = now;
                    state.already_alarmed = false;
                    false
                }
            }
        }
    }

    /// Cooldown gate for a confirmed alarm.
    ///
    /// On success the alarm counts as emitted and the debounce state for the
    /// kind is committed. A suppressed alarm leaves state untouched so it
    /// confirms again on the next frame while the condition persists.
    pub fn try_emit(&mut self, kind: HazardKind, now: Instant) -> bool {
        let cooldown = self.config.cooldown();
        let last = match self.config.cooldown_scope {
            CooldownScope::Device => self.last_alarm_at,
            CooldownScope::Hazard => self.states.get(&kind).and_then(|s| s.last_alarm_at),
        };

        if let Some(last) = last {
            if now.saturating_duration_since(last) < cooldown {
                debug!("Alarm {} suppressed: in cooldown period", kind);
                return false;
            }
        }

        self.last_alarm_at = Some(now);
        let state = self
            .states
            .entry(kind)
            .or_insert_with(|| HazardState::new(now));
        state.last_alarm_at = Some(now);

        match kind.rule() {
            ConfirmationRule::Immediate => {}
            ConfirmationRule::ConsecutiveMisses => state.consecutive_misses = 0,
            ConfirmationRule::ProlongedAbsence => state.already_alarmed = true,
        }

        info!("Alarm {} passed cooldown gate", kind);
        true
    }
}
