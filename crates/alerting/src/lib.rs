//! Alerting System
//!
//! Decides when raw per-frame hazard verdicts become reported alarms:
//! debouncing, prolonged-absence tracking, cooldown gating, and severity
//! mapping.

mod policy;
mod severity;

pub use policy::{CooldownScope, HazardPolicy, HazardState, PolicyConfig};
pub use severity::Severity;
