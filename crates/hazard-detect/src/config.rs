//! Rule layer configuration

use serde::{Deserialize, Serialize};

use crate::Region;

/// Thresholds and areas used by `SiteRules`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Objects below this confidence are ignored
    pub min_confidence: f32,

    /// Top fraction of a person box searched for a helmet
    pub head_fraction: f32,

    /// Area people must not enter; intrusion never fires without one
    pub restricted_zone: Option<Region>,

    /// Area where signage must be visible; whole frame when unset
    pub signage_roi: Option<Region>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            head_fraction: 0.3,
            restricted_zone: None,
            signage_roi: None,
        }
    }
}
