//! Hazard kinds and their confirmation rules

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DetectError;

/// Safety-violation category evaluated independently on every sampled frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HazardKind {
    /// Worker without a safety helmet
    #[serde(alias = "helmet")]
    NoHelmet,
    /// Person inside a restricted zone
    #[serde(alias = "intrusion")]
    Intrusion,
    /// Open hole without a guarding curb
    #[serde(alias = "hole_curb")]
    HoleDanger,
    /// Required signage absent from its area
    #[serde(alias = "signage")]
    SignageMissing,
    /// Supervisor away from the work area
    #[serde(alias = "off_post")]
    OffPost,
}

/// How raw per-frame verdicts of a kind turn into a confirmed alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationRule {
    /// First violating frame confirms
    Immediate,
    /// A run of consecutive violating frames confirms
    ConsecutiveMisses,
    /// Violation sustained for a wall-clock duration confirms, once per episode
    ProlongedAbsence,
}

impl HazardKind {
    /// Stable identifier used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::NoHelmet => "NO_HELMET",
            HazardKind::Intrusion => "INTRUSION",
            HazardKind::HoleDanger => "HOLE_DANGER",
            HazardKind::SignageMissing => "SIGNAGE_MISSING",
            HazardKind::OffPost => "OFF_POST",
        }
    }

    pub fn rule(&self) -> ConfirmationRule {
        match self {
            HazardKind::NoHelmet | HazardKind::Intrusion | HazardKind::HoleDanger => {
                ConfirmationRule::Immediate
            }
            HazardKind::SignageMissing => ConfirmationRule::ConsecutiveMisses,
            HazardKind::OffPost => ConfirmationRule::ProlongedAbsence,
        }
    }

    /// Default alarm text when the detector gives none
    pub fn default_message(&self) -> &'static str {
        match self {
            HazardKind::NoHelmet => "Worker without safety helmet",
            HazardKind::Intrusion => "Person inside restricted zone",
            HazardKind::HoleDanger => "Open hole without guard curb",
            HazardKind::SignageMissing => "Required site signage missing",
            HazardKind::OffPost => "Supervisor off post",
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HazardKind {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "helmet" | "no_helmet" => Ok(HazardKind::NoHelmet),
            "intrusion" => Ok(HazardKind::Intrusion),
            "hole_curb" | "hole_danger" => Ok(HazardKind::HoleDanger),
            "signage" | "signage_missing" => Ok(HazardKind::SignageMissing),
            "off_post" => Ok(HazardKind::OffPost),
            other => Err(DetectError::UnknownHazard(other.to_string())),
        }
    }
}

/// Parse a comma separated hazard list such as `"helmet,signage,hole_curb"`.
///
/// Blank entries are skipped and duplicates collapse; any unknown name fails
/// the whole list.
pub fn parse_hazard_list(list: &str) -> Result<BTreeSet<HazardKind>, DetectError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(HazardKind::from_str)
        .collect()
}
