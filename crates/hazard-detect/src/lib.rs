//! Site Hazard Detection
//!
//! The detector contract consumed by the monitoring core:
//! - Hazard kinds and the confirmation rule each one follows
//! - Per-frame verdicts (`Detection`) with optional spatial descriptors
//! - `SiteRules`, a rule layer turning generic object detections into
//!   helmet / intrusion / hole / signage / supervisor verdicts

pub mod config;
pub mod detector;
pub mod kind;
pub mod object;
pub mod rules;

pub use config::RulesConfig;
pub use detector::{Detection, HazardDescriptor, HazardDetector, Region};
pub use kind::{parse_hazard_list, ConfirmationRule, HazardKind};
pub use object::{DetectedObject, ObjectClass, ObjectDetector, ReplayObjectDetector};
pub use rules::SiteRules;

use thiserror::Error;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unknown hazard kind: {0}")]
    UnknownHazard(String),
}
