//! Evidence rendering
//!
//! Marks the violating region on a copy of the frame, with a captioned tab,
//! before it is stored with the alarm.

mod render;

pub use render::{annotate, encode_jpeg, hazard_color, label_text};

use thiserror::Error;

/// Evidence error types
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Invalid frame: {0}")]
    Frame(String),

    #[error("Label font unusable: {0}")]
    Font(String),

    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
