//! Camera Capture Library for Site Monitoring
//!
//! Provides the frame types and frame sources consumed by the monitoring core.
//! Supports:
//! - Decoded RGB frames with crop / image conversion helpers
//! - The blocking `FrameSource` capability (one per camera)
//! - In-memory replay and image-directory sources for simulation and tests

pub mod frame;
pub mod source;

pub use frame::VideoFrame;
pub use source::{FrameSource, ImageDirSource, ReplaySource};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("No frame available")]
    Unavailable,

    #[error("Frame source exhausted")]
    EndOfStream,

    #[error("Camera not initialized")]
    NotInitialized,
}

impl CameraError {
    /// Whether the read may succeed if retried later.
    ///
    /// Only end-of-stream is permanent; a stream hiccup or a missing frame is
    /// expected on live cameras and is retried by the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CameraError::EndOfStream)
    }
}
