//! Generic object detection feeding the site rules

use std::collections::HashMap;
use std::path::Path;

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::DetectError;

/// Object class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    Helmet,
    /// Person wearing the supervisor vest / armband
    Supervisor,
    Hole,
    Curb,
    Sign,
}

/// Detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Object class
    pub class: ObjectClass,

    /// Bounding box [x, y, width, height]
    pub bbox: [f32; 4],

    /// Detection confidence
    pub confidence: f32,
}

impl DetectedObject {
    pub fn new(class: ObjectClass, bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            class,
            bbox,
            confidence,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.bbox[0] + self.bbox[2] / 2.0, self.bbox[1] + self.bbox[3] / 2.0)
    }

    /// Bottom centre, where a standing person touches the ground
    pub fn foot_point(&self) -> (f32, f32) {
        (self.bbox[0] + self.bbox[2] / 2.0, self.bbox[1] + self.bbox[3])
    }

    /// Top slice of the box, `[x, y, w, h]`
    pub fn head_area(&self, fraction: f32) -> [f32; 4] {
        [self.bbox[0], self.bbox[1], self.bbox[2], self.bbox[3] * fraction.clamp(0.0, 1.0)]
    }

    /// Boxes share any area
    pub fn overlaps(&self, other: &DetectedObject) -> bool {
        let [ax, ay, aw, ah] = self.bbox;
        let [bx, by, bw, bh] = other.bbox;
        ax < bx + bw && bx < ax + aw && ay < by + bh && by < ay + ah
    }
}

/// Object detector (YOLO or similar), treated as a black box
pub trait ObjectDetector: Send + Sync {
    fn detect_objects(&self, frame: &VideoFrame) -> Result<Vec<DetectedObject>, DetectError>;
}

/// Pre-computed detections keyed by frame sequence number.
///
/// Used for offline replays of recorded footage where inference already ran.
/// Frames without an entry have no objects.
#[derive(Debug, Clone, Default)]
pub struct ReplayObjectDetector {
    frames: HashMap<u32, Vec<DetectedObject>>,
}

impl ReplayObjectDetector {
    pub fn new(frames: HashMap<u32, Vec<DetectedObject>>) -> Self {
        Self { frames }
    }

    /// Load a JSON object mapping frame sequence to a list of objects
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DetectError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        let frames: HashMap<u32, Vec<DetectedObject>> = serde_json::from_str(&raw)
            .map_err(|e| DetectError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        info!("Loaded replay detections for {} frames from {}", frames.len(), path.display());
        Ok(Self::new(frames))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl ObjectDetector for ReplayObjectDetector {
    fn detect_objects(&self, frame: &VideoFrame) -> Result<Vec<DetectedObject>, DetectError> {
        Ok(self.frames.get(&frame.sequence).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_helpers() {
        let person = DetectedObject::new(ObjectClass::Person, [100.0, 50.0, 40.0, 120.0], 0.9);
        assert_eq!(person.center(), (120.0, 110.0));
        assert_eq!(person.foot_point(), (120.0, 170.0));
        assert_eq!(person.head_area(0.25), [100.0, 50.0, 40.0, 30.0]);

        let helmet = DetectedObject::new(ObjectClass::Helmet, [110.0, 45.0, 20.0, 15.0], 0.8);
        let far = DetectedObject::new(ObjectClass::Helmet, [300.0, 45.0, 20.0, 15.0], 0.8);
        assert!(person.overlaps(&helmet));
        assert!(!person.overlaps(&far));
    }

    #[test]
    fn test_replay_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.json");
        std::fs::write(
            &path,
            r#"{"3": [{"class": "person", "bbox": [1.0, 2.0, 3.0, 4.0], "confidence": 0.7}]}"#,
        )
        .unwrap();

        let detector = ReplayObjectDetector::from_json_file(&path).unwrap();
        assert_eq!(detector.frame_count(), 1);

        let hit = detector.detect_objects(&VideoFrame::filled(2, 2, [0, 0, 0], 3)).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].class, ObjectClass::Person);

        let miss = detector.detect_objects(&VideoFrame::filled(2, 2, [0, 0, 0], 4)).unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn test_replay_bad_file() {
        assert!(matches!(
            ReplayObjectDetector::from_json_file("/nonexistent/detections.json"),
            Err(DetectError::ModelLoad(_))
        ));
    }
}
