//! Detector contract: frame in, verdict out

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};

use crate::{DetectError, HazardKind};

/// Spatial area in frame pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Region {
    /// Axis-aligned rectangle, corners (x1, y1) top-left and (x2, y2) bottom-right
    Rect { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Closed polygon, first point not repeated at the end
    Polygon { points: Vec<[f32; 2]> },
}

impl Region {
    /// Rectangle from an `[x, y, width, height]` box
    pub fn from_xywh(bbox: [f32; 4]) -> Self {
        Region::Rect {
            x1: bbox[0],
            y1: bbox[1],
            x2: bbox[0] + bbox[2],
            y2: bbox[1] + bbox[3],
        }
    }

    /// Bounding box as `(x1, y1, x2, y2)`, `None` for an empty polygon
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        match self {
            Region::Rect { x1, y1, x2, y2 } => {
                Some((x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2)))
            }
            Region::Polygon { points } => {
                let first = points.first()?;
                let init = (first[0], first[1], first[0], first[1]);
                Some(points.iter().fold(init, |(x1, y1, x2, y2), p| {
                    (x1.min(p[0]), y1.min(p[1]), x2.max(p[0]), y2.max(p[1]))
                }))
            }
        }
    }

    /// Point-in-region test (ray casting for polygons)
    pub fn contains(&self, x: f32, y: f32) -> bool {
        match self {
            Region::Rect { .. } => match self.bounds() {
                Some((x1, y1, x2, y2)) => x >= x1 && x <= x2 && y >= y1 && y <= y2,
                None => false,
            },
            Region::Polygon { points } => {
                if points.len() < 3 {
                    return false;
                }
                let mut inside = false;
                let mut j = points.len() - 1;
                for i in 0..points.len() {
                    let (xi, yi) = (points[i][0], points[i][1]);
                    let (xj, yj) = (points[j][0], points[j][1]);
                    if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                        inside = !inside;
                    }
                    j = i;
                }
                inside
            }
        }
    }
}

/// What a detector reports about a violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardDescriptor {
    pub kind: HazardKind,
    pub message: String,
    /// Detection confidence (0-1)
    pub confidence: f32,
    pub region: Option<Region>,
}

impl HazardDescriptor {
    pub fn new(kind: HazardKind, message: impl Into<String>, confidence: f32) -> Self {
        Self {
            kind,
            message: message.into(),
            confidence: confidence.clamp(0.0, 1.0),
            region: None,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

/// Per-frame verdict for one hazard kind.
///
/// For presence-required kinds (signage, supervisor) `violated` means the
/// required thing was not found in this frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    pub violated: bool,
    pub descriptor: Option<HazardDescriptor>,
}

impl Detection {
    /// Nothing wrong in this frame
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn violation(descriptor: HazardDescriptor) -> Self {
        Self {
            violated: true,
            descriptor: Some(descriptor),
        }
    }
}

/// Frame-in, verdict-out capability, shared by every monitor worker.
///
/// Implementations must tolerate concurrent calls from several devices and
/// must not keep per-device alarm state.
pub trait HazardDetector: Send + Sync {
    fn detect(&self, frame: &VideoFrame, kind: HazardKind) -> Result<Detection, DetectError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rect_bounds_normalized() {
        let region = Region::Rect { x1: 50.0, y1: 40.0, x2: 10.0, y2: 20.0 };
        assert_eq!(region.bounds(), Some((10.0, 20.0, 50.0, 40.0)));
        assert!(region.contains(30.0, 30.0));
        assert!(!region.contains(60.0, 30.0));
    }

    #[test]
    fn test_polygon_contains() {
        let triangle = Region::Polygon {
            points: vec![[0.0, 0.0], [100.0, 0.0], [0.0, 100.0]],
        };
        assert!(triangle.contains(10.0, 10.0));
        assert!(!triangle.contains(80.0, 80.0));
        assert_eq!(triangle.bounds(), Some((0.0, 0.0, 100.0, 100.0)));

        let empty = Region::Polygon { points: vec![] };
        assert_eq!(empty.bounds(), None);
        assert!(!empty.contains(0.0, 0.0));
    }

    #[test]
    fn test_from_xywh() {
        let region = Region::from_xywh([10.0, 20.0, 30.0, 40.0]);
        assert_eq!(region, Region::Rect { x1: 10.0, y1: 20.0, x2: 40.0, y2: 60.0 });
    }

    #[test]
    fn test_descriptor_confidence_clamped() {
        assert_eq!(HazardDescriptor::new(HazardKind::NoHelmet, "x", 1.7).confidence, 1.0);
        assert_eq!(HazardDescriptor::new(HazardKind::NoHelmet, "x", -0.2).confidence, 0.0);
    }

    #[test]
    fn test_region_serde_shape_tag() {
        let json = r#"{"shape":"rect","x1":1.0,"y1":2.0,"x2":3.0,"y2":4.0}"#;
        let region: Region = serde_json::from_str(json).unwrap();
        assert_eq!(region, Region::Rect { x1: 1.0, y1: 2.0, x2: 3.0, y2: 4.0 });
    }

    proptest! {
        #[test]
        fn prop_rect_polygon_agree_on_center(
            x in 0.0f32..500.0, y in 0.0f32..500.0,
            w in 2.0f32..200.0, h in 2.0f32..200.0,
        ) {
            let rect = Region::from_xywh([x, y, w, h]);
            let polygon = Region::Polygon {
                points: vec![[x, y], [x + w, y], [x + w, y + h], [x, y + h]],
            };
            let (cx, cy) = (x + w / 2.0, y + h / 2.0);

            prop_assert!(rect.contains(cx, cy));
            prop_assert!(polygon.contains(cx, cy));
            prop_assert!(!rect.contains(x + w + 1.0, cy));
            prop_assert!(!polygon.contains(x + w + 1.0, cy));
        }
    }
}
