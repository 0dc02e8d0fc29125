//! Site safety rules over generic object detections

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camera_capture::VideoFrame;
use tracing::debug;

use crate::{
    DetectError, DetectedObject, Detection, HazardDescriptor, HazardDetector, HazardKind,
    ObjectClass, ObjectDetector, Region, RulesConfig,
};

/// Frames whose detections are kept; one per concurrently sampled camera is enough
const RECENT_FRAMES: usize = 16;

type CachedObjects = Arc<Vec<DetectedObject>>;

/// Turns the objects found in a frame into per-hazard verdicts.
///
/// Every hazard kind of one sampled frame shares a single object detection
/// pass: results are cached by frame id.
pub struct SiteRules<D> {
    config: RulesConfig,
    objects: D,
    recent: Mutex<VecDeque<(u64, CachedObjects)>>,
}

impl<D: ObjectDetector> SiteRules<D> {
    pub fn new(config: RulesConfig, objects: D) -> Self {
        Self {
            config,
            objects,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_FRAMES)),
        }
    }

    fn recent(&self) -> MutexGuard<'_, VecDeque<(u64, CachedObjects)>> {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Objects in `frame`, running the object detector at most once per frame
    fn objects_in(&self, frame: &VideoFrame) -> Result<CachedObjects, DetectError> {
        let cached = self
            .recent()
            .iter()
            .find(|(id, _)| *id == frame.id)
            .map(|(_, objects)| Arc::clone(objects));
        if let Some(objects) = cached {
            return Ok(objects);
        }

        // failures are not cached, the next kind retries
        let objects = Arc::new(self.objects.detect_objects(frame)?);
        let mut recent = self.recent();
        if recent.len() >= RECENT_FRAMES {
            recent.pop_front();
        }
        recent.push_back((frame.id, Arc::clone(&objects)));
        Ok(objects)
    }

    fn confident<'a>(
        &self,
        objects: &'a [DetectedObject],
        class: ObjectClass,
    ) -> impl Iterator<Item = &'a DetectedObject> {
        let min = self.config.min_confidence;
        objects
            .iter()
            .filter(move |o| o.class == class && o.confidence >= min)
    }

    fn helmet(&self, objects: &[DetectedObject]) -> Detection {
        let helmets: Vec<&DetectedObject> = self.confident(objects, ObjectClass::Helmet).collect();

        let bare_head = self.confident(objects, ObjectClass::Person).find(|person| {
            let head = Region::from_xywh(person.head_area(self.config.head_fraction));
            !helmets.iter().any(|helmet| {
                let (cx, cy) = helmet.center();
                head.contains(cx, cy)
            })
        });

        match bare_head {
            Some(person) => Detection::violation(
                HazardDescriptor::new(
                    HazardKind::NoHelmet,
                    HazardKind::NoHelmet.default_message(),
                    person.confidence,
                )
                .with_region(Region::from_xywh(person.bbox)),
            ),
            None => Detection::clear(),
        }
    }

    fn intrusion(&self, objects: &[DetectedObject]) -> Detection {
        let Some(zone) = &self.config.restricted_zone else {
            return Detection::clear();
        };

        let intruder = self.confident(objects, ObjectClass::Person).find(|person| {
            let (x, y) = person.foot_point();
            zone.contains(x, y)
        });

        match intruder {
            Some(person) => Detection::violation(
                HazardDescriptor::new(
                    HazardKind::Intrusion,
                    HazardKind::Intrusion.default_message(),
                    person.confidence,
                )
                .with_region(Region::from_xywh(person.bbox)),
            ),
            None => Detection::clear(),
        }
    }

    fn hole(&self, objects: &[DetectedObject]) -> Detection {
        let curbs: Vec<&DetectedObject> = self.confident(objects, ObjectClass::Curb).collect();

        let unguarded = self
            .confident(objects, ObjectClass::Hole)
            .find(|hole| !curbs.iter().any(|curb| hole.overlaps(curb)));

        match unguarded {
            Some(hole) => Detection::violation(
                HazardDescriptor::new(
                    HazardKind::HoleDanger,
                    HazardKind::HoleDanger.default_message(),
                    hole.confidence,
                )
                .with_region(Region::from_xywh(hole.bbox)),
            ),
            None => Detection::clear(),
        }
    }

    fn signage(&self, frame: &VideoFrame, objects: &[DetectedObject]) -> Detection {
        let roi = self.config.signage_roi.clone().unwrap_or(Region::Rect {
            x1: 0.0,
            y1: 0.0,
            x2: frame.width as f32,
            y2: frame.height as f32,
        });

        let found = self.confident(objects, ObjectClass::Sign).any(|sign| {
            let (x, y) = sign.center();
            roi.contains(x, y)
        });

        if found {
            Detection::clear()
        } else {
            Detection::violation(
                HazardDescriptor::new(
                    HazardKind::SignageMissing,
                    HazardKind::SignageMissing.default_message(),
                    1.0,
                )
                .with_region(roi),
            )
        }
    }

    fn supervisor(&self, objects: &[DetectedObject]) -> Detection {
        let count = self.confident(objects, ObjectClass::Supervisor).count();
        debug!("Supervisors in frame: {}", count);

        if count > 0 {
            Detection::clear()
        } else {
            Detection::violation(HazardDescriptor::new(
                HazardKind::OffPost,
                HazardKind::OffPost.default_message(),
                1.0,
            ))
        }
    }
}

impl<D: ObjectDetector> HazardDetector for SiteRules<D> {
    fn detect(&self, frame: &VideoFrame, kind: HazardKind) -> Result<Detection, DetectError> {
        let objects = self.objects_in(frame)?;

        Ok(match kind {
            HazardKind::NoHelmet => self.helmet(&objects),
            HazardKind::Intrusion => self.intrusion(&objects),
            HazardKind::HoleDanger => self.hole(&objects),
            HazardKind::SignageMissing => self.signage(frame, &objects),
            HazardKind::OffPost => self.supervisor(&objects),
        })
    }
}
