//! Scripted collaborators for worker and registry tests

use std::collections::HashMap;
use std::sync::Mutex;

use camera_capture::VideoFrame;
use hazard_detect::{DetectError, Detection, HazardDescriptor, HazardDetector, HazardKind, Region};

use crate::MonitorConfig;

#[derive(Debug, Clone, Copy)]
pub enum Script {
    Violation,
    Fault,
    Panic,
}

/// Detector answering from a (frame sequence, kind) table; unscripted calls are clear
#[derive(Default)]
pub struct ScriptedDetector {
    script: HashMap<(u32, HazardKind), Script>,
    always: HashMap<HazardKind, Script>,
    calls: Mutex<Vec<(u32, HazardKind)>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always(kind: HazardKind, script: Script) -> Self {
        let mut detector = Self::default();
        detector.always.insert(kind, script);
        detector
    }

    pub fn on(mut self, sequence: u32, kind: HazardKind, script: Script) -> Self {
        self.script.insert((sequence, kind), script);
        self
    }

    pub fn calls(&self) -> Vec<(u32, HazardKind)> {
        self.calls.lock().unwrap().clone()
    }
}

impl HazardDetector for ScriptedDetector {
    fn detect(&self, frame: &VideoFrame, kind: HazardKind) -> Result<Detection, DetectError> {
        self.calls.lock().unwrap().push((frame.sequence, kind));

        let script = self
            .script
            .get(&(frame.sequence, kind))
            .or_else(|| self.always.get(&kind));

        match script {
            None => Ok(Detection::clear()),
            Some(Script::Violation) => Ok(Detection::violation(
                HazardDescriptor::new(kind, kind.default_message(), 0.9)
                    .with_region(Region::Rect { x1: 1.0, y1: 1.0, x2: 6.0, y2: 6.0 }),
            )),
            Some(Script::Fault) => Err(DetectError::Inference("scripted fault".to_string())),
            Some(Script::Panic) => panic!("scripted detector panic"),
        }
    }
}

/// Default policy with no waiting between reads
pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        sample_every: 5,
        frame_retry_ms: 1,
        iteration_delay_ms: 0,
        ..Default::default()
    }
}
