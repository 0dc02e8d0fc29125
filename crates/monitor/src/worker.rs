//! Per-device monitoring loop

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alerting::HazardPolicy;
use camera_capture::{FrameSource, VideoFrame};
use hazard_detect::{ConfirmationRule, Detection, HazardDetector, HazardKind};
use storage::{AlarmEvent, AlarmSink, StorageError};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::MonitorConfig;

/// Longest uninterrupted sleep; a stop request is noticed within one slice
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Single-trip stop flag shared between a worker and its registry handle
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collaborators shared by every worker of a registry
#[derive(Clone)]
pub struct WorkerContext {
    pub detector: Arc<dyn HazardDetector>,
    pub sink: Arc<dyn AlarmSink>,
    pub config: MonitorConfig,
    /// Runtime driving the async sink from the blocking worker thread
    pub runtime: Handle,
}

/// Counters reported when a worker exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames_read: u64,
    pub frames_dispatched: u64,
    pub detector_faults: u64,
    /// Alarms that passed the cooldown gate
    pub alarms_emitted: u64,
    pub alarms_suppressed: u64,
    pub alarms_recorded: u64,
    /// Emitted alarms lost to sink failures
    pub alarms_dropped: u64,
}

/// The sampling / detection / alarm loop of one device.
///
/// Runs on a blocking thread: frame reads, detector calls, and the delays
/// between iterations all block.
pub struct MonitorWorker {
    device_id: String,
    kinds: Vec<HazardKind>,
    source: Box<dyn FrameSource>,
    ctx: WorkerContext,
    cancel: CancelSignal,
}

impl MonitorWorker {
    pub fn new(
        device_id: impl Into<String>,
        kinds: &BTreeSet<HazardKind>,
        source: Box<dyn FrameSource>,
        ctx: WorkerContext,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            kinds: kinds.iter().copied().collect(),
            source,
            ctx,
            cancel,
        }
    }

    /// Run until cancelled or the source is exhausted
    pub fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(
            "Monitor worker starting: device={} source={} hazards={:?}",
            self.device_id,
            self.source.describe(),
            self.kinds
        );

        if let Err(e) = self.source.open() {
            error!("Device {}: frame source open failed, session aborted: {}", self.device_id, e);
            return stats;
        }

        let mut policy = HazardPolicy::new(
            self.ctx.config.policy.clone(),
            self.kinds.iter().copied(),
            Instant::now(),
        );
        let stride = self.ctx.config.sample_stride();
        let retry = self.ctx.config.frame_retry();
        let delay = self.ctx.config.iteration_delay();
        let mut frame_count: u64 = 0;

        while !self.cancel.is_cancelled() {
            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(e) if e.is_recoverable() => {
                    debug!("Device {}: no frame ({}), retrying in {:?}", self.device_id, e, retry);
                    self.pause(retry);
                    continue;
                }
                Err(e) => {
                    info!("Device {}: frame source finished: {}", self.device_id, e);
                    break;
                }
            };

            stats.frames_read += 1;
            frame_count += 1;
            if frame_count % stride == 0 {
                stats.frames_dispatched += 1;
                self.dispatch(&frame, &mut policy, &mut stats);
            }

            self.pause(delay);
        }

        self.source.release();
        info!("Monitor worker exited: device={} stats={:?}", self.device_id, stats);
        stats
    }

    /// Sleep up to `total`, returning early once cancelled
    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return;
            }
            std::thread::sleep(left.min(PAUSE_SLICE));
        }
    }

    /// Evaluate every configured kind on one sampled frame
    fn dispatch(&self, frame: &VideoFrame, policy: &mut HazardPolicy, stats: &mut WorkerStats) {
        let now = Instant::now();

        for &kind in &self.kinds {
            let Some(detection) = self.invoke(frame, kind) else {
                stats.detector_faults += 1;
                continue;
            };

            if !policy.observe(kind, detection.violated, now) {
                continue;
            }
            if !policy.try_emit(kind, now) {
                stats.alarms_suppressed += 1;
                continue;
            }

            stats.alarms_emitted += 1;
            let event = self.build_event(kind, &detection, policy);
            match self.deliver(frame, &event) {
                Ok(id) => {
                    stats.alarms_recorded += 1;
                    debug!("Device {}: alarm {} stored as {}", self.device_id, kind, id);
                }
                Err(e) => {
                    stats.alarms_dropped += 1;
                    error!("Device {}: alarm {} dropped: {}", self.device_id, kind, e);
                }
            }
        }
    }

    /// Call the detector; faults and panics count as "no observation"
    fn invoke(&self, frame: &VideoFrame, kind: HazardKind) -> Option<Detection> {
        let detector = &self.ctx.detector;
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(frame, kind))) {
            Ok(Ok(detection)) => Some(detection),
            Ok(Err(e)) => {
                warn!("Device {}: {} detector failed: {}", self.device_id, kind, e);
                None
            }
            Err(payload) => {
                error!(
                    "Device {}: {} detector panicked: {}",
                    self.device_id,
                    kind,
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    fn build_event(&self, kind: HazardKind, detection: &Detection, policy: &HazardPolicy) -> AlarmEvent {
        let event = AlarmEvent::from_descriptor(&self.device_id, kind, detection.descriptor.as_ref());
        match kind.rule() {
            ConfirmationRule::ProlongedAbsence => event.with_message(format!(
                "{} for more than {} s",
                kind.default_message(),
                policy.config().off_post_threshold_secs
            )),
            ConfirmationRule::Immediate | ConfirmationRule::ConsecutiveMisses => event,
        }
    }

    /// Render evidence and hand the alarm to the sink
    fn deliver(&self, frame: &VideoFrame, event: &AlarmEvent) -> Result<i64, StorageError> {
        let evidence = match evidence::annotate(frame, event.region.as_ref(), event.kind) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Device {}: evidence not rendered: {}", self.device_id, e);
                None
            }
        };

        self.ctx
            .runtime
            .block_on(self.ctx.sink.record(event, evidence.as_ref()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
