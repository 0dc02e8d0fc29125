//! Monitor registry
//!
//! Process-wide table of running monitor sessions, at most one per device.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camera_capture::FrameSource;
use hazard_detect::{HazardDetector, HazardKind};
use storage::AlarmSink;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{CancelSignal, MonitorConfig, MonitorError, MonitorWorker, WorkerContext, WorkerStats};

const RETIRE_POLL: Duration = Duration::from_millis(10);

/// A running session
struct MonitorHandle {
    hazard_kinds: BTreeSet<HazardKind>,
    cancel: CancelSignal,
    task: JoinHandle<WorkerStats>,
}

#[derive(Default)]
struct Sessions {
    active: HashMap<String, MonitorHandle>,
    /// Stopped workers that may still hold their frame source
    retiring: HashMap<String, JoinHandle<WorkerStats>>,
}

/// Start/stop control for per-device monitor workers
pub struct MonitorRegistry {
    ctx: WorkerContext,
    sessions: Mutex<Sessions>,
}

impl MonitorRegistry {
    /// Create a registry bound to the current tokio runtime
    pub fn new(
        detector: Arc<dyn HazardDetector>,
        sink: Arc<dyn AlarmSink>,
        config: MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let runtime = Handle::try_current().map_err(|e| MonitorError::NoRuntime(e.to_string()))?;

        Ok(Self {
            ctx: WorkerContext {
                detector,
                sink,
                config,
                runtime,
            },
            sessions: Mutex::new(Sessions::default()),
        })
    }

    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start monitoring `device_id`.
    ///
    /// A session stopped just before is given up to `restart_wait_ms` to
    /// release its source. Returns `false` when the device already has a live
    /// session, when the previous session is still running after that wait,
    /// or when no hazard kind is requested.
    pub fn start(
        &self,
        device_id: &str,
        source: Box<dyn FrameSource>,
        hazard_kinds: BTreeSet<HazardKind>,
    ) -> bool {
        if hazard_kinds.is_empty() {
            warn!("Device {}: no hazard kinds requested, not starting", device_id);
            return false;
        }

        let deadline = Instant::now() + self.ctx.config.restart_wait();
        let mut sessions = loop {
            let mut sessions = self.sessions();

            if let Some(existing) = sessions.active.get(device_id) {
                if !existing.task.is_finished() {
                    warn!("Device {}: monitoring already running", device_id);
                    return false;
                }
                info!("Device {}: replacing exited session", device_id);
                sessions.active.remove(device_id);
            }

            let retired = sessions.retiring.get(device_id).map(JoinHandle::is_finished);
            match retired {
                None => break sessions,
                Some(true) => {
                    sessions.retiring.remove(device_id);
                    break sessions;
                }
                Some(false) => {}
            }

            drop(sessions);
            if Instant::now() >= deadline {
                warn!("Device {}: previous session still releasing the source", device_id);
                return false;
            }
            std::thread::sleep(RETIRE_POLL);
        };

        let cancel = CancelSignal::new();
        let worker = MonitorWorker::new(
            device_id,
            &hazard_kinds,
            source,
            self.ctx.clone(),
            cancel.clone(),
        );
        let task = self.ctx.runtime.spawn_blocking(move || worker.run());

        info!("Device {}: monitoring started for {:?}", device_id, hazard_kinds);
        sessions.active.insert(
            device_id.to_string(),
            MonitorHandle {
                hazard_kinds,
                cancel,
                task,
            },
        );
        true
    }

    /// Signal the device's worker to stop without waiting for it.
    ///
    /// Returns `false` if the device is not being monitored.
    pub fn stop(&self, device_id: &str) -> bool {
        let mut sessions = self.sessions();
        let Some(handle) = sessions.active.remove(device_id) else {
            warn!("Device {}: stop requested but not monitored", device_id);
            return false;
        };

        handle.cancel.cancel();
        sessions.retiring.insert(device_id.to_string(), handle.task);
        info!("Device {}: stop signalled", device_id);
        true
    }

    /// Stop the device's worker and wait until it has released its source
    pub async fn stop_and_wait(&self, device_id: &str) -> bool {
        let handle = self.sessions().active.remove(device_id);
        let Some(handle) = handle else {
            // a plain stop may have left the worker retiring
            let retiring = self.sessions().retiring.remove(device_id);
            if let Some(task) = retiring {
                Self::join(device_id, task).await;
            }
            return false;
        };

        handle.cancel.cancel();
        Self::join(device_id, handle.task).await;
        true
    }

    /// Stop every session and wait for all workers to exit
    pub async fn shutdown(&self) {
        let (stopped, retiring) = {
            let mut sessions = self.sessions();
            let stopped: Vec<(String, MonitorHandle)> = sessions.active.drain().collect();
            let retiring: Vec<(String, JoinHandle<WorkerStats>)> = sessions.retiring.drain().collect();
            (stopped, retiring)
        };

        info!("Shutting down {} monitor session(s)", stopped.len());
        for (_, handle) in &stopped {
            handle.cancel.cancel();
        }

        let tasks = stopped
            .into_iter()
            .map(|(device, handle)| (device, handle.task))
            .chain(retiring);
        for (device, task) in tasks {
            Self::join(&device, task).await;
        }
    }

    async fn join(device_id: &str, task: JoinHandle<WorkerStats>) -> Option<WorkerStats> {
        match task.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!("Device {}: worker task failed: {}", device_id, e);
                None
            }
        }
    }

    /// Devices with a registered session, sorted
    pub fn active_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.sessions().active.keys().cloned().collect();
        devices.sort();
        devices
    }

    pub fn is_active(&self, device_id: &str) -> bool {
        self.sessions().active.contains_key(device_id)
    }

    pub fn hazard_kinds(&self, device_id: &str) -> Option<BTreeSet<HazardKind>> {
        self.sessions()
            .active
            .get(device_id)
            .map(|handle| handle.hazard_kinds.clone())
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        let sessions = self.sessions.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in sessions.active.values() {
            handle.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, Script, ScriptedDetector};
    use camera_capture::ReplaySource;
    use std::sync::atomic::Ordering;
    use storage::MemoryAlarmSink;

    fn registry() -> MonitorRegistry {
        MonitorRegistry::new(
            Arc::new(ScriptedDetector::new()),
            Arc::new(MemoryAlarmSink::new()),
            fast_config(),
        )
        .unwrap()
    }

    fn kinds(list: &[HazardKind]) -> BTreeSet<HazardKind> {
        list.iter().copied().collect()
    }

    /// A source that keeps producing frames for a long time
    fn endless(name: &str) -> ReplaySource {
        ReplaySource::solid(name, 1_000_000, 4, 4).with_read_delay(Duration::from_millis(1))
    }

    async fn wait_exited(registry: &MonitorRegistry, device_id: &str) {
        for _ in 0..200 {
            let finished = registry
                .sessions()
                .active
                .get(device_id)
                .map(|h| h.task.is_finished())
                .unwrap_or(true);
            if finished {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_rejected() {
        let registry = registry();

        assert!(registry.start("cam-1", Box::new(endless("a")), kinds(&[HazardKind::NoHelmet])));
        assert!(!registry.start("cam-1", Box::new(endless("b")), kinds(&[HazardKind::Intrusion])));

        assert_eq!(registry.active_devices(), vec!["cam-1".to_string()]);
        assert_eq!(registry.hazard_kinds("cam-1"), Some(kinds(&[HazardKind::NoHelmet])));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_unknown_device() {
        let registry = registry();
        assert!(!registry.stop("ghost"));
        assert!(!registry.stop_and_wait("ghost").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_and_wait_releases_source_then_restart() {
        let registry = registry();
        let source = endless("a");
        let released = source.release_flag();

        assert!(registry.start("cam-1", Box::new(source), kinds(&[HazardKind::NoHelmet])));
        assert!(registry.stop_and_wait("cam-1").await);

        assert!(released.load(Ordering::SeqCst));
        assert!(!registry.is_active("cam-1"));
        assert!(registry.start("cam-1", Box::new(endless("b")), kinds(&[HazardKind::NoHelmet])));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_waits_for_retiring_worker() {
        let registry = registry();
        let slow = ReplaySource::solid("slow", 1_000, 4, 4).with_read_delay(Duration::from_millis(300));
        let released = slow.release_flag();

        assert!(registry.start("cam-1", Box::new(slow), kinds(&[HazardKind::NoHelmet])));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.stop("cam-1"));
        assert!(!registry.is_active("cam-1"));

        // the old worker is still blocked in its read when the restart arrives
        assert!(registry.start("cam-1", Box::new(endless("b")), kinds(&[HazardKind::NoHelmet])));
        assert!(released.load(Ordering::SeqCst));
        assert!(registry.is_active("cam-1"));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_during_retry_wait() {
        let config = MonitorConfig {
            frame_retry_ms: 2000,
            ..fast_config()
        };
        let registry = MonitorRegistry::new(
            Arc::new(ScriptedDetector::new()),
            Arc::new(MemoryAlarmSink::new()),
            config,
        )
        .unwrap();
        let dark = ReplaySource::with_gaps("dark", vec![None; 100]);

        assert!(registry.start("cam-1", Box::new(dark), kinds(&[HazardKind::NoHelmet])));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.stop("cam-1"));

        let restarted_at = Instant::now();
        assert!(registry.start("cam-1", Box::new(endless("b")), kinds(&[HazardKind::NoHelmet])));
        assert!(restarted_at.elapsed() < Duration::from_millis(1000));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_gives_up_on_stuck_worker() {
        let config = MonitorConfig {
            restart_wait_ms: 50,
            ..fast_config()
        };
        let registry = MonitorRegistry::new(
            Arc::new(ScriptedDetector::new()),
            Arc::new(MemoryAlarmSink::new()),
            config,
        )
        .unwrap();
        let stuck = ReplaySource::solid("stuck", 10, 4, 4).with_read_delay(Duration::from_millis(1000));

        assert!(registry.start("cam-1", Box::new(stuck), kinds(&[HazardKind::NoHelmet])));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.stop("cam-1"));

        assert!(!registry.start("cam-1", Box::new(endless("b")), kinds(&[HazardKind::NoHelmet])));
        assert!(!registry.is_active("cam-1"));

        assert!(!registry.stop_and_wait("cam-1").await);
        assert!(registry.start("cam-1", Box::new(endless("c")), kinds(&[HazardKind::NoHelmet])));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exited_session_is_replaced() {
        let registry = registry();
        let dead = ReplaySource::solid("dead", 5, 4, 4).failing_open();

        assert!(registry.start("cam-1", Box::new(dead), kinds(&[HazardKind::NoHelmet])));
        wait_exited(&registry, "cam-1").await;
        assert!(registry.is_active("cam-1"));

        assert!(registry.start("cam-1", Box::new(endless("b")), kinds(&[HazardKind::NoHelmet])));
        assert!(registry.is_active("cam-1"));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_single_winner() {
        let registry = Arc::new(registry());

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.start(
                        "cam-1",
                        Box::new(endless(&format!("src-{}", i))),
                        kinds(&[HazardKind::HoleDanger]),
                    )
                })
            })
            .collect();
        let wins = attempts
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|started| *started)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(registry.active_devices().len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_hazard_set_rejected() {
        let registry = registry();
        assert!(!registry.start("cam-1", Box::new(endless("a")), BTreeSet::new()));
        assert!(registry.active_devices().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_devices_isolated() {
        let sink = Arc::new(MemoryAlarmSink::new());
        let registry = MonitorRegistry::new(
            Arc::new(ScriptedDetector::always(HazardKind::HoleDanger, Script::Violation)),
            Arc::clone(&sink) as Arc<dyn AlarmSink>,
            fast_config(),
        )
        .unwrap();

        assert!(registry.start("cam-1", Box::new(ReplaySource::solid("a", 10, 4, 4)), kinds(&[HazardKind::HoleDanger])));
        assert!(registry.start("cam-2", Box::new(ReplaySource::solid("b", 10, 4, 4)), kinds(&[HazardKind::HoleDanger])));
        wait_exited(&registry, "cam-1").await;
        wait_exited(&registry, "cam-2").await;
        assert!(registry.stop_and_wait("cam-1").await);
        assert!(registry.stop_and_wait("cam-2").await);

        // the device-wide cooldown does not cross devices
        let mut devices: Vec<String> = sink.alarms().into_iter().map(|a| a.event.device_id).collect();
        devices.sort();
        assert_eq!(devices, vec!["cam-1".to_string(), "cam-2".to_string()]);
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = MonitorRegistry::new(
            Arc::new(ScriptedDetector::new()),
            Arc::new(MemoryAlarmSink::new()),
            fast_config(),
        );
        assert!(matches!(result, Err(MonitorError::NoRuntime(_))));
    }
}
