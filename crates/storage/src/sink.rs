//! Alarm sinks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::RgbImage;
use tracing::{info, warn};

use crate::{AlarmEvent, AlarmRepository, ImageStore, StorageError};

/// Durable destination for confirmed alarms.
///
/// Every call is an independent unit of work; implementations must accept
/// concurrent calls from many monitor workers. No retries: a failed call
/// loses that alarm.
#[async_trait]
pub trait AlarmSink: Send + Sync {
    async fn record(&self, event: &AlarmEvent, evidence: Option<&RgbImage>) -> Result<i64, StorageError>;
}

/// Sink writing evidence to an `ImageStore` and rows to SQLite
#[derive(Debug, Clone)]
pub struct SqliteAlarmSink {
    repository: AlarmRepository,
    images: ImageStore,
}

impl SqliteAlarmSink {
    pub fn new(repository: AlarmRepository, images: ImageStore) -> Self {
        Self { repository, images }
    }

    pub fn repository(&self) -> &AlarmRepository {
        &self.repository
    }
}

#[async_trait]
impl AlarmSink for SqliteAlarmSink {
    async fn record(&self, event: &AlarmEvent, evidence: Option<&RgbImage>) -> Result<i64, StorageError> {
        let evidence_path = match evidence {
            Some(image) => match self.images.save(&event.device_id, image).await {
                Ok(path) => Some(path),
                Err(e) => {
                    // the alarm is still worth keeping without its picture
                    warn!("Evidence image for {} not saved: {}", event.device_id, e);
                    None
                }
            },
            None => None,
        };

        let id = self.repository.insert(event, evidence_path.as_deref()).await?;
        info!(
            "Alarm recorded (ID: {}) device={} kind={} severity={}",
            id, event.device_id, event.kind, event.severity
        );
        Ok(id)
    }
}

/// An alarm held by `MemoryAlarmSink`
#[derive(Debug, Clone)]
pub struct StoredAlarm {
    pub id: i64,
    pub event: AlarmEvent,
    /// Evidence image dimensions, when one was supplied
    pub evidence_size: Option<(u32, u32)>,
}

/// In-process sink for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryAlarmSink {
    alarms: Mutex<Vec<StoredAlarm>>,
    fail: AtomicBool,
}

impl MemoryAlarmSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose writes fail until `set_failing(false)`
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn alarms(&self) -> Vec<StoredAlarm> {
        self.alarms.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.alarms.lock().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlarmSink for MemoryAlarmSink {
    async fn record(&self, event: &AlarmEvent, evidence: Option<&RgbImage>) -> Result<i64, StorageError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::DatabaseError("sink unavailable".to_string()));
        }

        let mut alarms = self
            .alarms
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        let id = alarms.len() as i64 + 1;
        alarms.push(StoredAlarm {
            id,
            event: event.clone(),
            evidence_size: evidence.map(|img| img.dimensions()),
        });
        Ok(id)
    }
}
