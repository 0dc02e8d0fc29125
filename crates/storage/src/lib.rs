//! Storage Layer
//!
//! Durable recording of confirmed alarms: SQLite rows through sqlx, evidence
//! JPEGs on disk, and the `AlarmSink` contract the monitor writes through.

mod event;
mod image_store;
mod repository;
mod sink;

pub use event::{AlarmEvent, AlarmRecord, AlarmStatus};
pub use image_store::ImageStore;
pub use repository::AlarmRepository;
pub use sink::{AlarmSink, MemoryAlarmSink, SqliteAlarmSink, StoredAlarm};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Image store error: {0}")]
    ImageError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}
