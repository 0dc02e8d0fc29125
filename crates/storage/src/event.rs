//! Alarm event and stored record types

use std::fmt;
use std::str::FromStr;

use alerting::Severity;
use chrono::{DateTime, Utc};
use hazard_detect::{HazardDescriptor, HazardKind, Region};
use serde::{Deserialize, Serialize};

use crate::StorageError;

/// A confirmed alarm, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub device_id: String,
    pub kind: HazardKind,
    pub message: String,
    /// Detection confidence (0-1)
    pub confidence: f32,
    pub region: Option<Region>,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn new(
        device_id: impl Into<String>,
        kind: HazardKind,
        message: impl Into<String>,
        confidence: f32,
        region: Option<Region>,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            device_id: device_id.into(),
            kind,
            message: message.into(),
            confidence,
            region,
            severity: Severity::from_confidence(confidence),
            occurred_at: Utc::now(),
        }
    }

    /// Build from the detector's descriptor, falling back to the kind's
    /// default text at full confidence when there is none
    pub fn from_descriptor(
        device_id: impl Into<String>,
        kind: HazardKind,
        descriptor: Option<&HazardDescriptor>,
    ) -> Self {
        match descriptor {
            Some(d) => Self::new(device_id, kind, d.message.clone(), d.confidence, d.region.clone()),
            None => Self::new(device_id, kind, kind.default_message(), 1.0, None),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Handling state of a stored alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    Pending,
    Acknowledged,
    Resolved,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmStatus::Pending => "pending",
            AlarmStatus::Acknowledged => "acknowledged",
            AlarmStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlarmStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AlarmStatus::Pending),
            "acknowledged" => Ok(AlarmStatus::Acknowledged),
            "resolved" => Ok(AlarmStatus::Resolved),
            other => Err(StorageError::SerializationError(format!("unknown alarm status: {}", other))),
        }
    }
}

/// Alarm row as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: i64,
    pub device_id: String,
    pub alarm_type: String,
    pub severity: String,
    pub description: String,
    pub confidence: f64,
    pub region: Option<Region>,
    pub evidence_path: Option<String>,
    pub status: AlarmStatus,
    pub occurred_at: DateTime<Utc>,
    pub handled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_descriptor() {
        let descriptor = HazardDescriptor::new(HazardKind::NoHelmet, "no helmet on scaffold", 0.87)
            .with_region(Region::Rect { x1: 1.0, y1: 2.0, x2: 3.0, y2: 4.0 });
        let event = AlarmEvent::from_descriptor("cam-1", HazardKind::NoHelmet, Some(&descriptor));

        assert_eq!(event.device_id, "cam-1");
        assert_eq!(event.message, "no helmet on scaffold");
        assert_eq!(event.severity, Severity::High);
        assert!(event.region.is_some());
    }

    #[test]
    fn test_default_message_without_descriptor() {
        let event = AlarmEvent::from_descriptor("cam-1", HazardKind::OffPost, None);
        assert_eq!(event.message, HazardKind::OffPost.default_message());
        assert_eq!(event.confidence, 1.0);
        assert_eq!(event.severity, Severity::Critical);
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [AlarmStatus::Pending, AlarmStatus::Acknowledged, AlarmStatus::Resolved] {
            assert_eq!(status.as_str().parse::<AlarmStatus>().unwrap(), status);
        }
        assert!("closed".parse::<AlarmStatus>().is_err());
    }
}
