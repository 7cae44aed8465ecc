use crate::file::{Disk, OwnerId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Event names - centralized for consistency
pub mod event_names {
    pub const UPLOAD_PROGRESS: &str = "upload:progress";
    pub const UPLOAD_COMPLETED: &str = "upload:completed";
    pub const UPLOAD_FAILED: &str = "upload:failed";
}

/// Phase of an object-storage upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    Preparing,
    Uploading,
    Finalizing,
    Completed,
    Failed,
}

/// Progress of one upload, addressed to subscribers of `owner_id` + `session_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressEvent {
    pub owner_id: OwnerId,
    pub session_id: Option<String>,
    pub disk: Disk,
    pub filename: String,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    pub percentage: f64,
    /// Bytes per second since the upload started
    pub speed_bps: f64,
    pub eta_seconds: Option<f64>,
    pub phase: UploadPhase,
    pub timestamp: String,
}

impl UploadProgressEvent {
    /// Channel subscribers listen on for this upload's progress
    pub fn channel(&self) -> String {
        progress_channel(&self.owner_id, self.session_id.as_deref())
    }

    pub fn event_name(&self) -> &'static str {
        match self.phase {
            UploadPhase::Completed => event_names::UPLOAD_COMPLETED,
            UploadPhase::Failed => event_names::UPLOAD_FAILED,
            _ => event_names::UPLOAD_PROGRESS,
        }
    }
}

pub fn progress_channel(owner_id: &OwnerId, session_id: Option<&str>) -> String {
    match session_id {
        Some(session_id) => format!("uploads.{}.{}", owner_id, session_id),
        None => format!("uploads.{}", owner_id),
    }
}

/// Percentage, speed and ETA for a progress snapshot
pub fn progress_figures(bytes_uploaded: u64, total_bytes: u64, elapsed_secs: f64) -> (f64, f64, Option<f64>) {
    let percentage = if total_bytes == 0 {
        100.0
    } else {
        (bytes_uploaded as f64 / total_bytes as f64 * 100.0).min(100.0)
    };
    let speed = if elapsed_secs > 0.0 {
        bytes_uploaded as f64 / elapsed_secs
    } else {
        0.0
    };
    let eta = if speed > 0.0 {
        Some(total_bytes.saturating_sub(bytes_uploaded) as f64 / speed)
    } else {
        None
    };
    (percentage, speed, eta)
}

/// Transport for progress events; delivery is owned by the host application
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: UploadProgressEvent);
}

/// Drops every event
#[derive(Debug, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn publish(&self, _event: UploadProgressEvent) {}
}

/// Keeps every event in memory, in publish order
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: Mutex<Vec<UploadProgressEvent>>,
}

impl CollectingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UploadProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events for one subscriber channel
    pub fn events_for(&self, owner_id: &OwnerId, session_id: Option<&str>) -> Vec<UploadProgressEvent> {
        let channel = progress_channel(owner_id, session_id);
        self.events()
            .into_iter()
            .filter(|event| event.channel() == channel)
            .collect()
    }
}

impl ProgressSink for CollectingProgressSink {
    fn publish(&self, event: UploadProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(phase: UploadPhase, session_id: Option<&str>) -> UploadProgressEvent {
        UploadProgressEvent {
            owner_id: OwnerId::new("user-1"),
            session_id: session_id.map(str::to_string),
            disk: Disk::S3,
            filename: "a.jpg".to_string(),
            bytes_uploaded: 50,
            total_bytes: 100,
            percentage: 50.0,
            speed_bps: 10.0,
            eta_seconds: Some(5.0),
            phase,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_channel() {
        assert_eq!(event(UploadPhase::Uploading, Some("abc")).channel(), "uploads.user-1.abc");
        assert_eq!(event(UploadPhase::Uploading, None).channel(), "uploads.user-1");
    }

    #[test]
    fn test_event_name_by_phase() {
        assert_eq!(event(UploadPhase::Uploading, None).event_name(), event_names::UPLOAD_PROGRESS);
        assert_eq!(event(UploadPhase::Completed, None).event_name(), event_names::UPLOAD_COMPLETED);
        assert_eq!(event(UploadPhase::Failed, None).event_name(), event_names::UPLOAD_FAILED);
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let json = serde_json::to_value(event(UploadPhase::Uploading, Some("abc"))).unwrap();
        assert_eq!(json["bytesUploaded"], 50);
        assert_eq!(json["sessionId"], "abc");
        assert_eq!(json["phase"], "uploading");
    }

    #[test]
    fn test_progress_figures() {
        let (percentage, speed, eta) = progress_figures(25, 100, 5.0);
        assert_eq!(percentage, 25.0);
        assert_eq!(speed, 5.0);
        assert_eq!(eta, Some(15.0));

        let (percentage, _, eta) = progress_figures(0, 0, 0.0);
        assert_eq!(percentage, 100.0);
        assert_eq!(eta, None);
    }

    #[test]
    fn test_collecting_sink_filters_by_channel() {
        let sink = CollectingProgressSink::new();
        sink.publish(event(UploadPhase::Uploading, Some("abc")));
        sink.publish(event(UploadPhase::Uploading, Some("other")));

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events_for(&OwnerId::new("user-1"), Some("abc")).len(), 1);
    }
}
