//! Shared models and types for the inspection station
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of presentation image groups per inspection (A..E)
pub const MAX_IMAGE_GROUPS: u32 = 5;

/// Camera hardware type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraType {
    Webcam,
    Usb,
    Basler,
}

impl CameraType {
    /// Convert to string for logging/serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraType::Webcam => "webcam",
            CameraType::Usb => "usb",
            CameraType::Basler => "basler",
        }
    }
}

/// Camera connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Erroring,
}

/// Immutable error value attached to a camera session.
/// Cleared on the next successful frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CameraError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// One camera session. Exactly one exists at a time, owned by the
/// connection manager; destroyed and recreated on type switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSession {
    pub camera_type: CameraType,
    pub connection_state: ConnectionState,
    pub poll_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<CameraError>,
    pub retry_count: u32,
}

impl CameraSession {
    pub fn new(camera_type: CameraType, poll_interval_ms: u64) -> Self {
        Self {
            camera_type,
            connection_state: ConnectionState::Disconnected,
            poll_interval_ms,
            last_error: None,
            retry_count: 0,
        }
    }
}

/// Snapshot endpoint response. `status` carries camera-side failure
/// markers ("error", "disconnected", "no_frame") when no frame is
/// available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    /// Base64-encoded JPEG frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One raw detection from the inspection backend.
///
/// `error_type`: 0 = discoloration, 1 = hole, 2..=5 = knot variants
/// (dead / tight-dead / tight-live / live).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub error_type: u8,
    /// Defect length in millimeters
    #[serde(default)]
    pub length_mm: f64,
}

/// Per-inspection defect record from `inspection-result/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResultRecord {
    pub inspection_id: i64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Embedded inspection reference carried by a sensor status tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionData {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_threshold: Option<u32>,
}

/// Aggregate sensor/inspection status produced by each poll tick.
///
/// Optional fields distinguish "no new data this tick" (absent) from an
/// explicitly cleared value; the poller retains the previous value when a
/// field is transiently absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub active: bool,
    #[serde(default)]
    pub sensor_a: bool,
    #[serde(default)]
    pub sensor_b: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
    #[serde(default)]
    pub simulation_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_data: Option<InspectionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_results: Option<InspectionResultRecord>,
    #[serde(default)]
    pub results_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_error: Option<String>,
}

impl SensorStatus {
    /// Inspection id embedded in this tick, preferring the result record
    pub fn embedded_inspection_id(&self) -> Option<i64> {
        self.inspection_results
            .as_ref()
            .map(|r| r.inspection_id)
            .or_else(|| self.inspection_data.as_ref().map(|d| d.id))
    }
}

/// Presentation image bucket (up to five representative images per pass)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImageGroup {
    A,
    B,
    C,
    D,
    E,
}

impl ImageGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageGroup::A => "A",
            ImageGroup::B => "B",
            ImageGroup::C => "C",
            ImageGroup::D => "D",
            ImageGroup::E => "E",
        }
    }

    /// Expected group count for an inspection: min(5, total source images)
    pub fn expected_count(total_source_images: u32) -> u32 {
        total_source_images.min(MAX_IMAGE_GROUPS)
    }
}

/// One presentation image belonging to exactly one inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationImage {
    pub id: i64,
    pub inspection_id: i64,
    pub group_name: ImageGroup,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}

/// Response of `presentation-images?id=...`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresentationImagesResponse {
    #[serde(default)]
    pub images: Vec<PresentationImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_source_images: Option<u32>,
}

/// Response of `latest-presentation-images`, used as the tie-break
/// source of truth during reconciliation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestPresentationImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_id: Option<i64>,
    #[serde(default)]
    pub images: Vec<PresentationImage>,
}

/// Response of `sensor-inspection/start`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringStartResponse {
    /// True when physical camera hardware was unavailable and the backend
    /// fell back to simulation mode
    #[serde(default)]
    pub simulation_mode: bool,
}

/// Display status of the current inspection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Idle,
    Searching,
    Processing,
    Stopped,
}

impl Default for InspectionStatus {
    fn default() -> Self {
        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_group_count() {
        assert_eq!(ImageGroup::expected_count(0), 0);
        assert_eq!(ImageGroup::expected_count(3), 3);
        assert_eq!(ImageGroup::expected_count(5), 5);
        assert_eq!(ImageGroup::expected_count(12), 5);
    }

    #[test]
    fn test_embedded_inspection_id_prefers_results() {
        let status = SensorStatus {
            active: true,
            sensor_a: false,
            sensor_b: false,
            current_state: None,
            simulation_mode: false,
            capture_status: None,
            inspection_data: Some(InspectionData {
                id: 7,
                ai_threshold: None,
            }),
            inspection_results: Some(InspectionResultRecord {
                inspection_id: 9,
                detections: vec![],
            }),
            results_loading: false,
            results_error: None,
        };
        assert_eq!(status.embedded_inspection_id(), Some(9));
    }

    #[test]
    fn test_sensor_status_tolerates_sparse_json() {
        let status: SensorStatus = serde_json::from_str(r#"{"active": true}"#).unwrap();
        assert!(status.active);
        assert!(status.inspection_data.is_none());
        assert!(status.capture_status.is_none());
    }
}
