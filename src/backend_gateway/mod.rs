//! BackendGateway - Inspection Backend Communication Adapter
//!
//! ## Responsibilities
//!
//! - Camera lifecycle endpoints (connect/disconnect/start/stop/snapshot)
//! - Sensor/inspection status and command endpoints
//! - Inspection result and presentation image retrieval
//! - HTTP status classification into the error taxonomy
//!
//! The `InspectionBackend` trait is the seam used by the pollers, the
//! camera manager and the reconciler; tests substitute an in-memory mock.

use crate::error::{Error, Result};
use crate::models::{
    CameraType, InspectionResultRecord, LatestPresentationImages, MonitoringStartResponse,
    PresentationImagesResponse, SensorStatus, SnapshotResponse,
};
use async_trait::async_trait;
use std::time::Duration;

/// Backend endpoints consumed by the station, request shape only.
#[async_trait]
pub trait InspectionBackend: Send + Sync {
    async fn camera_connect(&self, camera_type: CameraType) -> Result<()>;
    async fn camera_disconnect(&self) -> Result<()>;
    async fn camera_start(&self) -> Result<()>;
    async fn camera_stop(&self) -> Result<()>;
    async fn camera_is_connected(&self) -> Result<bool>;
    async fn camera_snapshot(&self) -> Result<SnapshotResponse>;

    async fn sensor_status(&self) -> Result<SensorStatus>;
    async fn sensor_start(&self, ai_threshold: u32) -> Result<MonitoringStartResponse>;
    async fn sensor_stop(&self) -> Result<()>;
    async fn trigger_test(&self) -> Result<()>;
    async fn toggle_sensor_a(&self) -> Result<()>;
    async fn toggle_sensor_b(&self) -> Result<()>;
    async fn set_ai_threshold(&self, threshold: u32) -> Result<()>;

    async fn inspection_result(&self, inspection_id: i64) -> Result<InspectionResultRecord>;
    async fn presentation_images(&self, inspection_id: i64) -> Result<PresentationImagesResponse>;
    async fn latest_presentation_images(&self) -> Result<LatestPresentationImages>;

    /// Fire-and-forget fetch to warm the image cache before display
    async fn preload_image(&self, image_path: &str) -> Result<()>;
}

/// HTTP implementation of `InspectionBackend`
pub struct BackendGateway {
    client: reqwest::Client,
    base_url: String,
}

impl BackendGateway {
    /// Create a new gateway
    ///
    /// # Arguments
    /// * `base_url` - Backend base URL (e.g., http://localhost:8000)
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST with no body; non-success statuses become classified errors.
    async fn post_empty(&self, path: &str) -> Result<()> {
        let resp = self.client.post(self.url(path)).send().await?;
        if !resp.status().is_success() {
            return Err(Error::from_status(resp.status(), path));
        }
        Ok(())
    }

    /// GET returning JSON; decode failures surface as data errors.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.client.get(self.url(path)).send().await?;
        if !resp.status().is_success() {
            return Err(Error::from_status(resp.status(), path));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::Data(format!("{}: malformed response: {}", path, e)))
    }
}

#[async_trait]
impl InspectionBackend for BackendGateway {
    async fn camera_connect(&self, camera_type: CameraType) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/camera/connect"))
            .json(&serde_json::json!({ "type": camera_type.as_str() }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::from_status(resp.status(), "/camera/connect"));
        }
        Ok(())
    }

    async fn camera_disconnect(&self) -> Result<()> {
        self.post_empty("/camera/disconnect").await
    }

    async fn camera_start(&self) -> Result<()> {
        self.post_empty("/camera/start").await
    }

    async fn camera_stop(&self) -> Result<()> {
        self.post_empty("/camera/stop").await
    }

    async fn camera_is_connected(&self) -> Result<bool> {
        #[derive(serde::Deserialize)]
        struct Connected {
            #[serde(default)]
            connected: bool,
        }
        let resp: Connected = self.get_json("/camera/is_connected").await?;
        Ok(resp.connected)
    }

    async fn camera_snapshot(&self) -> Result<SnapshotResponse> {
        self.get_json("/camera/snapshot").await
    }

    async fn sensor_status(&self) -> Result<SensorStatus> {
        self.get_json("/sensor-inspection/status").await
    }

    async fn sensor_start(&self, ai_threshold: u32) -> Result<MonitoringStartResponse> {
        let resp = self
            .client
            .post(self.url("/sensor-inspection/start"))
            .json(&serde_json::json!({ "ai_threshold": ai_threshold }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::from_status(resp.status(), "/sensor-inspection/start"));
        }
        resp.json::<MonitoringStartResponse>()
            .await
            .map_err(|e| Error::Data(format!("/sensor-inspection/start: malformed response: {}", e)))
    }

    async fn sensor_stop(&self) -> Result<()> {
        self.post_empty("/sensor-inspection/stop").await
    }

    async fn trigger_test(&self) -> Result<()> {
        self.post_empty("/sensor-inspection/trigger-test").await
    }

    async fn toggle_sensor_a(&self) -> Result<()> {
        self.post_empty("/sensor-inspection/toggle-sensor-a").await
    }

    async fn toggle_sensor_b(&self) -> Result<()> {
        self.post_empty("/sensor-inspection/toggle-sensor-b").await
    }

    async fn set_ai_threshold(&self, threshold: u32) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/sensor-inspection/set-ai-threshold"))
            .json(&serde_json::json!({ "threshold": threshold }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::from_status(
                resp.status(),
                "/sensor-inspection/set-ai-threshold",
            ));
        }
        Ok(())
    }

    async fn inspection_result(&self, inspection_id: i64) -> Result<InspectionResultRecord> {
        self.get_json(&format!(
            "/sensor-inspection/inspection-result/{}",
            inspection_id
        ))
        .await
    }

    async fn presentation_images(&self, inspection_id: i64) -> Result<PresentationImagesResponse> {
        self.get_json(&format!(
            "/inspections/presentation-images?id={}",
            inspection_id
        ))
        .await
    }

    async fn latest_presentation_images(&self) -> Result<LatestPresentationImages> {
        self.get_json("/inspections/latest-presentation-images").await
    }

    async fn preload_image(&self, image_path: &str) -> Result<()> {
        let url = if image_path.starts_with("http://") || image_path.starts_with("https://") {
            image_path.to_string()
        } else {
            self.url(image_path)
        };

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::from_status(resp.status(), image_path));
        }
        // Drain the body so the transfer completes and the cache warms
        let _ = resp.bytes().await?;
        Ok(())
    }
}
