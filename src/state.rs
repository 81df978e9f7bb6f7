//! Application state
//!
//! Holds all shared components plus the station-level monitoring
//! operations that drive them together.

use crate::backend_gateway::InspectionBackend;
use crate::camera_manager::{CameraConnectionManager, CameraManagerConfig};
use crate::error::Result;
use crate::event_bus::EventBus;
use crate::image_retriever::PresentationImageRetriever;
use crate::models::CameraType;
use crate::notification::NotificationCenter;
use crate::reconciler::InspectionResultReconciler;
use crate::sensor_poller::SensorStatusPoller;
use std::sync::Arc;
use std::time::Duration;

/// AI threshold bounds (confidence cutoff treated as a defect)
pub const AI_THRESHOLD_MIN: u32 = 10;
pub const AI_THRESHOLD_MAX: u32 = 100;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Backend base URL
    pub backend_url: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Initial camera type
    pub camera_type: CameraType,
    /// Normal frame polling interval
    pub camera_poll_interval: Duration,
    /// Cadence multiplier while hardware-disconnected
    pub slow_poll_multiplier: u32,
    /// Delay between camera stop and start on a type switch
    pub settling_delay: Duration,
    /// Sensor status polling interval
    pub sensor_poll_interval: Duration,
    /// Presentation image polling interval
    pub image_poll_interval: Duration,
    /// Initial AI threshold
    pub ai_threshold: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            request_timeout: Duration::from_secs(
                env_u64("REQUEST_TIMEOUT_SEC", 10),
            ),
            camera_type: match std::env::var("CAMERA_TYPE").as_deref() {
                Ok("usb") => CameraType::Usb,
                Ok("basler") => CameraType::Basler,
                _ => CameraType::Webcam,
            },
            camera_poll_interval: Duration::from_millis(env_u64("CAMERA_POLL_INTERVAL_MS", 200)),
            slow_poll_multiplier: env_u64("CAMERA_SLOW_POLL_MULTIPLIER", 5) as u32,
            settling_delay: Duration::from_millis(env_u64("CAMERA_SETTLING_DELAY_MS", 500)),
            sensor_poll_interval: Duration::from_millis(env_u64("SENSOR_POLL_INTERVAL_MS", 1_000)),
            image_poll_interval: Duration::from_millis(env_u64("IMAGE_POLL_INTERVAL_MS", 1_000)),
            ai_threshold: env_u64("AI_THRESHOLD", 50) as u32,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Clamp a threshold into the accepted 10..=100 range
pub fn clamp_ai_threshold(threshold: u32) -> u32 {
    threshold.clamp(AI_THRESHOLD_MIN, AI_THRESHOLD_MAX)
}

/// Application state shared across tasks
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Backend gateway
    pub backend: Arc<dyn InspectionBackend>,
    /// EventBus (cross-component signaling)
    pub bus: Arc<EventBus>,
    /// NotificationCenter (user-visible messages)
    pub notifications: Arc<NotificationCenter>,
    /// CameraConnectionManager
    pub camera: Arc<CameraConnectionManager>,
    /// PresentationImageRetriever
    pub retriever: Arc<PresentationImageRetriever>,
    /// InspectionResultReconciler (single source of truth for display)
    pub reconciler: Arc<InspectionResultReconciler>,
    /// SensorStatusPoller
    pub sensor_poller: Arc<SensorStatusPoller>,
}

impl AppState {
    /// Wire all components around a backend implementation
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn InspectionBackend>,
        notifications: Arc<NotificationCenter>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());

        let camera = Arc::new(CameraConnectionManager::new(
            backend.clone(),
            notifications.clone(),
            CameraManagerConfig {
                poll_interval: config.camera_poll_interval,
                slow_poll_multiplier: config.slow_poll_multiplier,
                settling_delay: config.settling_delay,
            },
        ));

        let retriever = Arc::new(PresentationImageRetriever::new(
            backend.clone(),
            bus.clone(),
            config.image_poll_interval,
        ));

        let reconciler = Arc::new(InspectionResultReconciler::new(
            backend.clone(),
            retriever.clone(),
        ));

        let sensor_poller = Arc::new(SensorStatusPoller::new(
            backend.clone(),
            reconciler.clone(),
        ));

        Self {
            config,
            backend,
            bus,
            notifications,
            camera,
            retriever,
            reconciler,
            sensor_poller,
        }
    }

    /// Start a monitoring session: clear previous results, start sensor
    /// inspection on the backend and begin status polling. When the
    /// physical camera is unavailable the backend falls back to
    /// simulation mode; that queues a warning but polling still begins.
    pub async fn start_monitoring(&self, ai_threshold: u32) -> Result<bool> {
        let threshold = clamp_ai_threshold(ai_threshold);
        self.reconciler.start_session(threshold);

        let resp = self.backend.sensor_start(threshold).await?;
        if resp.simulation_mode {
            tracing::warn!("Backend started in simulation mode (camera unavailable)");
            self.notifications
                .warning("カメラが利用できないため、シミュレーションモードで起動しました");
        }

        self.sensor_poller.start(self.config.sensor_poll_interval);
        tracing::info!(ai_threshold = threshold, "Monitoring started");
        Ok(resp.simulation_mode)
    }

    /// Stop the monitoring session
    pub async fn stop_monitoring(&self) -> Result<()> {
        self.sensor_poller.stop();
        self.retriever.cancel();
        self.backend.sensor_stop().await?;
        tracing::info!("Monitoring stopped");
        Ok(())
    }

    /// Update the AI threshold on the backend (clamped to 10..=100)
    pub async fn set_ai_threshold(&self, threshold: u32) -> Result<()> {
        let threshold = clamp_ai_threshold(threshold);
        self.backend.set_ai_threshold(threshold).await?;
        self.reconciler.update_threshold(threshold);
        tracing::info!(ai_threshold = threshold, "AI threshold updated");
        Ok(())
    }

    /// Fire a test trigger on the backend
    pub async fn trigger_test(&self) -> Result<()> {
        self.backend.trigger_test().await
    }

    /// Toggle sensor A
    pub async fn toggle_sensor_a(&self) -> Result<()> {
        self.backend.toggle_sensor_a().await
    }

    /// Toggle sensor B
    pub async fn toggle_sensor_b(&self) -> Result<()> {
        self.backend.toggle_sensor_b().await
    }

    /// Synchronous teardown of every long-lived loop; best-effort async
    /// cleanup is dispatched by the components themselves.
    pub fn shutdown(&self) {
        self.sensor_poller.stop();
        self.retriever.cancel();
        self.camera.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_ai_threshold() {
        assert_eq!(clamp_ai_threshold(5), 10);
        assert_eq!(clamp_ai_threshold(50), 50);
        assert_eq!(clamp_ai_threshold(100), 100);
        assert_eq!(clamp_ai_threshold(250), 100);
    }
}
