//! Shared test support: an in-memory backend with scripted responses
//! and a recorded call log.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use inspection_station::backend_gateway::InspectionBackend;
use inspection_station::error::{Error, Result};
use inspection_station::models::{
    CameraType, Detection, ImageGroup, InspectionResultRecord, LatestPresentationImages,
    MonitoringStartResponse, PresentationImage, PresentationImagesResponse, SensorStatus,
    SnapshotResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted in-memory backend
#[derive(Default)]
pub struct MockBackend {
    /// Ordered log of every endpoint call
    pub calls: Mutex<Vec<String>>,

    /// Scripted sensor statuses, popped per poll; the last one repeats
    pub sensor_statuses: Mutex<VecDeque<SensorStatus>>,
    /// Simulated sensor request latency
    pub sensor_delay: Mutex<Duration>,
    pub sensor_calls: AtomicUsize,
    sensor_concurrent: AtomicUsize,
    pub sensor_max_concurrent: AtomicUsize,

    /// Scripted presentation image responses per inspection id; the last
    /// one repeats
    pub images_by_id: Mutex<HashMap<i64, VecDeque<PresentationImagesResponse>>>,
    /// Simulated image request latency
    pub images_delay: Mutex<Duration>,
    pub image_calls: AtomicUsize,

    pub latest: Mutex<LatestPresentationImages>,
    /// Simulated latest-lookup latency
    pub latest_delay: Mutex<Duration>,
    pub results: Mutex<HashMap<i64, InspectionResultRecord>>,

    /// Simulated camera connect latency
    pub connect_delay: Mutex<Duration>,
    /// Backend-side camera connection flag driven by connect/disconnect
    pub connected_state: AtomicBool,

    /// Snapshot outcome: None means a good frame, Some(message) is a
    /// network failure
    pub snapshot_error: Mutex<Option<String>>,
    pub snapshot_calls: AtomicUsize,

    pub start_response: Mutex<MonitoringStartResponse>,
    pub preloaded: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn push_sensor_status(&self, status: SensorStatus) {
        self.sensor_statuses.lock().unwrap().push_back(status);
    }

    pub fn script_images(&self, inspection_id: i64, responses: Vec<PresentationImagesResponse>) {
        self.images_by_id
            .lock()
            .unwrap()
            .insert(inspection_id, responses.into());
    }

    pub fn set_latest(&self, inspection_id: Option<i64>, images: Vec<PresentationImage>) {
        *self.latest.lock().unwrap() = LatestPresentationImages {
            inspection_id,
            images,
        };
    }

    pub fn set_result(&self, inspection_id: i64, detections: Vec<Detection>) {
        self.results.lock().unwrap().insert(
            inspection_id,
            InspectionResultRecord {
                inspection_id,
                detections,
            },
        );
    }

    pub fn fail_snapshots(&self, message: &str) {
        *self.snapshot_error.lock().unwrap() = Some(message.to_string());
    }
}

/// Build a sensor status with the given activity and embedded id
pub fn status(active: bool, inspection_id: Option<i64>) -> SensorStatus {
    SensorStatus {
        active,
        sensor_a: false,
        sensor_b: false,
        current_state: Some("searching".to_string()),
        simulation_mode: false,
        capture_status: None,
        inspection_data: inspection_id.map(|id| inspection_station::models::InspectionData {
            id,
            ai_threshold: None,
        }),
        inspection_results: None,
        results_loading: false,
        results_error: None,
    }
}

/// Build the five-group image set for an inspection
pub fn full_image_set(inspection_id: i64) -> Vec<PresentationImage> {
    [
        ImageGroup::A,
        ImageGroup::B,
        ImageGroup::C,
        ImageGroup::D,
        ImageGroup::E,
    ]
    .iter()
    .enumerate()
    .map(|(i, group)| PresentationImage {
        id: inspection_id * 10 + i as i64,
        inspection_id,
        group_name: *group,
        image_path: format!("/images/{}/{}.jpg", inspection_id, group.as_str()),
        created_at: Utc::now(),
    })
    .collect()
}

/// Fully wired component set around a [`MockBackend`]
pub struct Harness {
    pub mock: Arc<MockBackend>,
    pub bus: Arc<inspection_station::event_bus::EventBus>,
    pub notifications: Arc<inspection_station::notification::NotificationCenter>,
    pub notification_rx:
        tokio::sync::mpsc::UnboundedReceiver<inspection_station::notification::Notification>,
    pub retriever: Arc<inspection_station::image_retriever::PresentationImageRetriever>,
    pub reconciler: Arc<inspection_station::reconciler::InspectionResultReconciler>,
    pub poller: Arc<inspection_station::sensor_poller::SensorStatusPoller>,
    pub camera: Arc<inspection_station::camera_manager::CameraConnectionManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_image_interval(Duration::from_millis(1_000))
    }

    pub fn with_image_interval(image_interval: Duration) -> Self {
        use inspection_station::camera_manager::{CameraConnectionManager, CameraManagerConfig};
        use inspection_station::event_bus::EventBus;
        use inspection_station::image_retriever::PresentationImageRetriever;
        use inspection_station::notification::NotificationCenter;
        use inspection_station::reconciler::InspectionResultReconciler;
        use inspection_station::sensor_poller::SensorStatusPoller;

        let mock = Arc::new(MockBackend::new());
        let backend: Arc<dyn InspectionBackend> = mock.clone();
        let bus = Arc::new(EventBus::new());
        let (notifications, notification_rx) = NotificationCenter::new();
        let notifications = Arc::new(notifications);

        let retriever = Arc::new(PresentationImageRetriever::new(
            backend.clone(),
            bus.clone(),
            image_interval,
        ));
        let reconciler = Arc::new(InspectionResultReconciler::new(
            backend.clone(),
            retriever.clone(),
        ));
        let poller = Arc::new(SensorStatusPoller::new(backend.clone(), reconciler.clone()));
        let camera = Arc::new(CameraConnectionManager::new(
            backend.clone(),
            notifications.clone(),
            CameraManagerConfig::default(),
        ));

        Self {
            mock,
            bus,
            notifications,
            notification_rx,
            retriever,
            reconciler,
            poller,
            camera,
        }
    }
}

#[async_trait]
impl InspectionBackend for MockBackend {
    async fn camera_connect(&self, camera_type: CameraType) -> Result<()> {
        self.record(format!("camera_connect:{}", camera_type.as_str()));
        let delay = *self.connect_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        self.connected_state.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn camera_disconnect(&self) -> Result<()> {
        self.record("camera_disconnect");
        self.connected_state.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn camera_start(&self) -> Result<()> {
        self.record("camera_start");
        Ok(())
    }

    async fn camera_stop(&self) -> Result<()> {
        self.record("camera_stop");
        Ok(())
    }

    async fn camera_is_connected(&self) -> Result<bool> {
        self.record("camera_is_connected");
        Ok(self.connected_state.load(Ordering::SeqCst))
    }

    async fn camera_snapshot(&self) -> Result<SnapshotResponse> {
        self.record("camera_snapshot");
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        match self.snapshot_error.lock().unwrap().clone() {
            None => Ok(SnapshotResponse {
                image: Some("ZnJhbWU=".to_string()),
                status: None,
            }),
            Some(message) => Err(Error::Network(message)),
        }
    }

    async fn sensor_status(&self) -> Result<SensorStatus> {
        self.record("sensor_status");
        self.sensor_calls.fetch_add(1, Ordering::SeqCst);

        let concurrent = self.sensor_concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.sensor_max_concurrent
            .fetch_max(concurrent, Ordering::SeqCst);

        let delay = *self.sensor_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        self.sensor_concurrent.fetch_sub(1, Ordering::SeqCst);

        let mut statuses = self.sensor_statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        next.ok_or_else(|| Error::Api("no scripted sensor status".to_string()))
    }

    async fn sensor_start(&self, ai_threshold: u32) -> Result<MonitoringStartResponse> {
        self.record(format!("sensor_start:{}", ai_threshold));
        Ok(self.start_response.lock().unwrap().clone())
    }

    async fn sensor_stop(&self) -> Result<()> {
        self.record("sensor_stop");
        Ok(())
    }

    async fn trigger_test(&self) -> Result<()> {
        self.record("trigger_test");
        Ok(())
    }

    async fn toggle_sensor_a(&self) -> Result<()> {
        self.record("toggle_sensor_a");
        Ok(())
    }

    async fn toggle_sensor_b(&self) -> Result<()> {
        self.record("toggle_sensor_b");
        Ok(())
    }

    async fn set_ai_threshold(&self, threshold: u32) -> Result<()> {
        self.record(format!("set_ai_threshold:{}", threshold));
        Ok(())
    }

    async fn inspection_result(&self, inspection_id: i64) -> Result<InspectionResultRecord> {
        self.record(format!("inspection_result:{}", inspection_id));
        self.results
            .lock()
            .unwrap()
            .get(&inspection_id)
            .cloned()
            .ok_or_else(|| Error::Api(format!("no result for inspection {}", inspection_id)))
    }

    async fn presentation_images(&self, inspection_id: i64) -> Result<PresentationImagesResponse> {
        self.record(format!("presentation_images:{}", inspection_id));
        self.image_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.images_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }

        let mut by_id = self.images_by_id.lock().unwrap();
        let responses = by_id.entry(inspection_id).or_default();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }

    async fn latest_presentation_images(&self) -> Result<LatestPresentationImages> {
        self.record("latest_presentation_images");
        let delay = *self.latest_delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn preload_image(&self, image_path: &str) -> Result<()> {
        self.preloaded.lock().unwrap().push(image_path.to_string());
        Ok(())
    }
}
