//! Inspection Station Client Library
//!
//! Client-side control logic for a real-time visual inspection station.
//!
//! ## Architecture (core components)
//!
//! 1. BackendGateway - HTTP adapter for camera/sensor/inspection endpoints
//! 2. CameraConnectionManager - camera session lifecycle with retry policy
//! 3. SensorStatusPoller - single-flight status polling with change detection
//! 4. PresentationImageRetriever - cancellable per-inspection image polling
//! 5. InspectionResultReconciler - single source of truth for the display
//! 6. EventBus - in-process pub/sub for the station event contract
//! 7. NotificationCenter - user-visible message queue
//!
//! ## Design Principles
//!
//! - The reconciler is the only writer of the current inspection id;
//!   every other component submits candidates
//! - Every long-lived loop is cancellable synchronously via a
//!   generation token checked at each async continuation
//! - Polling failures degrade to "keep last known good state"

pub mod backend_gateway;
pub mod camera_manager;
pub mod error;
pub mod event_bus;
pub mod image_retriever;
pub mod models;
pub mod notification;
pub mod reconciler;
pub mod sensor_poller;
pub mod state;

pub use error::{Error, ErrorKind, Result};
pub use state::{AppConfig, AppState};
