//! EventBus - Cross-Component Signaling
//!
//! ## Responsibilities
//!
//! - In-process pub/sub between pollers, retriever and reconciler
//! - Carries the named station events (`inspectionDataUpdate`,
//!   `presentationImagesUpdated`, `presentationImagesReady`,
//!   `inspectionSaved`), each with an inspection id payload
//!
//! Replaces ad-hoc global callbacks with an explicit broadcast channel;
//! subscribers that lag simply miss events, which is acceptable because
//! every consumer re-reconciles from ids rather than event history.

use crate::models::PresentationImage;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity. Events are small and consumers are fast;
/// 64 outstanding events means something is already badly wrong.
const DEFAULT_CAPACITY: usize = 64;

/// Station event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StationEvent {
    /// New inspection data observed (e.g., by a sensor poll tick)
    #[serde(rename = "inspectionDataUpdate")]
    InspectionDataUpdate { inspection_id: i64 },

    /// Presentation images for an inspection were fetched
    #[serde(rename = "presentationImagesUpdated")]
    PresentationImagesUpdated {
        inspection_id: i64,
        images: Vec<PresentationImage>,
    },

    /// Backend signalled that presentation images are ready to fetch
    #[serde(rename = "presentationImagesReady")]
    PresentationImagesReady { inspection_id: i64 },

    /// Backend saved an inspection pass (e.g., pass_L_to_R)
    #[serde(rename = "inspectionSaved")]
    InspectionSaved {
        inspection_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
    },
}

impl StationEvent {
    /// Event name for logging, matching the wire-contract names
    pub fn name(&self) -> &'static str {
        match self {
            StationEvent::InspectionDataUpdate { .. } => "inspectionDataUpdate",
            StationEvent::PresentationImagesUpdated { .. } => "presentationImagesUpdated",
            StationEvent::PresentationImagesReady { .. } => "presentationImagesReady",
            StationEvent::InspectionSaved { .. } => "inspectionSaved",
        }
    }

    /// Inspection id carried by this event
    pub fn inspection_id(&self) -> i64 {
        match self {
            StationEvent::InspectionDataUpdate { inspection_id }
            | StationEvent::PresentationImagesUpdated { inspection_id, .. }
            | StationEvent::PresentationImagesReady { inspection_id }
            | StationEvent::InspectionSaved { inspection_id, .. } => *inspection_id,
        }
    }
}

/// EventBus instance
pub struct EventBus {
    tx: broadcast::Sender<StationEvent>,
}

impl EventBus {
    /// Create a new bus
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all station events
    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: StationEvent) {
        tracing::debug!(
            event = %event.name(),
            inspection_id = event.inspection_id(),
            "Publishing station event"
        );

        // Send fails only when there are no subscribers; that is fine
        // during startup/teardown.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
