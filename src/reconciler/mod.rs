//! InspectionResultReconciler - Single Source of Truth for Display
//!
//! ## Responsibilities
//!
//! - Consume candidate "current inspection" facts from the sensor poller,
//!   the image retriever and saved/ready notifications, in arbitrary order
//! - Keep the displayed inspection id monotonic: a lower id never
//!   supersedes a displayed higher id except via explicit clear
//! - Tie-break stale-looking candidates against the backend's latest-id
//!   source of truth
//! - Derive the displayed result/defect labels from raw detections
//! - Drive the Idle/Searching/Processing/Stopped display status from
//!   sensor activity, independent of id reconciliation

mod classify;

pub use classify::{
    classify, is_defective, is_knot, Classification, DEFECT_DISCOLORATION, DEFECT_HOLE,
    DEFECT_HOLE_AND_DISCOLORATION, KNOT_LENGTH_THRESHOLD_MM, RESULT_KNOT, RESULT_KOBUSHI,
    RESULT_NO_DEFECT,
};

use crate::backend_gateway::InspectionBackend;
use crate::event_bus::{EventBus, StationEvent};
use crate::image_retriever::PresentationImageRetriever;
use crate::models::{Detection, InspectionStatus, PresentationImage, SensorStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Where a candidate came from, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    SensorPoll,
    DirectFetch,
    SavedNotification,
    ReadyNotification,
    ImageRetriever,
    LatestLookup,
}

impl CandidateSource {
    fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::SensorPoll => "sensor_poll",
            CandidateSource::DirectFetch => "direct_fetch",
            CandidateSource::SavedNotification => "saved_notification",
            CandidateSource::ReadyNotification => "ready_notification",
            CandidateSource::ImageRetriever => "image_retriever",
            CandidateSource::LatestLookup => "latest_lookup",
        }
    }
}

/// One candidate fact about the current inspection. Fields are `None`
/// when the channel carried no information about them this time, which
/// is different from carrying an empty value.
#[derive(Debug, Clone)]
pub struct InspectionCandidate {
    pub inspection_id: Option<i64>,
    pub detections: Option<Vec<Detection>>,
    pub images: Option<Vec<PresentationImage>>,
    pub source: CandidateSource,
}

impl InspectionCandidate {
    /// Candidate carrying only an id (e.g., a ready notification)
    pub fn bare(inspection_id: i64, source: CandidateSource) -> Self {
        Self {
            inspection_id: Some(inspection_id),
            detections: None,
            images: None,
            source,
        }
    }
}

/// The current inspection session as displayed: at most one exists,
/// owned by the reconciler, read by the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayState {
    pub inspection_id: Option<i64>,
    /// AI threshold the session was started with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub defect_type: String,
    pub images: Vec<PresentationImage>,
    pub images_loading: bool,
    pub status: InspectionStatus,
}

/// Display status transition driven by sensor activity and A/B triggers.
///
/// Stopped returns to Idle only through an explicit clear (new session
/// start), not through sensor state.
pub fn derive_status(
    active: bool,
    sensor_a: bool,
    sensor_b: bool,
    prev: InspectionStatus,
) -> InspectionStatus {
    if !active {
        return if prev == InspectionStatus::Idle {
            InspectionStatus::Idle
        } else {
            InspectionStatus::Stopped
        };
    }
    if sensor_a || sensor_b {
        InspectionStatus::Processing
    } else {
        InspectionStatus::Searching
    }
}

/// InspectionResultReconciler instance
pub struct InspectionResultReconciler {
    backend: Arc<dyn InspectionBackend>,
    retriever: Arc<PresentationImageRetriever>,
    display: watch::Sender<DisplayState>,
}

impl InspectionResultReconciler {
    pub fn new(
        backend: Arc<dyn InspectionBackend>,
        retriever: Arc<PresentationImageRetriever>,
    ) -> Self {
        let (display, _) = watch::channel(DisplayState::default());
        Self {
            backend,
            retriever,
            display,
        }
    }

    /// Watch the authoritative display tuple
    pub fn display_rx(&self) -> watch::Receiver<DisplayState> {
        self.display.subscribe()
    }

    /// Snapshot of the current display state
    pub fn display(&self) -> DisplayState {
        self.display.borrow().clone()
    }

    fn current_id(&self) -> Option<i64> {
        self.display.borrow().inspection_id
    }

    /// Submit one candidate. Candidates without an inspection id are
    /// dropped without touching state.
    pub async fn submit(&self, candidate: InspectionCandidate) {
        let Some(cand_id) = candidate.inspection_id else {
            tracing::warn!(
                source = %candidate.source.as_str(),
                "Candidate missing inspection id, dropped"
            );
            return;
        };

        match self.current_id() {
            None => {
                tracing::debug!(
                    inspection_id = cand_id,
                    source = %candidate.source.as_str(),
                    "Adopting first inspection candidate"
                );
                self.apply_adopt(cand_id, candidate);
            }
            Some(cur) if cand_id == cur => {
                self.apply_merge(cand_id, candidate);
            }
            Some(cur) if cand_id > cur => {
                tracing::info!(
                    inspection_id = cand_id,
                    previous_id = cur,
                    source = %candidate.source.as_str(),
                    "Newer inspection supersedes current display"
                );
                self.apply_supersede(cand_id, candidate);
            }
            Some(cur) => {
                // Apparently stale. Reconcile against the latest-id source
                // of truth before discarding: a lagging poll tick must not
                // hide that the backend has already moved further ahead.
                self.resolve_stale(cand_id, cur).await;
            }
        }
    }

    async fn resolve_stale(&self, cand_id: i64, cur: i64) {
        match self.backend.latest_presentation_images().await {
            Ok(latest) => match latest.inspection_id {
                Some(latest_id) if latest_id > cur => {
                    // Monotonicity against the live display id is enforced
                    // inside apply_supersede; the display may have advanced
                    // past `cur` while this lookup was in flight
                    tracing::info!(
                        inspection_id = latest_id,
                        previous_id = cur,
                        stale_candidate = cand_id,
                        "Latest-id lookup ahead of pre-lookup display"
                    );
                    let images = (!latest.images.is_empty()).then_some(latest.images);
                    self.apply_supersede(
                        latest_id,
                        InspectionCandidate {
                            inspection_id: Some(latest_id),
                            detections: None,
                            images,
                            source: CandidateSource::LatestLookup,
                        },
                    );
                }
                _ => {
                    tracing::debug!(
                        stale_candidate = cand_id,
                        current_id = cur,
                        "Stale candidate discarded (source of truth confirms)"
                    );
                }
            },
            Err(e) => {
                // Keep last known good state rather than act on an
                // unverified stale candidate
                tracing::warn!(
                    stale_candidate = cand_id,
                    error = %e,
                    "Latest-id lookup failed, stale candidate discarded"
                );
            }
        }
    }

    fn apply_adopt(&self, cand_id: i64, candidate: InspectionCandidate) {
        let mut needs_images = false;
        // Monotonicity is re-validated at write time: `submit` runs
        // concurrently from the poller task and the bus event loop, and
        // awaits (like the stale tie-break lookup) can resolve after the
        // display has already moved on.
        let applied = self.display.send_if_modified(|state| {
            if state.inspection_id.is_some() {
                return false;
            }
            state.inspection_id = Some(cand_id);
            if let Some(detections) = &candidate.detections {
                let class = classify(detections);
                state.result = Some(class.result.to_string());
                state.defect_type = class.defect_type.to_string();
            }
            match &candidate.images {
                Some(images) if !images.is_empty() => {
                    state.images = images.clone();
                    state.images_loading = false;
                }
                _ => {
                    state.images = Vec::new();
                    state.images_loading = true;
                    needs_images = true;
                }
            }
            true
        });
        if !applied {
            tracing::debug!(
                inspection_id = cand_id,
                source = %candidate.source.as_str(),
                "Adopt skipped, display already holds an id"
            );
            return;
        }
        if needs_images {
            self.retriever.poll(cand_id);
        }
    }

    fn apply_merge(&self, cand_id: i64, candidate: InspectionCandidate) {
        let mut needs_images = false;
        let applied = self.display.send_if_modified(|state| {
            // Only merge into the inspection this candidate belongs to
            if state.inspection_id != Some(cand_id) {
                return false;
            }
            if let Some(detections) = &candidate.detections {
                let class = classify(detections);
                // A late "no defect" tick must not blank a defective
                // display whose images are already visible
                let starved = class.result == RESULT_NO_DEFECT
                    && state
                        .result
                        .as_deref()
                        .map(is_defective)
                        .unwrap_or(false)
                    && !state.images.is_empty();
                if starved {
                    tracing::debug!(
                        inspection_id = cand_id,
                        source = %candidate.source.as_str(),
                        "No-defect update ignored for displayed defective result"
                    );
                } else {
                    state.result = Some(class.result.to_string());
                    state.defect_type = class.defect_type.to_string();
                }
            }

            // Images merge in when newly available; never retracted
            if let Some(images) = &candidate.images {
                if !images.is_empty() {
                    state.images = images.clone();
                    state.images_loading = false;
                }
            }

            needs_images = state.images.is_empty() && state.images_loading;
            true
        });

        if !applied {
            tracing::debug!(
                inspection_id = cand_id,
                source = %candidate.source.as_str(),
                "Merge skipped, display moved to a different id"
            );
            return;
        }
        if needs_images {
            // No-op when the retriever is already polling this id
            self.retriever.poll(cand_id);
        }
    }

    fn apply_supersede(&self, cand_id: i64, candidate: InspectionCandidate) {
        let mut needs_images = false;
        let applied = self.display.send_if_modified(|state| {
            // A lower or equal id never supersedes: the display may have
            // advanced past this candidate while it was routed or while
            // the tie-break lookup was in flight
            if let Some(cur) = state.inspection_id {
                if cand_id <= cur {
                    return false;
                }
            }
            state.inspection_id = Some(cand_id);
            // Stale images belong to the superseded inspection
            match &candidate.images {
                Some(images) if !images.is_empty() => {
                    state.images = images.clone();
                    state.images_loading = false;
                }
                _ => {
                    state.images = Vec::new();
                    state.images_loading = true;
                    needs_images = true;
                }
            }
            match &candidate.detections {
                Some(detections) => {
                    let class = classify(detections);
                    state.result = Some(class.result.to_string());
                    state.defect_type = class.defect_type.to_string();
                }
                None => {
                    state.result = None;
                    state.defect_type = String::new();
                }
            }
            true
        });
        if !applied {
            tracing::debug!(
                inspection_id = cand_id,
                source = %candidate.source.as_str(),
                "Supersede skipped, display already past this id"
            );
            return;
        }
        if needs_images {
            self.retriever.poll(cand_id);
        }
    }

    /// Consume one sensor status snapshot: advance the display status and
    /// submit any embedded inspection reference as a candidate.
    pub async fn on_sensor_status(&self, status: &SensorStatus) {
        self.display.send_modify(|state| {
            state.status = derive_status(
                status.active,
                status.sensor_a,
                status.sensor_b,
                state.status,
            );
        });

        if let Some(results) = &status.inspection_results {
            self.submit(InspectionCandidate {
                inspection_id: Some(results.inspection_id),
                detections: Some(results.detections.clone()),
                images: None,
                source: CandidateSource::SensorPoll,
            })
            .await;
        } else if let Some(data) = &status.inspection_data {
            self.submit(InspectionCandidate::bare(
                data.id,
                CandidateSource::SensorPoll,
            ))
            .await;
        }
    }

    /// Handle an `inspectionSaved` notification: fetch the result by id
    /// and submit it. Falls back to a bare candidate when the fetch
    /// fails, so the id itself is never lost.
    pub async fn on_saved(&self, inspection_id: i64) {
        match self.backend.inspection_result(inspection_id).await {
            Ok(record) => {
                self.submit(InspectionCandidate {
                    inspection_id: Some(record.inspection_id),
                    detections: Some(record.detections),
                    images: None,
                    source: CandidateSource::DirectFetch,
                })
                .await;
            }
            Err(e) => {
                tracing::warn!(
                    inspection_id,
                    error = %e,
                    "Inspection result fetch failed, submitting bare candidate"
                );
                self.submit(InspectionCandidate::bare(
                    inspection_id,
                    CandidateSource::SavedNotification,
                ))
                .await;
            }
        }
    }

    /// Handle a `presentationImagesReady` notification
    pub async fn on_ready(&self, inspection_id: i64) {
        self.submit(InspectionCandidate::bare(
            inspection_id,
            CandidateSource::ReadyNotification,
        ))
        .await;
    }

    /// The only way to force the current id back to null. Invoked when a
    /// new inspection session explicitly starts.
    pub fn clear_results(&self) {
        self.retriever.cancel();
        self.display.send_modify(|state| {
            *state = DisplayState::default();
        });
        tracing::info!("Inspection results cleared");
    }

    /// Reset the display for a new monitoring session, recording the
    /// threshold it runs with
    pub fn start_session(&self, ai_threshold: u32) {
        self.retriever.cancel();
        self.display.send_modify(|state| {
            *state = DisplayState {
                ai_threshold: Some(ai_threshold),
                ..DisplayState::default()
            };
        });
        tracing::info!(ai_threshold, "Inspection session reset");
    }

    /// Record a threshold change on the current session
    pub fn update_threshold(&self, ai_threshold: u32) {
        self.display
            .send_modify(|state| state.ai_threshold = Some(ai_threshold));
    }

    /// Spawn the bus consumer task dispatching station events to the
    /// handlers above
    pub fn spawn_event_loop(self: &Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let reconciler = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => reconciler.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Reconciler lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Reconciler event loop exited");
        })
    }

    async fn handle_event(&self, event: StationEvent) {
        match event {
            StationEvent::InspectionDataUpdate { inspection_id } => {
                self.submit(InspectionCandidate::bare(
                    inspection_id,
                    CandidateSource::DirectFetch,
                ))
                .await;
            }
            StationEvent::PresentationImagesUpdated {
                inspection_id,
                images,
            } => {
                self.submit(InspectionCandidate {
                    inspection_id: Some(inspection_id),
                    detections: None,
                    images: Some(images),
                    source: CandidateSource::ImageRetriever,
                })
                .await;
            }
            StationEvent::PresentationImagesReady { inspection_id } => {
                self.on_ready(inspection_id).await;
            }
            StationEvent::InspectionSaved { inspection_id, .. } => {
                self.on_saved(inspection_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_idle_until_active() {
        assert_eq!(
            derive_status(false, false, false, InspectionStatus::Idle),
            InspectionStatus::Idle
        );
        assert_eq!(
            derive_status(true, false, false, InspectionStatus::Idle),
            InspectionStatus::Searching
        );
    }

    #[test]
    fn test_status_sensor_trigger_enters_processing() {
        assert_eq!(
            derive_status(true, true, false, InspectionStatus::Searching),
            InspectionStatus::Processing
        );
        assert_eq!(
            derive_status(true, false, true, InspectionStatus::Searching),
            InspectionStatus::Processing
        );
    }

    #[test]
    fn test_status_deactivation_stops() {
        assert_eq!(
            derive_status(false, false, false, InspectionStatus::Processing),
            InspectionStatus::Stopped
        );
        assert_eq!(
            derive_status(false, false, false, InspectionStatus::Searching),
            InspectionStatus::Stopped
        );
        // Stopped stays Stopped until an explicit clear
        assert_eq!(
            derive_status(false, false, false, InspectionStatus::Stopped),
            InspectionStatus::Stopped
        );
    }
}
