//! PresentationImageRetriever - Per-Inspection Image Polling
//!
//! ## Responsibilities
//!
//! - Poll the presentation image set for one inspection id every second,
//!   with no attempt cap: image generation is asynchronous on the backend
//!   and may legitimately take many seconds
//! - Dedup: polling an id already being polled is a no-op; polling a
//!   different id invalidates the prior loop via a generation bump
//! - Preload each image (fire-and-forget) before publishing, then stop
//! - Synchronous cancellation on teardown

use crate::backend_gateway::InspectionBackend;
use crate::event_bus::{EventBus, StationEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// PresentationImageRetriever instance
pub struct PresentationImageRetriever {
    backend: Arc<dyn InspectionBackend>,
    bus: Arc<EventBus>,
    interval: Duration,
    /// Bumped on every new poll target or cancel; a loop whose pinned
    /// generation no longer matches exits without publishing
    generation: Arc<AtomicU64>,
    /// Id currently being polled, if any
    current: Arc<Mutex<Option<i64>>>,
}

impl PresentationImageRetriever {
    pub fn new(backend: Arc<dyn InspectionBackend>, bus: Arc<EventBus>, interval: Duration) -> Self {
        Self {
            backend,
            bus,
            interval,
            generation: Arc::new(AtomicU64::new(0)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Start polling images for an inspection. No-op when this id is
    /// already being polled; a different id takes over immediately.
    pub fn poll(&self, inspection_id: i64) {
        let my_gen = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            if *current == Some(inspection_id) {
                tracing::debug!(inspection_id, "Image poll already running for this id");
                return;
            }
            if let Some(prev) = *current {
                tracing::debug!(
                    inspection_id,
                    superseded_id = prev,
                    "Image poll target changed, prior loop invalidated"
                );
            }
            *current = Some(inspection_id);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        tracing::info!(inspection_id, "Presentation image polling started");

        let backend = self.backend.clone();
        let bus = self.bus.clone();
        let generation = self.generation.clone();
        let current = self.current.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            loop {
                if generation.load(Ordering::SeqCst) != my_gen {
                    break;
                }

                match backend.presentation_images(inspection_id).await {
                    Ok(resp) if !resp.images.is_empty() => {
                        // Stale loops publish nothing
                        if generation.load(Ordering::SeqCst) != my_gen {
                            break;
                        }

                        // Warm the cache before the UI asks for the images
                        for image in &resp.images {
                            let backend = backend.clone();
                            let path = image.image_path.clone();
                            tokio::spawn(async move {
                                if let Err(e) = backend.preload_image(&path).await {
                                    tracing::debug!(path = %path, error = %e, "Image preload failed (ignored)");
                                }
                            });
                        }

                        tracing::info!(
                            inspection_id,
                            count = resp.images.len(),
                            "Presentation images found"
                        );
                        bus.publish(StationEvent::PresentationImagesUpdated {
                            inspection_id,
                            images: resp.images,
                        });

                        // Mark idle so a later poll for the same id restarts
                        let mut cur = current.lock().unwrap_or_else(|e| e.into_inner());
                        if generation.load(Ordering::SeqCst) == my_gen {
                            *cur = None;
                        }
                        break;
                    }
                    Ok(_) => {
                        // Not generated yet, keep polling
                    }
                    Err(e) => {
                        tracing::warn!(
                            inspection_id,
                            error = %e,
                            "Presentation image poll failed, continuing"
                        );
                    }
                }

                tokio::time::sleep(interval).await;
            }

            tracing::debug!(inspection_id, "Image poll loop exited");
        });
    }

    /// Cancel the active poll loop. Synchronous: the generation bump makes
    /// the loop stale immediately, so no publish can happen afterwards.
    pub fn cancel(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.take().is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Presentation image polling cancelled");
        }
    }

    /// Id currently being polled, if any
    pub fn polling_id(&self) -> Option<i64> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
