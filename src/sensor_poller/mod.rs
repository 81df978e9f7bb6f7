//! SensorStatusPoller - Fixed-Interval Sensor/Inspection Status Polling
//!
//! ## Responsibilities
//!
//! - Poll the aggregate sensor/inspection status on a fixed interval
//! - Single-flight dedup: a tick firing during an in-flight poll sets a
//!   latch instead of starting a second request; exactly one follow-up
//!   poll runs after the in-flight one completes
//! - Structural change detection before publishing downstream
//! - Self-stop when the backend reports the session inactive
//!
//! Polling errors are logged and swallowed; only `active=false` or an
//! explicit `stop()` ends the loop.

use crate::backend_gateway::InspectionBackend;
use crate::models::SensorStatus;
use crate::reconciler::InspectionResultReconciler;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Delay before the single follow-up poll that replaces a coalesced
/// missed tick. Short enough not to lose cadence, long enough to avoid
/// tight-loop spikes.
const FOLLOWUP_DELAY: Duration = Duration::from_millis(250);

/// Shared internals cloned into the poll tasks
struct PollerInner {
    backend: Arc<dyn InspectionBackend>,
    reconciler: Arc<InspectionResultReconciler>,
    generation: AtomicU64,
    in_flight: AtomicBool,
    poll_requested: AtomicBool,
    last: Mutex<Option<SensorStatus>>,
    status_tx: watch::Sender<Option<SensorStatus>>,
}

/// SensorStatusPoller instance
pub struct SensorStatusPoller {
    inner: Arc<PollerInner>,
}

impl SensorStatusPoller {
    pub fn new(
        backend: Arc<dyn InspectionBackend>,
        reconciler: Arc<InspectionResultReconciler>,
    ) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(PollerInner {
                backend,
                reconciler,
                generation: AtomicU64::new(0),
                in_flight: AtomicBool::new(false),
                poll_requested: AtomicBool::new(false),
                last: Mutex::new(None),
                status_tx,
            }),
        }
    }

    /// Latest published status snapshot, for the UI
    pub fn status_rx(&self) -> watch::Receiver<Option<SensorStatus>> {
        self.inner.status_tx.subscribe()
    }

    /// Start the polling loop
    pub fn start(&self, interval: Duration) {
        let my_gen = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();

        tracing::info!(interval_ms = interval.as_millis() as u64, "Sensor polling started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if inner.generation.load(Ordering::SeqCst) != my_gen {
                    break;
                }

                if inner.in_flight.load(Ordering::SeqCst) {
                    // Coalesce: remember that a tick was missed, never
                    // start a second concurrent request
                    inner.poll_requested.store(true, Ordering::SeqCst);
                    continue;
                }

                let inner = inner.clone();
                tokio::spawn(async move {
                    PollerInner::run_poll(inner, my_gen).await;
                });
            }

            tracing::debug!("Sensor poll timer exited");
        });
    }

    /// Stop the loop. Synchronous: pending timers observe the stale
    /// generation and exit without further state writes.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.poll_requested.store(false, Ordering::SeqCst);
        tracing::info!("Sensor polling stopped");
    }
}

impl PollerInner {
    /// One poll plus at most one chained follow-up per missed tick
    async fn run_poll(inner: Arc<PollerInner>, my_gen: u64) {
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            inner.poll_requested.store(true, Ordering::SeqCst);
            return;
        }

        loop {
            let result = inner.backend.sensor_status().await;

            if inner.generation.load(Ordering::SeqCst) != my_gen {
                break;
            }

            match result {
                Ok(status) => {
                    let mut last = inner.last.lock().await;
                    let merged = merge_retained(last.as_ref(), status);
                    let changed = relevant_change(last.as_ref(), &merged);
                    let inactive = !merged.active;
                    *last = Some(merged.clone());
                    drop(last);

                    if changed {
                        let _ = inner.status_tx.send(Some(merged.clone()));
                        inner.reconciler.on_sensor_status(&merged).await;
                    }

                    if inactive {
                        tracing::info!("Backend reports inactive, sensor polling stops itself");
                        inner.generation.fetch_add(1, Ordering::SeqCst);
                        inner.poll_requested.store(false, Ordering::SeqCst);
                        break;
                    }
                }
                Err(e) => {
                    // Transient backend hiccups must not strand the UI;
                    // the loop continues
                    tracing::warn!(error = %e, "Sensor status poll failed, continuing");
                }
            }

            // Exactly one follow-up for however many ticks were missed
            if inner.poll_requested.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(FOLLOWUP_DELAY).await;
                if inner.generation.load(Ordering::SeqCst) != my_gen {
                    break;
                }
                continue;
            }
            break;
        }

        inner.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Retain the previous value for fields that are transiently absent in
/// the new tick. Absence means "no new data", not "cleared".
fn merge_retained(prev: Option<&SensorStatus>, mut next: SensorStatus) -> SensorStatus {
    if let Some(prev) = prev {
        if next.current_state.is_none() {
            next.current_state = prev.current_state.clone();
        }
        if next.capture_status.is_none() {
            next.capture_status = prev.capture_status.clone();
        }
        if next.inspection_data.is_none() {
            next.inspection_data = prev.inspection_data.clone();
        }
        if next.inspection_results.is_none() {
            next.inspection_results = prev.inspection_results.clone();
        }
    }
    next
}

/// Structural comparison of the fields downstream actually reacts to.
/// Skipping unchanged publishes prevents redundant re-evaluation.
fn relevant_change(prev: Option<&SensorStatus>, next: &SensorStatus) -> bool {
    let Some(prev) = prev else {
        return true;
    };
    prev.active != next.active
        || prev.sensor_a != next.sensor_a
        || prev.sensor_b != next.sensor_b
        || prev.current_state != next.current_state
        || prev.capture_status != next.capture_status
        || prev.simulation_mode != next.simulation_mode
        || prev.embedded_inspection_id() != next.embedded_inspection_id()
}
