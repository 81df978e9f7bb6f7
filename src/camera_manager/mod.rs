//! CameraConnectionManager - Camera Session Lifecycle
//!
//! ## Responsibilities
//!
//! - Own the single camera session (connect / switch type / stop)
//! - Frame polling with error classification and per-kind retry policy
//! - Slowed polling cadence while the camera reports hardware loss
//! - Synchronous timer cancellation on stop; best-effort async cleanup
//!
//! The physical camera is mediated entirely by the backend. Single-writer
//! access is enforced here: `start(new)` is never issued before
//! `stop(old)` has been awaited, plus a settling delay between the two.

mod retry;

pub use retry::{delay_for, RetrySchedule};

use crate::backend_gateway::InspectionBackend;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{CameraError, CameraSession, CameraType, ConnectionState, SnapshotResponse};
use crate::notification::NotificationCenter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct CameraManagerConfig {
    /// Normal frame polling interval
    pub poll_interval: Duration,
    /// Cadence multiplier applied while hardware-disconnected
    pub slow_poll_multiplier: u32,
    /// Delay between stop(old) and start(new) on a type switch
    pub settling_delay: Duration,
}

impl Default for CameraManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            slow_poll_multiplier: 5,
            settling_delay: Duration::from_millis(500),
        }
    }
}

/// CameraConnectionManager instance
pub struct CameraConnectionManager {
    backend: Arc<dyn InspectionBackend>,
    notifications: Arc<NotificationCenter>,
    config: CameraManagerConfig,
    session: Arc<RwLock<CameraSession>>,
    /// Bumped to invalidate every pending timer/continuation of the
    /// previous session
    generation: Arc<AtomicU64>,
    /// Guard against concurrent connect/disconnect for the same session
    in_flight: AtomicBool,
    frame_tx: watch::Sender<Option<String>>,
}

impl CameraConnectionManager {
    /// Create a new manager. No session is started until `connect`.
    pub fn new(
        backend: Arc<dyn InspectionBackend>,
        notifications: Arc<NotificationCenter>,
        config: CameraManagerConfig,
    ) -> Self {
        let (frame_tx, _) = watch::channel(None);
        let poll_ms = config.poll_interval.as_millis() as u64;
        Self {
            backend,
            notifications,
            config,
            session: Arc::new(RwLock::new(CameraSession::new(CameraType::Webcam, poll_ms))),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: AtomicBool::new(false),
            frame_tx,
        }
    }

    /// Latest base64 frame (None until the first successful snapshot)
    pub fn frame_rx(&self) -> watch::Receiver<Option<String>> {
        self.frame_tx.subscribe()
    }

    /// Snapshot of the current session state
    pub async fn session(&self) -> CameraSession {
        self.session.read().await.clone()
    }

    /// Connect a camera of the given type and start frame polling
    pub async fn connect(&self, camera_type: CameraType) -> Result<()> {
        self.acquire_in_flight()?;
        let result = self.start_session(camera_type).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Switch camera type: stop(old), await it, settle, then start(new).
    /// Never interleaved with the old session's teardown.
    pub async fn switch_type(&self, new_type: CameraType) -> Result<()> {
        self.acquire_in_flight()?;

        let old_type = self.session.read().await.camera_type;
        tracing::info!(
            old_type = %old_type.as_str(),
            new_type = %new_type.as_str(),
            "Switching camera type"
        );

        // Cancel the old session's timers before any backend call
        self.generation.fetch_add(1, Ordering::SeqCst);

        // Awaited teardown; failures logged, switch continues
        if let Err(e) = self.backend.camera_stop().await {
            tracing::warn!(error = %e, "camera_stop during switch failed");
        }
        if let Err(e) = self.backend.camera_disconnect().await {
            tracing::warn!(error = %e, "camera_disconnect during switch failed");
        }

        {
            let mut session = self.session.write().await;
            session.connection_state = ConnectionState::Disconnected;
        }

        // Settling delay avoids backend-side races between teardown and reinit
        tokio::time::sleep(self.config.settling_delay).await;

        // Verify the backend finished releasing the old camera
        match self.backend.camera_is_connected().await {
            Ok(true) => {
                tracing::warn!(
                    old_type = %old_type.as_str(),
                    "Backend still reports a connected camera after teardown"
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(error = %e, "camera_is_connected check failed (ignored)");
            }
        }

        let result = self.start_session(new_type).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Stop the current session.
    ///
    /// Cancellation is synchronous: the generation bump immediately makes
    /// every pending timer stale, so no further state writes can happen.
    /// The final disconnect calls are dispatched afterwards and must not
    /// block teardown; their failures are discarded.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Camera session stopped");

        let backend = self.backend.clone();
        let session = self.session.clone();
        tokio::spawn(async move {
            {
                let mut s = session.write().await;
                s.connection_state = ConnectionState::Disconnected;
            }
            if let Err(e) = backend.camera_stop().await {
                tracing::debug!(error = %e, "post-teardown camera_stop failed (ignored)");
            }
            if let Err(e) = backend.camera_disconnect().await {
                tracing::debug!(error = %e, "post-teardown camera_disconnect failed (ignored)");
            }
        });
    }

    fn acquire_in_flight(&self) -> Result<()> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Internal(
                "camera connect/disconnect already in flight".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize the session and spawn its frame loop
    async fn start_session(&self, camera_type: CameraType) -> Result<()> {
        // Invalidate any previous loop, then pin this session's generation
        let my_gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut session = self.session.write().await;
            *session = CameraSession::new(camera_type, self.config.poll_interval.as_millis() as u64);
            session.connection_state = ConnectionState::Connecting;
        }

        let connected = async {
            self.backend.camera_connect(camera_type).await?;
            self.backend.camera_start().await
        }
        .await;

        // stop() may have landed while the connect calls were in flight;
        // its teardown owns the session state from here on
        if self.generation.load(Ordering::SeqCst) != my_gen {
            tracing::info!(
                camera_type = %camera_type.as_str(),
                "Session stopped during connect, result discarded"
            );
            return Ok(());
        }

        if let Err(e) = connected {
            let kind = e.kind();
            tracing::error!(
                camera_type = %camera_type.as_str(),
                kind = %kind.as_str(),
                error = %e,
                "Camera connect failed"
            );
            {
                let mut session = self.session.write().await;
                session.connection_state = ConnectionState::Erroring;
                session.last_error = Some(CameraError::new(kind, e.to_string()));
            }
            self.notifications
                .error(format!("カメラ接続に失敗しました: {}", e));
            return Err(e);
        }

        {
            let mut session = self.session.write().await;
            session.connection_state = ConnectionState::Connected;
        }
        tracing::info!(camera_type = %camera_type.as_str(), "Camera connected");

        self.spawn_frame_loop(my_gen);
        Ok(())
    }

    fn spawn_frame_loop(&self, my_gen: u64) {
        let backend = self.backend.clone();
        let notifications = self.notifications.clone();
        let session = self.session.clone();
        let generation = self.generation.clone();
        let frame_tx = self.frame_tx.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            let mut schedule = RetrySchedule::new();
            let normal = config.poll_interval;
            let slow = config.poll_interval * config.slow_poll_multiplier.max(1);

            loop {
                if generation.load(Ordering::SeqCst) != my_gen {
                    break;
                }

                let outcome = backend.camera_snapshot().await;

                // A continuation resolving after stop() must not write state
                if generation.load(Ordering::SeqCst) != my_gen {
                    break;
                }

                let failure = match outcome {
                    Ok(snap) => match snapshot_failure(&snap) {
                        None => {
                            if let Some(image) = snap.image {
                                let _ = frame_tx.send(Some(image));
                            }
                            let mut s = session.write().await;
                            s.last_error = None;
                            s.retry_count = 0;
                            s.connection_state = ConnectionState::Connected;
                            drop(s);
                            schedule.on_success();
                            tokio::time::sleep(normal).await;
                            continue;
                        }
                        Some((kind, message)) => (kind, message),
                    },
                    Err(e) => (e.kind(), e.to_string()),
                };

                let (kind, message) = failure;
                let delay = schedule.on_failure(kind);
                let attempts = schedule.attempts();

                {
                    let mut s = session.write().await;
                    s.connection_state = ConnectionState::Erroring;
                    s.retry_count = attempts;
                    s.last_error = Some(CameraError::new(kind, message.clone()));
                }

                match delay {
                    Some(d) => {
                        tracing::warn!(
                            kind = %kind.as_str(),
                            attempt = attempts,
                            delay_ms = d.as_millis() as u64,
                            error = %message,
                            "Camera frame failure, retrying"
                        );
                        // First hardware/network loss is operationally meaningful
                        if attempts == 1
                            && matches!(kind, ErrorKind::Hardware | ErrorKind::Network)
                        {
                            notifications.warning(format!("カメラエラー: {}", message));
                        }
                        tokio::time::sleep(d).await;
                    }
                    None if kind == ErrorKind::Hardware => {
                        // Reconnect attempts exhausted; keep polling at a
                        // reduced cadence until the camera comes back
                        tracing::warn!(
                            attempt = attempts,
                            error = %message,
                            "Camera hardware retries exhausted, polling at reduced cadence"
                        );
                        notifications
                            .error(format!("カメラが応答しません: {}", message));
                        tokio::time::sleep(slow).await;
                    }
                    None => {
                        tracing::error!(
                            kind = %kind.as_str(),
                            attempt = attempts,
                            error = %message,
                            "Camera retries exhausted, stopping frame loop"
                        );
                        notifications.error(format!("カメラエラー: {}", message));
                        break;
                    }
                }
            }

            tracing::debug!(generation = my_gen, "Frame loop exited");
        });
    }
}

/// Map a snapshot response without a usable frame to an error kind.
/// `disconnected` / `no_frame` are hardware loss; other markers are
/// uncategorized.
fn snapshot_failure(snap: &SnapshotResponse) -> Option<(ErrorKind, String)> {
    match snap.status.as_deref() {
        Some(s @ ("disconnected" | "no_frame")) => {
            Some((ErrorKind::Hardware, format!("camera reported {}", s)))
        }
        Some(s) => Some((ErrorKind::Unknown, format!("camera reported {}", s))),
        None if snap.image.is_none() => {
            Some((ErrorKind::Unknown, "snapshot carried no frame".to_string()))
        }
        None => None,
    }
}
