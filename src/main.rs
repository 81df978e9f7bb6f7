//! Inspection Station - entry point
//!
//! Wires the backend gateway, camera manager, pollers and reconciler,
//! starts a monitoring session and runs until interrupted.

use inspection_station::backend_gateway::BackendGateway;
use inspection_station::notification::NotificationCenter;
use inspection_station::state::{AppConfig, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inspection_station=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting inspection station v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        backend_url = %config.backend_url,
        camera_type = %config.camera_type.as_str(),
        sensor_poll_interval_ms = config.sensor_poll_interval.as_millis() as u64,
        ai_threshold = config.ai_threshold,
        "Configuration loaded"
    );

    let backend = Arc::new(BackendGateway::new(
        config.backend_url.clone(),
        config.request_timeout,
    )?);

    let (notifications, mut notification_rx) = NotificationCenter::new();
    let notifications = Arc::new(notifications);

    let state = AppState::new(config, backend, notifications);

    // Drain user-visible notifications; the real display layer consumes
    // this channel, the binary just logs them
    tokio::spawn(async move {
        while let Some(n) = notification_rx.recv().await {
            tracing::info!(level = ?n.level, message = %n.message, "notification");
        }
    });

    // Reconciler consumes saved/ready/image events from the bus
    let event_loop = state.reconciler.spawn_event_loop(&state.bus);

    // Log display changes so the station is observable headless
    let mut display_rx = state.reconciler.display_rx();
    tokio::spawn(async move {
        while display_rx.changed().await.is_ok() {
            let snapshot = display_rx.borrow().clone();
            tracing::info!(
                inspection_id = ?snapshot.inspection_id,
                result = ?snapshot.result,
                defect_type = %snapshot.defect_type,
                images = snapshot.images.len(),
                status = ?snapshot.status,
                "Display updated"
            );
        }
    });

    // Begin monitoring; simulation mode warns but does not abort
    match state.start_monitoring(state.config.ai_threshold).await {
        Ok(simulation_mode) => {
            tracing::info!(simulation_mode, "Monitoring session started");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start monitoring");
        }
    }

    // Connect the camera; retry policy takes over on failure
    if let Err(e) = state.camera.connect(state.config.camera_type).await {
        tracing::error!(error = %e, "Initial camera connect failed");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    state.shutdown();
    if let Err(e) = state.stop_monitoring().await {
        tracing::warn!(error = %e, "stop_monitoring during shutdown failed");
    }
    event_loop.abort();

    Ok(())
}
