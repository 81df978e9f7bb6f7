//! Station-level monitoring session lifecycle through `AppState`.

mod support;

use inspection_station::backend_gateway::InspectionBackend;
use inspection_station::notification::{NotificationCenter, NotificationLevel};
use inspection_station::state::{AppConfig, AppState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{status, MockBackend};

fn build_state(mock: &Arc<MockBackend>) -> (AppState, tokio::sync::mpsc::UnboundedReceiver<inspection_station::notification::Notification>) {
    let backend: Arc<dyn InspectionBackend> = mock.clone();
    let (notifications, rx) = NotificationCenter::new();
    let state = AppState::new(AppConfig::default(), backend, Arc::new(notifications));
    (state, rx)
}

/// Starting a session while the physical camera is unavailable: the
/// backend answers with simulation mode, a warning is queued for the
/// operator, and status polling begins regardless.
#[tokio::test(start_paused = true)]
async fn simulation_mode_warns_but_polling_begins() {
    let mock = Arc::new(MockBackend::new());
    mock.start_response.lock().unwrap().simulation_mode = true;
    mock.push_sensor_status(status(true, None));

    let (state, mut rx) = build_state(&mock);

    let simulation = state.start_monitoring(50).await.unwrap();
    assert!(simulation);

    let warning = rx.recv().await.unwrap();
    assert_eq!(warning.level, NotificationLevel::Warning);
    assert!(warning.message.contains("シミュレーション"));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(mock.sensor_calls.load(Ordering::SeqCst) >= 2);

    state.shutdown();
}

/// The requested threshold is clamped into 10..=100 before it reaches
/// the backend, and stop tears the session down on both sides.
#[tokio::test(start_paused = true)]
async fn threshold_clamped_and_stop_reaches_backend() {
    let mock = Arc::new(MockBackend::new());
    mock.push_sensor_status(status(true, None));

    let (state, _rx) = build_state(&mock);

    state.start_monitoring(3).await.unwrap();
    assert!(mock.call_log().contains(&"sensor_start:10".to_string()));
    assert_eq!(state.reconciler.display().ai_threshold, Some(10));

    state.set_ai_threshold(250).await.unwrap();
    assert!(mock
        .call_log()
        .contains(&"set_ai_threshold:100".to_string()));
    assert_eq!(state.reconciler.display().ai_threshold, Some(100));

    state.stop_monitoring().await.unwrap();
    assert!(mock.call_log().contains(&"sensor_stop".to_string()));

    let polls = mock.sensor_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(mock.sensor_calls.load(Ordering::SeqCst), polls);
}
