//! Sensor polling timing behavior: single-flight dedup, coalesced
//! follow-ups, self-stop on inactive, and synchronous stop.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{status, Harness};

/// A slow backend (2.5 s per request) under a 1 s tick must never see
/// two concurrent status requests, and however many ticks fire during
/// one in-flight poll collapse into exactly one follow-up.
#[tokio::test(start_paused = true)]
async fn slow_backend_polls_never_overlap() {
    let h = Harness::new();
    *h.mock.sensor_delay.lock().unwrap() = Duration::from_millis(2_500);
    h.mock.push_sensor_status(status(true, None));
    h.mock.push_sensor_status(status(true, None));
    h.mock.push_sensor_status(status(false, None));

    h.poller.start(Duration::from_millis(1_000));

    // Poll 1 spans 0..2.5s (ticks at 1s and 2s coalesce), its follow-up
    // spans ~2.75..5.25s, and the third poll sees inactive and stops.
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(h.mock.sensor_max_concurrent.load(Ordering::SeqCst), 1);
    assert_eq!(h.mock.sensor_calls.load(Ordering::SeqCst), 3);
}

/// `stop()` is synchronous: once it returns, no further status request
/// is ever issued even though the timer task may still be draining.
#[tokio::test(start_paused = true)]
async fn stop_halts_polling_immediately() {
    let h = Harness::new();
    h.mock.push_sensor_status(status(true, None));

    h.poller.start(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(350)).await;

    let before = h.mock.sensor_calls.load(Ordering::SeqCst);
    assert!(before >= 2, "expected several polls, saw {}", before);

    h.poller.stop();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.mock.sensor_calls.load(Ordering::SeqCst), before);
}

/// The poller ends its own loop when the backend reports the session
/// inactive, without an external stop().
#[tokio::test(start_paused = true)]
async fn inactive_session_stops_polling() {
    let h = Harness::new();
    h.mock.push_sensor_status(status(true, None));
    h.mock.push_sensor_status(status(false, None));

    h.poller.start(Duration::from_millis(1_000));
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.mock.sensor_calls.load(Ordering::SeqCst), 2);
}

/// The image retriever serves one inspection at a time: retargeting to
/// a newer id makes the older loop exit without publishing, even when
/// its request was already in flight.
#[tokio::test(start_paused = true)]
async fn image_retriever_newer_id_silences_older_loop() {
    use inspection_station::event_bus::StationEvent;
    use inspection_station::models::PresentationImagesResponse;
    use support::full_image_set;

    let h = Harness::new();
    *h.mock.images_delay.lock().unwrap() = Duration::from_millis(500);
    for id in [5, 6] {
        h.mock.script_images(id, vec![PresentationImagesResponse {
            images: full_image_set(id),
            total_source_images: Some(5),
        }]);
    }

    let mut rx = h.bus.subscribe();

    h.retriever.poll(5);
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.retriever.poll(6);

    tokio::time::sleep(Duration::from_secs(5)).await;

    match rx.recv().await.unwrap() {
        StationEvent::PresentationImagesUpdated { inspection_id, .. } => {
            assert_eq!(inspection_id, 6)
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(rx.try_recv().is_err(), "id 5 must never publish");
    assert_eq!(h.retriever.polling_id(), None);
}

/// Status changes propagate to the reconciler's display status; the
/// first active tick moves Idle to Searching and a trigger tick moves
/// it to Processing.
#[tokio::test(start_paused = true)]
async fn status_changes_reach_the_display() {
    use inspection_station::models::InspectionStatus;

    let h = Harness::new();
    let mut triggered = status(true, None);
    triggered.sensor_a = true;

    h.mock.push_sensor_status(status(true, None));
    h.mock.push_sensor_status(triggered);

    h.poller.start(Duration::from_millis(1_000));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(
        h.reconciler.display().status,
        InspectionStatus::Processing
    );

    h.poller.stop();
}
