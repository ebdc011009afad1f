//! Idle Periodicity Test
//!
//! Drives an idle tracker on tokio's paused clock and checks when the
//! listener fires:
//! 1. With no activity the listener fires every threshold until stopped
//! 2. Activity during a sleep pushes the next fire out by the threshold

use lifeline_core_watchdog::{IdleRegistry, IdleTracker};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

type FireLog = Arc<Mutex<Vec<Duration>>>;

fn recording_listener(start: Instant, log: &FireLog) -> impl Fn(&IdleTracker) + Send + Sync {
    let log = log.clone();
    move |_: &IdleTracker| log.lock().unwrap().push(start.elapsed())
}

fn assert_near(actual: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(5),
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn test_fires_every_threshold_without_activity() {
    let start = Instant::now();
    let fires: FireLog = Arc::default();
    let registry = IdleRegistry::new();
    let tracker = Arc::new(IdleTracker::new("consumer"));

    registry
        .start(
            tracker,
            recording_listener(start, &fires),
            Duration::from_millis(100),
        )
        .unwrap();

    sleep(Duration::from_millis(350)).await;
    registry.stop("consumer");

    let fires = fires.lock().unwrap().clone();
    // Initialization call plus one fire per idle period
    assert_eq!(fires.len(), 4, "fires: {:?}", fires);
    assert_near(fires[0], 0);
    assert_near(fires[1], 100);
    assert_near(fires[2], 200);
    assert_near(fires[3], 300);
}

#[tokio::test(start_paused = true)]
async fn test_activity_pushes_next_fire() {
    let start = Instant::now();
    let fires: FireLog = Arc::default();
    let registry = IdleRegistry::new();
    let tracker = Arc::new(IdleTracker::new("session"));

    registry
        .start(
            tracker.clone(),
            recording_listener(start, &fires),
            Duration::from_millis(100),
        )
        .unwrap();

    sleep(Duration::from_millis(60)).await;
    tracker.update(Some("req-42"));

    sleep(Duration::from_millis(140)).await;
    registry.stop("session");

    let fires = fires.lock().unwrap().clone();
    assert_eq!(fires.len(), 2, "fires: {:?}", fires);
    assert_near(fires[0], 0);
    assert_near(fires[1], 160);
}

#[tokio::test(start_paused = true)]
async fn test_steady_activity_never_fires() {
    let start = Instant::now();
    let fires: FireLog = Arc::default();
    let registry = IdleRegistry::new();
    let tracker = Arc::new(IdleTracker::new("busy"));

    registry
        .start(
            tracker.clone(),
            recording_listener(start, &fires),
            Duration::from_millis(100),
        )
        .unwrap();

    for i in 0..10 {
        sleep(Duration::from_millis(50)).await;
        tracker.update(Some(&format!("req-{}", i)));
    }
    registry.stop_all();

    // Only the initialization call
    assert_eq!(fires.lock().unwrap().len(), 1);
}
