//! Availability State Test
//!
//! Checks the observable contract of `ServiceAvailability`:
//! 1. `available == healthy && !paused` after every mutation
//! 2. Listeners hear about real changes only
//! 3. Concurrent writers never leave `available` stale

use lifeline::{ChangeCause, LoggingListener, ServiceAvailability, StatusChange};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn counting_listener(availability: &ServiceAvailability) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    availability.add_listener(Arc::new(move |_: &StatusChange| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    calls
}

#[test]
fn test_health_sequence_notifies_twice() {
    let availability = ServiceAvailability::with_defaults();
    let calls = counting_listener(&availability);

    // Starts unhealthy, so the first report is not a change
    let changed: Vec<bool> = [false, true, true, false]
        .into_iter()
        .map(|healthy| availability.set_health_status(healthy, "probe", None))
        .collect();

    assert_eq!(changed, vec![false, true, false, true]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_every_combination_derives_available() {
    let availability = ServiceAvailability::with_defaults();
    availability.add_listener(Arc::new(LoggingListener));

    let steps = [
        (Some(true), None),
        (None, Some(true)),
        (Some(false), None),
        (None, Some(false)),
        (Some(true), None),
        (None, Some(true)),
        (None, Some(false)),
    ];
    for (healthy, paused) in steps {
        if let Some(healthy) = healthy {
            availability.set_health_status(healthy, "health probe", None);
        }
        if let Some(paused) = paused {
            availability.set_pause_status(paused, "operator");
        }

        let snapshot = availability.snapshot();
        assert_eq!(snapshot.available, snapshot.healthy && !snapshot.paused);
        assert_eq!(availability.is_available(), snapshot.available);
    }
    assert!(availability.is_available());
}

#[test]
fn test_pause_notifications_carry_cause_and_flip() {
    let availability = ServiceAvailability::with_defaults();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    availability.add_listener(Arc::new(move |change: &StatusChange| {
        sink.lock().unwrap().push(change.clone());
    }));

    availability.set_health_status(true, "up", None);
    assert!(availability.set_pause_status(true, "maintenance window"));
    assert!(!availability.set_pause_status(true, "maintenance window"));
    assert!(availability.set_pause_status(false, "window closed"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);

    assert_eq!(seen[1].cause, ChangeCause::Pause);
    assert!(seen[1].paused && !seen[1].available && seen[1].available_changed);
    assert_eq!(seen[1].reason, "maintenance window");

    assert!(!seen[2].paused && seen[2].available && seen[2].available_changed);
}

#[test]
fn test_concurrent_writers_keep_available_consistent() {
    let availability = ServiceAvailability::with_defaults();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let availability = availability.clone();
            scope.spawn(move || {
                for i in 0..500 {
                    if worker % 2 == 0 {
                        availability.set_health_status(i % 3 != 0, "health worker", None);
                    } else {
                        availability.set_pause_status(i % 5 == 0, "pause worker");
                    }
                }
            });
        }
    });

    let snapshot = availability.snapshot();
    assert_eq!(snapshot.available, snapshot.healthy && !snapshot.paused);

    // One more write from a quiet state must land exactly
    availability.set_pause_status(false, "settle");
    availability.set_health_status(true, "settle", None);
    assert!(availability.is_available());
    assert_eq!(availability.reason(), "settle");
}

#[test]
fn test_racing_writers_deliver_changes_in_commit_order() {
    const WRITERS: usize = 4;
    const FLIPS: usize = 200;

    for _ in 0..20 {
        let availability = ServiceAvailability::with_defaults();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        availability.add_listener(Arc::new(move |change: &StatusChange| {
            sink.lock().unwrap().push(change.healthy);
        }));

        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let availability = availability.clone();
                scope.spawn(move || {
                    for i in 0..FLIPS {
                        availability.set_health_status((i + writer) % 2 == 0, "flip", None);
                    }
                });
            }
        });

        // Every delivered change flips `healthy`, so neighbours always differ
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen[0], "first change must leave the initial unhealthy state");
        for pair in seen.windows(2) {
            assert_ne!(pair[0], pair[1], "changes delivered out of commit order");
        }
        assert_eq!(*seen.last().unwrap(), availability.is_healthy());
    }
}
