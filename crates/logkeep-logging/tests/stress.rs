//! Stress tests for the async sink
//!
//! These tests push many events from many threads through an AsyncSink
//! backed by stores that are slow, flaky, or both.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use logkeep_logging::{AsyncSink, Level, LogEvent, SinkStats, SourceLocation, SubmitError};
use logkeep_storage::{InMemoryLogStore, LogStore, RedbLogStore, RedbStoreConfig};
use tempfile::TempDir;

fn event(producer: usize, seq: usize) -> LogEvent {
    LogEvent::new(
        Level::Info,
        "stress",
        format!("producer {producer} event {seq}"),
        SourceLocation::caller(),
    )
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Many producers, one worker, some injected store failures
///
/// Every event is handled exactly once: persisted or counted as failed.
#[test]
fn test_concurrent_producers_with_failures() {
    const NUM_PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 250;
    const INJECTED_FAILURES: usize = 100;

    let store = Arc::new(InMemoryLogStore::new());
    store.fail_next(INJECTED_FAILURES);
    let sink = Arc::new(AsyncSink::spawn(store.clone()).unwrap());
    let barrier = Arc::new(Barrier::new(NUM_PRODUCERS));

    let start = Instant::now();
    let handles: Vec<_> = (0..NUM_PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..PER_PRODUCER {
                    sink.submit(event(p, seq)).expect("submit rejected");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    sink.close();
    println!(
        "Handled {} events in {:?}",
        NUM_PRODUCERS * PER_PRODUCER,
        start.elapsed()
    );

    let total = (NUM_PRODUCERS * PER_PRODUCER) as u64;
    assert_eq!(
        sink.stats(),
        SinkStats {
            submitted: total,
            persisted: total - INJECTED_FAILURES as u64,
            failed: INJECTED_FAILURES as u64,
        }
    );

    let records = store.records();
    let unique: HashSet<_> = records.iter().map(|r| r.message.clone()).collect();
    assert_eq!(unique.len(), records.len(), "duplicate records persisted");
    assert_eq!(records.len() as u64, total - INJECTED_FAILURES as u64);
}

/// Per-producer order survives the shared queue
#[test]
fn test_per_producer_fifo() {
    const NUM_PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 200;

    let store = Arc::new(InMemoryLogStore::new());
    let sink = Arc::new(AsyncSink::spawn(store.clone()).unwrap());

    let handles: Vec<_> = (0..NUM_PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    sink.submit(event(p, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    sink.close();

    let records = store.records();
    for p in 0..NUM_PRODUCERS {
        let prefix = format!("producer {p} ");
        let seqs: Vec<usize> = records
            .iter()
            .filter_map(|r| r.message.strip_prefix(&prefix))
            .map(|rest| rest.trim_start_matches("event ").parse().unwrap())
            .collect();
        assert_eq!(seqs, (0..PER_PRODUCER).collect::<Vec<_>>());
    }
}

// ============================================================================
// Shutdown Tests
// ============================================================================

/// close() returns only after the whole backlog reached the store
#[test]
fn test_close_drains_backlog() {
    const EVENTS: usize = 1000;

    let store = Arc::new(InMemoryLogStore::with_latency(Duration::from_micros(200)));
    let sink = AsyncSink::spawn(store.clone()).unwrap();

    for seq in 0..EVENTS {
        sink.submit(event(0, seq)).unwrap();
    }
    sink.close();

    assert_eq!(store.records().len(), EVENTS);
    assert_eq!(sink.stats().pending(), 0);
}

/// Concurrent closers all wait for the worker
#[test]
fn test_concurrent_close() {
    let store = Arc::new(InMemoryLogStore::with_latency(Duration::from_micros(100)));
    let sink = Arc::new(AsyncSink::spawn(store.clone()).unwrap());
    for seq in 0..300 {
        sink.submit(event(0, seq)).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sink = Arc::clone(&sink);
            let store = Arc::clone(&store);
            thread::spawn(move || {
                sink.close();
                store.records().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 300);
    }
}

/// Producers racing close() are either accepted and persisted, or rejected
#[test]
fn test_submit_racing_close() {
    const NUM_PRODUCERS: usize = 6;

    let store = Arc::new(InMemoryLogStore::new());
    let sink = Arc::new(AsyncSink::spawn(store.clone()).unwrap());
    let barrier = Arc::new(Barrier::new(NUM_PRODUCERS + 1));

    let handles: Vec<_> = (0..NUM_PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut accepted = 0u64;
                for seq in 0..10_000 {
                    match sink.submit(event(p, seq)) {
                        Ok(()) => accepted += 1,
                        Err(SubmitError::Closed(_)) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                accepted
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(Duration::from_millis(5));
    sink.close();

    let accepted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(store.records().len() as u64, accepted);
    assert_eq!(sink.stats().submitted, accepted);
}

// ============================================================================
// Failure Isolation Tests
// ============================================================================

/// A store that fails everything, then recovers, never stalls the worker
#[test]
fn test_total_failure_then_recovery() {
    let store = Arc::new(InMemoryLogStore::new());
    store.set_failing(true);
    let sink = AsyncSink::spawn(store.clone()).unwrap();

    for seq in 0..100 {
        sink.submit(event(0, seq)).unwrap();
    }
    // Wait for the worker to burn through the failing batch
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.stats().failed < 100 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(sink.stats().failed, 100);

    store.set_failing(false);
    for seq in 100..150 {
        sink.submit(event(0, seq)).unwrap();
    }
    sink.close();

    assert_eq!(sink.stats().persisted, 50);
    assert_eq!(store.records().len(), 50);
}

/// submit() returns long before a slow store could have persisted anything
#[test]
fn test_submit_does_not_wait_for_store() {
    const EVENTS: usize = 50;

    let store = Arc::new(InMemoryLogStore::with_latency(Duration::from_millis(10)));
    let sink = AsyncSink::spawn(store.clone()).unwrap();

    let start = Instant::now();
    for seq in 0..EVENTS {
        sink.submit(event(0, seq)).unwrap();
    }
    let submit_time = start.elapsed();
    // Persisting alone takes at least EVENTS * 10ms
    assert!(
        submit_time < Duration::from_millis(250),
        "submit blocked for {submit_time:?}"
    );

    sink.close();
    assert_eq!(store.records().len(), EVENTS);
}

/// The full path onto disk: many producers into redb
#[test]
fn test_redb_backed_sink() {
    const NUM_PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 100;

    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(
        RedbLogStore::open(RedbStoreConfig {
            db_path: temp_dir.path().join("sink.redb"),
        })
        .unwrap(),
    );
    let sink = Arc::new(AsyncSink::spawn(store.clone()).unwrap());

    let handles: Vec<_> = (0..NUM_PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    sink.submit(event(p, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    sink.close();

    assert_eq!(store.len().unwrap(), NUM_PRODUCERS * PER_PRODUCER);
    let recent = store.recent(5).unwrap();
    assert_eq!(recent.len(), 5);
    assert!(recent.windows(2).all(|w| w[0].0 < w[1].0));
}
