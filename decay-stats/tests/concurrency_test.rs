use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use decay_stats::{DistributionRegistry, Snapshot, TimeDistribution, TimeUnit};

const WRITERS: usize = 4;
const ADDS_PER_WRITER: u64 = 20_000;
const SECOND: f64 = 1_000_000_000.0;

/// Every writer records exactly one second, so any state the distribution
/// passes through has an integral count, an average of exactly one second and
/// matching extremes. A digest/counter pair updated out of step would break this.
fn assert_consistent(snapshot: &Snapshot) {
    let count = snapshot.count();
    assert_eq!(count, count.floor(), "partial update observed: {snapshot}");
    if count == 0.0 {
        assert!(!snapshot.has_data(), "empty count with data: {snapshot}");
        assert!(snapshot.max().is_nan());
        assert!(snapshot.avg().is_nan());
    } else {
        assert!(snapshot.has_data(), "non-zero count without data: {snapshot}");
        assert_eq!(snapshot.min(), 1.0, "{snapshot}");
        assert_eq!(snapshot.max(), 1.0, "{snapshot}");
        assert!((snapshot.avg() - 1.0).abs() < 1e-12, "{snapshot}");
        assert_eq!(snapshot.p99(), 1.0, "{snapshot}");
    }
}

#[test]
fn test_snapshots_never_observe_partial_adds() {
    let distribution = Arc::new(TimeDistribution::new(0.0, TimeUnit::Seconds).unwrap());
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let writers: Vec<_> = (0..WRITERS)
            .map(|_| {
                let distribution = distribution.clone();
                s.spawn(move || {
                    for _ in 0..ADDS_PER_WRITER {
                        distribution.add(SECOND).unwrap();
                    }
                })
            })
            .collect();

        s.spawn(|| {
            let mut last = 0.0;
            while !done.load(Ordering::Acquire) {
                let snapshot = distribution.snapshot();
                assert_consistent(&snapshot);
                assert!(snapshot.count() >= last, "count went backwards");
                assert!(snapshot.count() <= (WRITERS as u64 * ADDS_PER_WRITER) as f64);
                last = snapshot.count();
            }
        });

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(
        distribution.count(),
        (WRITERS as u64 * ADDS_PER_WRITER) as f64
    );
    assert_eq!(distribution.avg(), 1.0);
}

#[test]
fn test_reset_is_all_or_nothing() {
    let distribution = TimeDistribution::new(0.0, TimeUnit::Seconds).unwrap();
    let done = AtomicBool::new(false);
    let resets = AtomicU64::new(0);

    thread::scope(|s| {
        let writers: Vec<_> = (0..WRITERS)
            .map(|_| {
                let distribution = &distribution;
                s.spawn(move || {
                    for _ in 0..ADDS_PER_WRITER {
                        distribution.add(SECOND).unwrap();
                    }
                })
            })
            .collect();

        s.spawn(|| {
            while !done.load(Ordering::Acquire) {
                distribution.reset();
                resets.fetch_add(1, Ordering::Relaxed);
                thread::yield_now();
            }
        });

        for _ in 0..2 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    assert_consistent(&distribution.snapshot());
                    let percentiles = distribution.percentiles();
                    assert!(
                        percentiles.iter().all(|(_, v)| *v == 1.0)
                            || percentiles.iter().all(|(_, v)| v.is_nan())
                    );
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert!(resets.load(Ordering::Relaxed) > 0);
    assert_consistent(&distribution.snapshot());
}

#[test]
fn test_records_pair_snapshot_and_digest_from_one_state() {
    let registry = DistributionRegistry::new("app", "node", TimeDistribution::builder()).unwrap();
    let distribution = registry.get_or_create("rtt").unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..3 {
            let distribution = &distribution;
            let done = &done;
            s.spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    distribution.add(SECOND).unwrap();
                }
            });
        }

        for _ in 0..2_000 {
            let record = registry.record("rtt").unwrap();
            assert_eq!(
                record.snapshot.count(),
                record.tdigest.count(),
                "record mixes states: {}",
                record.snapshot
            );
            assert_consistent(&record.snapshot);
        }
        done.store(true, Ordering::Relaxed);
    });
}
