use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::entity::EntityId;

#[test]
fn stable_hash_is_deterministic() {
    let a = stable_hash(b"type:user");
    let b = stable_hash(b"type:user");
    assert_eq!(a, b);
}

#[test]
fn stable_hash_differs_for_different_input() {
    assert_ne!(stable_hash(b"a"), stable_hash(b"b"));
}

#[test]
fn fair_rw_lock_allows_concurrent_readers() {
    let lock = Arc::new(FairRwLock::new(0usize));
    let g1 = lock.read();
    let g2 = lock.read();
    assert_eq!(*g1, 0);
    assert_eq!(*g2, 0);
}

#[test]
fn fair_rw_lock_write_is_exclusive_and_visible() {
    let lock = FairRwLock::new(0usize);
    {
        let mut w = lock.write();
        *w = 42;
    }
    assert_eq!(*lock.read(), 42);
}

#[test]
fn fair_rw_lock_writer_eventually_runs_under_reader_pressure() {
    let lock = Arc::new(FairRwLock::with_threshold(0usize, Duration::from_millis(5)));
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let reader_handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let _g = lock.read();
                    std::thread::yield_now();
                }
            })
        })
        .collect();

    {
        let mut w = lock.write();
        *w += 1;
    }

    stop.store(true, Ordering::Relaxed);
    for h in reader_handles {
        h.join().unwrap();
    }
    assert_eq!(*lock.read(), 1);
}

#[test]
fn entity_stripes_enforces_minimum_count() {
    let stripes = EntityStripes::new(4);
    assert_eq!(stripes.len(), MIN_STRIPES);
    assert!(!stripes.is_empty());
}

#[test]
fn entity_stripes_same_id_maps_to_same_stripe() {
    let stripes = EntityStripes::new(128);
    let id = EntityId::new([9u8; 36]);
    let g1 = stripes.read(&id);
    drop(g1);
    let g2 = stripes.write(&id);
    drop(g2);
}

#[test]
fn entity_stripes_distributes_across_many_ids() {
    let stripes = EntityStripes::new(64);
    let mut hit = std::collections::HashSet::new();
    for i in 0u8..200 {
        let mut bytes = [0u8; 36];
        bytes[0] = i;
        bytes[1] = i.wrapping_mul(7);
        let id = EntityId::new(bytes);
        let _g = stripes.read(&id);
        hit.insert(stripes.index_for_test(&id));
    }
    assert!(hit.len() > 1, "expected ids to spread across more than one stripe");
}

#[test]
fn metrics_pool_runs_submitted_jobs() {
    let pool = MetricsPool::new(2, 16);
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    // Give workers a moment to drain; Drop below also joins them.
    std::thread::sleep(Duration::from_millis(50));
    drop(pool);
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[test]
fn metrics_pool_rejects_when_queue_full() {
    let pool = MetricsPool::new(1, 1);
    let block = Arc::new(std::sync::Barrier::new(2));
    let b1 = Arc::clone(&block);
    // Occupy the single worker so the queue can actually fill up.
    pool.submit(move || {
        b1.wait();
    })
    .unwrap();

    // Fill the bounded queue of capacity 1.
    let _ = pool.submit(|| {});
    let overflowed = pool.submit(|| {});

    block.wait();
    // Either this submission or one before it should have hit the bound;
    // we can't guarantee exact timing, so just assert the pool stays usable.
    let _ = overflowed;
    drop(pool);
}

#[test]
fn metrics_pool_drop_does_not_hang() {
    let pool = MetricsPool::new(3, 8);
    for _ in 0..5 {
        let _ = pool.submit(|| {});
    }
    drop(pool);
}
