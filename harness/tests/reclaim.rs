#![cfg(not(feature = "check-loom"))]

mod common;

use std::thread::scope;

use oplog_set::reclaim::{Owned, Reclaim};
use oplog_set::{Epoch, HazardPointer, Leak, LogSet};
use oplog_set_harness::test::poison::{retired_count, Poison};

// Every thread keeps inserting and removing its own key, so every single remove must succeed.
fn parallel_usage<R: Reclaim>() {
    const THREADS: u32 = 8;
    const ITER: usize = 1024 * 8;

    let set = LogSet::<u32, R>::new();
    scope(|s| {
        for key in 0..THREADS {
            let set = &set;
            let _ = s.spawn(move || {
                for _ in 0..ITER {
                    assert!(set.insert(key));
                    assert!(set.remove(&key));
                }
            });
        }
    });
    for key in 0..THREADS {
        assert!(!set.contains(&key));
    }
}

#[test]
fn parallel_usage_epoch() {
    parallel_usage::<Epoch>();
}

#[test]
fn parallel_usage_hazard_pointer() {
    parallel_usage::<HazardPointer<4>>();
}

#[test]
fn parallel_usage_leak() {
    parallel_usage::<Leak>();
}

#[test]
fn parallel_usage_poison() {
    common::init_tracing();
    parallel_usage::<Poison>();
}

// All threads fight over one key. A reclaimed descriptor that is still read panics on its
// poisoned state.
#[test]
fn shared_key_under_poison() {
    const THREADS: usize = 8;
    const ITER: usize = 1024 * 8;

    let set = LogSet::<String, Poison>::new();
    let key = "shared".to_string();
    let before = retired_count();
    scope(|s| {
        for t in 0..THREADS {
            let (set, key) = (&set, &key);
            let _ = s.spawn(move || {
                for i in 0..ITER {
                    match (t + i) % 3 {
                        0 => {
                            let _ = set.insert(key.clone());
                        }
                        1 => {
                            let _ = set.remove(key);
                        }
                        _ => {
                            let _ = set.contains(key);
                        }
                    }
                }
            });
        }
    });
    assert!(retired_count() > before);
}

// Repeated insert/remove of the same key without lagging readers keeps the log short.
fn bounded_growth<R: Reclaim>() {
    let mut set = LogSet::<u64, R>::new();
    for round in 0..10_000 {
        assert!(set.insert(round % 3));
        assert!(set.remove(&(round % 3)));
        assert!(set.log_len() <= 4, "log grew to {}", set.log_len());
    }
}

#[test]
fn bounded_growth_epoch() {
    bounded_growth::<Epoch>();
}

#[test]
fn bounded_growth_hazard_pointer() {
    bounded_growth::<HazardPointer>();
}

#[test]
fn bounded_growth_poison() {
    bounded_growth::<Poison>();
}

#[test]
#[should_panic(expected = "retired twice")]
fn double_retire_is_caught() {
    let ptr = Owned::new(0u64).into_shared();
    unsafe {
        Poison::retire(ptr);
        Poison::retire(ptr);
    }
}
