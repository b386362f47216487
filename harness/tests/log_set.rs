#![cfg(not(feature = "check-loom"))]

mod common;

use crossbeam_utils::thread;
use oplog_set::{ConcurrentSet, Epoch, HazardPointer, LogSet};
use oplog_set_harness::test::{lincheck, set, Poison};

#[test]
fn smoke() {
    common::init_tracing();
    let set = LogSet::<u32>::new();
    assert!(set.insert(1));
    assert!(set.insert(2));
    assert!(set.insert(3));
    assert!(set.remove(&2));
    assert!(set.contains(&1));
    assert!(!set.contains(&2));
    assert!(set.contains(&3));
    assert!(set.remove(&3));
}

#[test]
fn generic_over_the_trait() {
    fn churn<S: ConcurrentSet<String>>(set: &S) {
        assert!(set.insert("a".to_string()));
        assert!(!set.insert("a".to_string()));
        assert!(set.remove(&"a".to_string()));
        assert!(!set.contains(&"a".to_string()));
    }
    churn(&LogSet::<String>::default());
    churn(&LogSet::<String, HazardPointer>::default());
}

#[test]
fn contains_never_blocks_on_writers() {
    common::init_tracing();
    let set = LogSet::<u8>::new();
    let results = thread::scope(|s| {
        let writers = (0..4)
            .map(|_| {
                s.spawn(|_| {
                    for _ in 0..4096 {
                        let _ = set.insert(7);
                        let _ = set.remove(&7);
                    }
                })
            })
            .collect::<Vec<_>>();
        let reader = s.spawn(|_| (0..4096).filter(|_| set.contains(&7)).count());
        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap()
    })
    .unwrap();
    assert!(results <= 4096);
    assert!(!set.contains(&7));
}

const THREADS: usize = 16;
const STEPS: usize = 4096 * 4;

macro_rules! set_suite {
    ($name:ident, $reclaim:ty) => {
        mod $name {
            use super::*;

            type Set<T> = LogSet<T, $reclaim>;

            #[test]
            fn stress_sequential() {
                set::stress_sequential::<String, Set<String>>(STEPS);
                set::stress_sequential::<u32, Set<u32>>(STEPS);
            }

            #[test]
            fn stress_concurrent() {
                set::stress_concurrent::<u8, Set<u8>>(THREADS, STEPS);
            }

            #[test]
            fn log_concurrent() {
                set::log_concurrent::<u8, Set<u8>>(THREADS, STEPS);
            }

            #[test]
            fn lincheck() {
                for _ in 0..8 {
                    lincheck::lincheck::<Set<u8>>(4, 512, 4);
                }
            }
        }
    };
}

set_suite!(epoch, Epoch);
set_suite!(hazard_pointer, HazardPointer);
set_suite!(hazard_pointer_eager, HazardPointer<1>);
set_suite!(poison, Poison);
