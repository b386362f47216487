//! Hazard pointers.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::Ordering;
//! use oplog_set::reclaim::{hazard, Atomic, Guard, HazardPointer, Owned, Reclaim, Shared};
//!
//! let atomic = Atomic::from(Owned::new(1).into_shared());
//! let mut shield = HazardPointer::<64>::guard();
//! let ptr = shield.protect(&atomic);
//! assert_eq!(unsafe { *ptr.deref() }, 1);
//!
//! // unlink the block and retire
//! atomic.store(Shared::null(), Ordering::Relaxed);
//! drop(shield);
//! unsafe { HazardPointer::<64>::retire(ptr) };
//!
//! // manually trigger reclamation (not necessary)
//! hazard::collect();
//! ```
//!
//! # Synchronization
//!
//! A reader announces a pointer in its hazard slot and then checks that the pointer is still
//! reachable. A reclaimer unlinks the object and then scans all hazard slots before freeing it.
//!
//! ```text
//! (R1) announce b in a hazard slot   | (W1) unlink b and retire it
//!      fence(SeqCst)                 |      fence(SeqCst)
//! (R2) re-read the source, deref b   | (W2) scan the hazard slots, free b if absent
//!      if it still points to b       |
//! (R3) clear the slot (Release)      |
//! ```
//!
//! The two SC fences are totally ordered, so either R1 is visible to W2 (b is kept) or W1 is
//! visible to R2 (validation fails and the reader never touches b). If W2 reads the cleared slot
//! of R3, the release/acquire pair orders every access of the reader before the free.

use core::cell::RefCell;

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{fence, Ordering};
#[cfg(feature = "check-loom")]
use loom::sync::atomic::{fence, Ordering};

#[cfg(feature = "check-loom")]
use loom::thread_local;
#[cfg(not(feature = "check-loom"))]
use std::thread_local;

mod bag;
mod retire;

pub use bag::{HazardBag, Shield};
use retire::Retirees;

use super::{Atomic, Guard, Reclaim, Shared};

#[cfg(not(feature = "check-loom"))]
/// Global set of all hazard pointers.
pub static HAZARDS: HazardBag = HazardBag::new();

#[cfg(feature = "check-loom")]
loom::lazy_static! {
    /// Global set of all hazard pointers.
    pub static ref HAZARDS: HazardBag = HazardBag::new();
}

thread_local! {
    /// Thread-local list of retired pointers.
    static RETIRED: RefCell<Retirees<'static>> = RefCell::new(Retirees::new(&HAZARDS));
}

/// Hazard-pointer reclamation. A thread scans the global hazard slots once its local list of
/// retired objects reaches `SCAN_THRESHOLD` entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct HazardPointer<const SCAN_THRESHOLD: usize = 64>;

unsafe impl<const SCAN_THRESHOLD: usize> Reclaim for HazardPointer<SCAN_THRESHOLD> {
    type Guard = Shield;

    fn guard() -> Self::Guard {
        Shield::default()
    }

    unsafe fn retire<T: Send + 'static>(ptr: Shared<T>) {
        RETIRED.with(|r| r.borrow_mut().retire(ptr, SCAN_THRESHOLD));
    }
}

impl Guard for Shield {
    fn protect<T>(&mut self, src: &Atomic<T>) -> Shared<T> {
        let mut ptr = src.load(Ordering::Relaxed);
        loop {
            self.announce(ptr.addr());
            fence(Ordering::SeqCst);
            let current = src.load(Ordering::Acquire);
            if current == ptr {
                return ptr;
            }
            ptr = current;
        }
    }

    fn set<T>(&mut self, ptr: Shared<T>) {
        self.announce(ptr.addr());
    }

    fn clear(&mut self) {
        self.announce(0);
    }
}

/// Frees the pointers that are retired by the current thread and not protected by any thread.
pub fn collect() {
    let _ = RETIRED.with(|r| r.borrow_mut().collect());
}
