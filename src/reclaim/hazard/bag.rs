use core::fmt;
use core::ptr::{self, NonNull};
use std::collections::HashSet;

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
#[cfg(feature = "check-loom")]
use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use super::HAZARDS;

/// Represents the ownership of a hazard pointer slot.
pub struct Shield {
    slot: NonNull<HazardSlot>,
}

impl Shield {
    /// Creates a new shield owning a slot of `hazards`.
    pub fn new(hazards: &HazardBag) -> Self {
        let slot = hazards.acquire_slot();
        Self { slot: slot.into() }
    }

    /// Publishes the address `addr` as a hazard. `0` means "nothing".
    #[inline]
    pub(super) fn announce(&self, addr: usize) {
        self.slot().hazard.store(addr, Ordering::Release);
    }

    fn slot(&self) -> &HazardSlot {
        // SAFETY: slots are never freed while their bag is alive, and a shield never outlives
        // its bag.
        unsafe { self.slot.as_ref() }
    }
}

impl Default for Shield {
    fn default() -> Self {
        Self::new(&HAZARDS)
    }
}

impl Drop for Shield {
    /// Clear and release the ownership of the hazard slot.
    fn drop(&mut self) {
        let slot = self.slot();
        slot.hazard.store(0, Ordering::Release);
        slot.active.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Shield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shield")
            .field("slot address", &self.slot)
            .field("slot data", self.slot())
            .finish()
    }
}

/// Global bag (multiset) of hazard pointers.
///
/// `HazardBag.head` and `HazardSlot.next` form a grow-only list of all hazard slots. Slots are
/// never removed from this list. A slot is owned by at most one shield at a time, tracked by its
/// `active` flag: a shield claims a released slot by flipping the flag, and only allocates a new
/// slot when every existing one is in use.
///
/// ```text
///       next  s5        s4        s3        s2        s1
/// head  ---> +--+ ---> +--+ ---> +--+ ---> +--+ ---> +--+
///            |on|      |  |      |on|      |  |      |on|
///            +--+      +--+      +--+      +--+      +--+
/// ```
#[derive(Debug)]
pub struct HazardBag {
    head: AtomicPtr<HazardSlot>,
}

#[derive(Debug)]
struct HazardSlot {
    // Whether a shield owns this slot.
    active: AtomicBool,
    // Machine representation of the hazard pointer.
    hazard: AtomicUsize,
    // Immutable pointer to the next slot in the bag.
    next: *const HazardSlot,
}

impl HazardSlot {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            hazard: AtomicUsize::new(0),
            next: ptr::null(),
        }
    }
}

impl HazardBag {
    #[cfg(not(feature = "check-loom"))]
    /// Creates a new global hazard set.
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[cfg(feature = "check-loom")]
    /// Creates a new global hazard set.
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Acquires a slot in the hazard set, either by claiming a released slot or allocating a new
    /// slot.
    fn acquire_slot(&self) -> &HazardSlot {
        if let Some(slot) = self.try_acquire_inactive() {
            return slot;
        }

        let slot = Box::into_raw(Box::new(HazardSlot::new()));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `slot` is not published yet, so we have exclusive access.
            unsafe { (*slot).next = head };
            match self
                .head
                .compare_exchange(head, slot, Ordering::Release, Ordering::Relaxed)
            {
                // SAFETY: slots are freed only when the bag is dropped.
                Ok(_) => return unsafe { &*slot },
                Err(current) => head = current,
            }
        }
    }

    /// Claims a slot that no shield owns, if any.
    fn try_acquire_inactive(&self) -> Option<&HazardSlot> {
        self.slots().find(|slot| {
            !slot.active.load(Ordering::Relaxed)
                && slot
                    .active
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
        })
    }

    fn slots(&self) -> impl Iterator<Item = &HazardSlot> {
        let mut curr = self.head.load(Ordering::Acquire) as *const HazardSlot;
        core::iter::from_fn(move || {
            // SAFETY: slots are immutable after publication except for their atomics, and are
            // freed only when the bag is dropped.
            let slot = unsafe { curr.as_ref() }?;
            curr = slot.next;
            Some(slot)
        })
    }

    /// Returns all the hazards in the set. The returned set does not contain 0.
    pub fn all_hazards(&self) -> HashSet<usize> {
        self.slots()
            .map(|slot| slot.hazard.load(Ordering::Acquire))
            .filter(|&hazard| hazard != 0)
            .collect()
    }
}

impl Drop for HazardBag {
    fn drop(&mut self) {
        let mut curr = self.head.load(Ordering::Relaxed);
        while !curr.is_null() {
            // SAFETY: exclusive access; every slot was allocated with `Box`.
            let slot = unsafe { Box::from_raw(curr) };
            curr = slot.next as *mut HazardSlot;
        }
    }
}

unsafe impl Send for HazardSlot {}
unsafe impl Sync for HazardSlot {}
