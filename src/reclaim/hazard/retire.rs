#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{fence, Ordering};
#[cfg(feature = "check-loom")]
use loom::sync::atomic::{fence, Ordering};

use super::HazardBag;
use crate::reclaim::Shared;
use crate::tracing_helpers::debug_log;

/// Thread-local list of retired pointers.
pub(super) struct Retirees<'s> {
    hazards: &'s HazardBag,
    /// The first element of the pair is the address of a retired object and the second is the
    /// function pointer to `free::<T>` where `T` is the type of the object.
    inner: Vec<(usize, unsafe fn(usize))>,
}

impl<'s> Retirees<'s> {
    pub(super) fn new(hazards: &'s HazardBag) -> Self {
        Self {
            hazards,
            inner: Vec::new(),
        }
    }

    /// Retires a pointer, and scans the hazards once `threshold` objects are waiting.
    pub(super) fn retire<T>(&mut self, pointer: Shared<T>, threshold: usize) {
        unsafe fn free<T>(data: usize) {
            // SAFETY: `data` is the address of an object that was allocated as `Owned<T>` and is
            // neither reachable nor protected.
            drop(unsafe { Shared::<T>::from_usize(data).into_owned() })
        }

        self.inner.push((pointer.addr(), free::<T>));
        if self.inner.len() >= threshold {
            self.collect();
        }
    }

    /// Frees the pointers that are retired by the current thread and not protected by any
    /// thread. Returns how many were freed.
    pub(super) fn collect(&mut self) -> usize {
        fence(Ordering::SeqCst);
        let hazards = self.hazards.all_hazards();
        let before = self.inner.len();
        self.inner.retain(|&(data, free)| {
            if hazards.contains(&data) {
                return true;
            }
            // SAFETY: the object was unlinked before it was retired, and the fence above makes
            // every hazard announced before the unlink visible to the scan.
            unsafe { free(data) };
            false
        });
        let reclaimed = before - self.inner.len();
        debug_log!(reclaimed, kept = self.inner.len(), "hazard scan");
        reclaimed
    }
}

impl Drop for Retirees<'_> {
    fn drop(&mut self) {
        // The remaining objects of an exiting thread are still protected by other threads.
        // Wait until they are released.
        while !self.inner.is_empty() {
            let _ = self.collect();
            #[cfg(feature = "check-loom")]
            loom::thread::yield_now();
            #[cfg(not(feature = "check-loom"))]
            std::thread::yield_now();
        }
    }
}
