use core::fmt;
use core::marker::PhantomData;

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::Ordering;
#[cfg(feature = "check-loom")]
use loom::sync::atomic::Ordering;

use super::{Atomic, Guard, Reclaim, Shared};

/// Epoch-based reclamation on top of the global crossbeam-epoch collector.
///
/// Each guard keeps the current thread pinned, so everything it loads stays alive until the guard
/// is dropped. Retired objects are destroyed once every thread has moved past the epoch in which
/// they were retired.
#[derive(Debug, Clone, Copy, Default)]
pub struct Epoch;

/// A pinned crossbeam-epoch guard.
pub struct EpochGuard {
    guard: CrossbeamGuard,
    _marker: PhantomData<*const ()>, // !Send + !Sync
}

unsafe impl Reclaim for Epoch {
    type Guard = EpochGuard;

    fn guard() -> Self::Guard {
        EpochGuard {
            guard: epoch::pin(),
            _marker: PhantomData,
        }
    }

    unsafe fn retire<T: Send + 'static>(ptr: Shared<T>) {
        let guard = epoch::pin();
        // SAFETY: the object is unreachable, so only threads pinned before this point can still
        // reach it, and the collector waits for them.
        unsafe {
            guard.defer_unchecked(move || drop(ptr.into_owned()));
        }
    }
}

impl Guard for EpochGuard {
    #[inline]
    fn protect<T>(&mut self, src: &Atomic<T>) -> Shared<T> {
        src.load(Ordering::Acquire)
    }

    #[inline]
    fn set<T>(&mut self, _: Shared<T>) {}

    #[inline]
    fn clear(&mut self) {}
}

impl EpochGuard {
    /// Flushes the thread-local garbage of the collector and tries to advance the epoch.
    pub fn flush(&self) {
        self.guard.flush();
    }
}

impl fmt::Debug for EpochGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochGuard").finish_non_exhaustive()
    }
}
