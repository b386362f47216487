use core::marker::PhantomData;

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::Ordering;
#[cfg(feature = "check-loom")]
use loom::sync::atomic::Ordering;

use super::{Atomic, Guard, Reclaim, Shared};

/// The trivial scheme: nothing is ever freed, so every pointer is always safe to dereference.
#[derive(Debug, Clone, Copy, Default)]
pub struct Leak;

/// Guard of [`Leak`]. Protects nothing because nothing needs protection.
#[derive(Debug, Default)]
pub struct Unprotected {
    _marker: PhantomData<*const ()>,
}

unsafe impl Reclaim for Leak {
    type Guard = Unprotected;

    fn guard() -> Self::Guard {
        Unprotected::default()
    }

    unsafe fn retire<T: Send + 'static>(_: Shared<T>) {}
}

impl Guard for Unprotected {
    #[inline]
    fn protect<T>(&mut self, src: &Atomic<T>) -> Shared<T> {
        src.load(Ordering::Acquire)
    }

    #[inline]
    fn set<T>(&mut self, _: Shared<T>) {}

    #[inline]
    fn clear(&mut self) {}
}
