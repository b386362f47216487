//! Safe memory reclamation port.
//!
//! The set never frees a descriptor by itself. It asks a [`Reclaim`] scheme for a [`Guard`]
//! before it dereferences anything it loaded from the log, and hands every unlinked descriptor
//! to [`Reclaim::retire`] exactly once. The scheme decides when the memory actually goes away.
//!
//! ```text
//! LogSet<K, R: Reclaim>
//!     │
//!     ├── LogSet<K, Epoch>          (crossbeam-epoch, default)
//!     ├── LogSet<K, HazardPointer>  (per-pointer protection, bounded garbage)
//!     └── LogSet<K, Leak>           (never frees)
//! ```
//!
//! A guard protects at most one pointer at a time. Traversals that need to keep several nodes
//! alive hold several guards and rotate them.

mod atomic;
mod epoch;
pub mod hazard;
mod leak;

pub use atomic::{Atomic, Owned, Shared};
pub use epoch::{Epoch, EpochGuard};
pub use hazard::{HazardPointer, Shield};
pub use leak::{Leak, Unprotected};

/// A memory reclamation scheme.
///
/// # Safety
///
/// An object passed to [`Reclaim::retire`] must not be freed while a guard obtained from
/// [`Reclaim::guard`] protects it, where "protects" means the guard returned it from
/// [`Guard::protect`] or received it through [`Guard::set`] and has not been cleared or dropped
/// since.
pub unsafe trait Reclaim: 'static {
    /// Protection token handed out by this scheme.
    type Guard: Guard;

    /// Returns a fresh guard that protects nothing yet.
    fn guard() -> Self::Guard;

    /// Schedules `ptr` to be freed once no guard protects it anymore.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Owned::into_shared`], must already be unreachable for threads that
    /// do not protect it, and must be retired at most once.
    ///
    /// The object may be dropped later on any thread, so it may not borrow anything.
    unsafe fn retire<T: Send + 'static>(ptr: Shared<T>);
}

/// Scoped protection of a single pointer.
pub trait Guard {
    /// Loads `src` and protects the loaded pointer. The returned pointer was the value of `src`
    /// at some point after protection took effect, so it is safe to dereference until this guard
    /// is cleared, reused, or dropped.
    fn protect<T>(&mut self, src: &Atomic<T>) -> Shared<T>;

    /// Protects a pointer that the caller already keeps alive, such as an object that has not
    /// been published yet.
    fn set<T>(&mut self, ptr: Shared<T>);

    /// Releases the current protection.
    fn clear(&mut self);
}
