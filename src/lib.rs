//! Lock-free concurrent set on a shared log of operation descriptors.
//!
//! Every `insert` and `remove` pushes a descriptor onto a single newest-first log and then
//! resolves itself against the older descriptors for the same key. Threads that run into a
//! pending insert resolve it on its behalf, and dead descriptors are unlinked lazily by
//! whichever walk passes them. Unlinked descriptors are handed to a pluggable reclamation
//! scheme (see [`reclaim`]).
//!
//! ```
//! use oplog_set::LogSet;
//!
//! let set: LogSet<u32> = LogSet::new();
//! assert!(set.insert(1));
//! assert!(!set.insert(1));
//! assert!(set.contains(&1));
//! assert!(set.remove(&1));
//! assert!(!set.contains(&1));
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![deny(unsafe_op_in_unsafe_fn)]

mod tracing_helpers;

mod adt;
mod error;
mod log;
pub mod reclaim;
mod set;

pub use adt::ConcurrentSet;
pub use error::Error;
pub use reclaim::{Epoch, HazardPointer, Leak};
pub use set::LogSet;
