use thiserror::Error;

/// Errors reported by the fallible set operations.
///
/// Duplicate inserts and removals of absent keys are not errors; they return `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A new operation descriptor could not be allocated. Nothing was published, so the
    /// set is unchanged and the call may be retried.
    #[error("out of memory allocating an operation descriptor ({size} bytes, align {align})")]
    OutOfMemory {
        /// Requested allocation size.
        size: usize,
        /// Requested allocation alignment.
        align: usize,
    },
}
