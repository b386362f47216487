//! Test harness for `oplog-set`: random workloads, consistency and linearizability checks, and a
//! reclamation scheme that poisons instead of freeing.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod test;
