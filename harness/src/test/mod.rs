//! Utilities for testing
#![doc(hidden)]

pub mod mock;

pub use poison::Poison;
pub use rand::RandGen;
