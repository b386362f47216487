//! The shared log: descriptors, their lifecycle, and the walk that prunes dead ones.

mod cursor;
mod descriptor;
mod state;

pub(crate) use cursor::{Cursor, Seek};
pub(crate) use descriptor::{Descriptor, FROZEN};
pub(crate) use state::{AtomicState, State};
