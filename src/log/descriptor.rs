use std::thread::{self, ThreadId};

use super::{AtomicState, State};
use crate::reclaim::Atomic;

/// Tag on a descriptor's own `next` once the descriptor is dead and about to be unlinked. A
/// frozen link is never rewritten again, so nobody can splice through a dying node.
pub(crate) const FROZEN: usize = 1;

/// One insert or remove attempt on a single key.
#[derive(Debug)]
pub(crate) struct Descriptor<K> {
    pub(crate) key: K,
    pub(crate) state: AtomicState,
    pub(crate) next: Atomic<Descriptor<K>>,
    /// Thread that published the descriptor. Diagnostic only.
    #[allow(dead_code)]
    pub(crate) owner: ThreadId,
}

impl<K> Descriptor<K> {
    pub(crate) fn new(key: K, state: State) -> Self {
        debug_assert!(matches!(
            state,
            State::PendingInsert | State::PendingRemove
        ));
        Self {
            key,
            state: AtomicState::new(state),
            next: Atomic::null(),
            owner: thread::current().id(),
        }
    }
}
