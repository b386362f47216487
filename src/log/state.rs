use core::fmt;

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{AtomicU8, Ordering};
#[cfg(feature = "check-loom")]
use loom::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a descriptor.
///
/// ```text
/// PendingInsert ──> Committed ──> Dead
///       └──────────────────────────^
/// PendingRemove ─────────────────> Dead
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    PendingInsert = 1,
    PendingRemove = 2,
    Committed = 3,
    Dead = 4,
}

/// Set in the stored byte of a `Dead` descriptor that a remove took out of the set: either a
/// committed entry it deleted or a pending insert it admitted and cancelled.
const EVICTED: u8 = 0x80;

impl State {
    fn decode(byte: u8) -> Self {
        match byte & !EVICTED {
            1 => State::PendingInsert,
            2 => State::PendingRemove,
            3 => State::Committed,
            4 => State::Dead,
            _ => panic!("corrupted descriptor state {byte:#04x}"),
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    pub(crate) fn can_become(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::PendingInsert, State::Committed | State::Dead)
                | (State::PendingRemove, State::Dead)
                | (State::Committed, State::Dead)
        )
    }
}

/// Atomic cell holding a [`State`] plus the eviction bit of a dead descriptor.
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: State) -> Self {
        debug_assert_ne!(state, State::Dead);
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self, ord: Ordering) -> State {
        State::decode(self.0.load(ord))
    }

    /// Whether a remove moved this descriptor to `Dead`.
    #[inline]
    pub(crate) fn is_evicted(&self, ord: Ordering) -> bool {
        let byte = self.0.load(ord);
        State::decode(byte) == State::Dead && byte & EVICTED != 0
    }

    /// Moves from `current` to `new`. On failure, returns the state actually stored.
    #[inline]
    pub(crate) fn compare_exchange(
        &self,
        current: State,
        new: State,
        success: Ordering,
        failure: Ordering,
    ) -> Result<State, State> {
        debug_assert!(current.can_become(new), "{current:?} -> {new:?}");
        self.0
            .compare_exchange(current as u8, new as u8, success, failure)
            .map(State::decode)
            .map_err(State::decode)
    }

    /// Moves from `current` to `Dead` on behalf of a remove that takes the key out of the set.
    #[inline]
    pub(crate) fn evict(
        &self,
        current: State,
        success: Ordering,
        failure: Ordering,
    ) -> Result<State, State> {
        debug_assert!(current.can_become(State::Dead), "{current:?} -> Dead");
        self.0
            .compare_exchange(current as u8, State::Dead as u8 | EVICTED, success, failure)
            .map(State::decode)
            .map_err(State::decode)
    }

    /// Unconditionally stores `new`, returning the previous state.
    #[inline]
    pub(crate) fn swap(&self, new: State, ord: Ordering) -> State {
        let prev = State::decode(self.0.swap(new as u8, ord));
        debug_assert!(prev.can_become(new), "{prev:?} -> {new:?}");
        prev
    }
}

impl fmt::Debug for AtomicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = self.0.load(Ordering::Relaxed);
        f.debug_struct("AtomicState")
            .field("state", &State::decode(byte))
            .field("evicted", &(byte & EVICTED != 0))
            .finish()
    }
}
