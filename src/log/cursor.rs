use core::{mem, ptr};

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::Ordering;
#[cfg(feature = "check-loom")]
use loom::sync::atomic::Ordering;

use super::{Descriptor, State, FROZEN};
use crate::reclaim::{Atomic, Guard, Reclaim, Shared};
use crate::tracing_helpers::trace_log;

/// Outcome of [`Cursor::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Seek {
    /// The cursor stands on the nearest live descriptor with the key, which was in this state.
    Found(State),
    /// No live descriptor with the key is older than the origin.
    End,
    /// The descriptor owning the origin link died and was frozen, so its walk is moot.
    Resolved,
}

/// Walks the log from an origin link toward older descriptors, unlinking and retiring the dead
/// ones it passes.
///
/// Two guards rotate along the walk: one for the node owning `prev` and one for `curr`. The
/// successor of `curr` is only compared and spliced, never dereferenced, so it needs none. The
/// origin itself is either the head of the set or the link of a descriptor the caller protects.
pub(crate) struct Cursor<'o, K, R: Reclaim> {
    origin: &'o Atomic<Descriptor<K>>,
    prev: *const Atomic<Descriptor<K>>,
    curr: Shared<Descriptor<K>>,
    prev_guard: R::Guard,
    curr_guard: R::Guard,
}

impl<'o, K: Eq + Send + Sync + 'static, R: Reclaim> Cursor<'o, K, R> {
    pub(crate) fn new(origin: &'o Atomic<Descriptor<K>>) -> Self {
        Self {
            origin,
            prev: origin,
            curr: Shared::null(),
            prev_guard: R::guard(),
            curr_guard: R::guard(),
        }
    }

    fn restart(&mut self) {
        self.prev = self.origin;
        self.prev_guard.clear();
    }

    /// Moves to the nearest live descriptor for `key`, starting from the current position.
    /// Calling it again after a [`Seek::Found`] re-evaluates the same descriptor, or whatever
    /// replaced it if it died in the meantime.
    pub(crate) fn seek(&mut self, key: &K) -> Seek {
        loop {
            // SAFETY: `prev` is the origin or the link of the node protected by `prev_guard`.
            let prev = unsafe { &*self.prev };
            let curr = self.curr_guard.protect(prev);
            if curr.tag() & FROZEN != 0 {
                if ptr::eq(self.prev, self.origin) {
                    return Seek::Resolved;
                }
                // The node owning `prev` is being unlinked under us.
                self.restart();
                continue;
            }
            self.curr = curr;

            // SAFETY: `curr` was reachable through an unfrozen link when `curr_guard` protected
            // it, so it was not retired.
            let Some(node) = (unsafe { curr.as_ref() }) else {
                return Seek::End;
            };
            let next = node.next.load(Ordering::Acquire);
            let state = node.state.load(Ordering::Acquire);

            if state == State::Dead {
                if next.tag() & FROZEN == 0 {
                    let _ = node.next.fetch_or(FROZEN, Ordering::AcqRel);
                    continue;
                }
                if prev
                    .compare_exchange(curr, next.with_tag(0), Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    trace_log!("unlinked dead descriptor");
                    // SAFETY: the successful CAS made `curr` unreachable, and it is the only CAS
                    // that can remove it from the log.
                    unsafe { R::retire(curr) };
                }
                continue;
            }
            debug_assert_eq!(next.tag(), 0, "only dead descriptors are frozen");

            if node.key == *key {
                return Seek::Found(state);
            }
            self.prev = &node.next;
            mem::swap(&mut self.prev_guard, &mut self.curr_guard);
        }
    }

    /// The descriptor the last [`Seek::Found`] stopped at.
    pub(crate) fn current(&self) -> &Descriptor<K> {
        debug_assert!(!self.curr.is_null());
        // SAFETY: `curr_guard` still protects `curr`.
        unsafe { self.curr.deref() }
    }
}
