//! Lock-free set over a newest-first log of operation descriptors.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use std::alloc::handle_alloc_error;

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::Ordering;
#[cfg(feature = "check-loom")]
use loom::sync::atomic::Ordering;

use crossbeam_utils::CachePadded;

use crate::log::{Cursor, Descriptor, Seek, State};
use crate::reclaim::{Atomic, Epoch, Guard, Owned, Reclaim, Shared};
use crate::tracing_helpers::{debug_log, trace_log};
use crate::{ConcurrentSet, Error};

/// Lock-free concurrent set.
///
/// `insert` and `remove` publish a descriptor at the head of a shared log and then decide their
/// outcome from the nearest older live descriptor for the same key. An operation is linearized
/// by whichever compare-and-exchange first moves its descriptor out of its pending state, be it
/// the initiator's or a helper's. `R` selects how unlinked descriptors are reclaimed.
///
/// # Keys
///
/// A retired descriptor is dropped whenever the scheme gets to it, possibly on another thread
/// and after the set itself is gone. Keys therefore must be `Send + Sync + 'static`. Borrowed
/// keys are rejected:
///
/// ```compile_fail
/// use oplog_set::LogSet;
///
/// let key = 7u32;
/// let set = LogSet::<&u32>::new();
/// set.insert(&key);
/// ```
///
/// and so are keys that cannot leave their thread:
///
/// ```compile_fail
/// use std::rc::Rc;
/// use oplog_set::LogSet;
///
/// let set = LogSet::<Rc<u32>>::new();
/// set.insert(Rc::new(7));
/// ```
pub struct LogSet<K, R: Reclaim = Epoch> {
    head: CachePadded<Atomic<Descriptor<K>>>,
    _marker: PhantomData<(K, fn() -> R)>,
}

impl<K, R: Reclaim> LogSet<K, R> {
    /// Creates a new, empty set.
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(Atomic::null()),
            _marker: PhantomData,
        }
    }

    /// Pushes a private descriptor at the head of the log.
    fn enlist(&self, desc: Shared<Descriptor<K>>) {
        // SAFETY: `desc` is not published yet, so the caller owns it.
        let node = unsafe { desc.deref() };
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, desc, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }
        trace_log!(state = ?node.state, "descriptor published");
    }

    /// Number of descriptors reachable from the head, dead ones included.
    pub fn log_len(&mut self) -> usize {
        let mut len = 0;
        let mut curr = self.head.load(Ordering::Relaxed);
        // SAFETY: `&mut self` rules out concurrent access, so every reachable node is alive.
        while let Some(node) = unsafe { curr.as_ref() } {
            len += 1;
            curr = node.next.load(Ordering::Relaxed);
        }
        len
    }
}

impl<K: Eq + Send + Sync + 'static, R: Reclaim> LogSet<K, R> {
    /// Decides whether the insert announced by `desc` adds its key, or `None` if `desc` was
    /// already resolved and unlinked by others.
    fn help_insert(&self, desc: &Descriptor<K>) -> Option<bool> {
        let mut cursor = Cursor::<K, R>::new(&desc.next);
        match cursor.seek(&desc.key) {
            Seek::Resolved => None,
            Seek::End | Seek::Found(State::PendingRemove) => Some(true),
            // An earlier pending insert of the same key goes first.
            Seek::Found(State::Committed | State::PendingInsert) => Some(false),
            Seek::Found(State::Dead) => unreachable!("the cursor skips dead descriptors"),
        }
    }

    /// Resolves the insert announced by the published descriptor `desc` and returns its result.
    fn commit_insert(&self, desc: &Descriptor<K>) -> bool {
        let Some(admitted) = self.help_insert(desc) else {
            return desc.state.is_evicted(Ordering::Acquire);
        };
        let resolution = if admitted {
            State::Committed
        } else {
            State::Dead
        };
        match desc.state.compare_exchange(
            State::PendingInsert,
            resolution,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                debug_log!(admitted, "insert resolved");
                admitted
            }
            Err(actual) => {
                // Only the initiator commits, so a helper can only have killed it.
                debug_assert_eq!(actual, State::Dead);
                let evicted = desc.state.is_evicted(Ordering::Acquire);
                debug_log!(evicted, "insert resolved by a helper");
                evicted
            }
        }
    }

    /// Finds the live entry that the remove announced by `desc` takes out of the set, if any,
    /// and kills it.
    fn help_remove(&self, desc: &Descriptor<K>) -> bool {
        let mut cursor = Cursor::<K, R>::new(&desc.next);
        loop {
            match cursor.seek(&desc.key) {
                Seek::End | Seek::Found(State::PendingRemove) => return false,
                Seek::Found(State::Committed) => {
                    if cursor
                        .current()
                        .state
                        .evict(State::Committed, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return true;
                    }
                }
                Seek::Found(State::PendingInsert) => {
                    let insert = cursor.current();
                    match self.help_insert(insert) {
                        Some(true) => {
                            if insert
                                .state
                                .evict(State::PendingInsert, Ordering::AcqRel, Ordering::Acquire)
                                .is_ok()
                            {
                                trace_log!("cancelled pending insert");
                                return true;
                            }
                        }
                        // A duplicate insert: fail it and look further for the real entry.
                        Some(false) => {
                            let _ = insert.state.compare_exchange(
                                State::PendingInsert,
                                State::Dead,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            );
                        }
                        None => {}
                    }
                }
                Seek::Found(State::Dead) => unreachable!("the cursor skips dead descriptors"),
                Seek::Resolved => unreachable!("only the initiator resolves a remove"),
            }
        }
    }

    /// Returns `true` if the set contains `key`.
    pub fn contains(&self, key: &K) -> bool {
        let mut cursor = Cursor::<K, R>::new(&self.head);
        match cursor.seek(key) {
            Seek::Found(state) => state != State::PendingRemove,
            Seek::End => false,
            Seek::Resolved => unreachable!("the head is never frozen"),
        }
    }

    /// Adds `key` to the set. Returns whether the key was newly inserted, or an error if the
    /// descriptor could not be allocated.
    pub fn try_insert(&self, key: K) -> Result<bool, Error> {
        let desc = Owned::try_new(Descriptor::new(key, State::PendingInsert))?.into_shared();
        let mut guard = R::guard();
        guard.set(desc);
        self.enlist(desc);
        // SAFETY: `guard` protects `desc`.
        Ok(self.commit_insert(unsafe { desc.deref() }))
    }

    /// Adds `key` to the set. Returns whether the key was newly inserted.
    ///
    /// Allocation failure is routed to [`handle_alloc_error`].
    pub fn insert(&self, key: K) -> bool {
        match self.try_insert(key) {
            Ok(inserted) => inserted,
            Err(Error::OutOfMemory { .. }) => handle_alloc_error(Layout::new::<Descriptor<K>>()),
        }
    }
}

impl<K: Eq + Clone + Send + Sync + 'static, R: Reclaim> LogSet<K, R> {
    /// Removes `key` from the set. Returns whether the key was present, or an error if the
    /// descriptor could not be allocated.
    pub fn try_remove(&self, key: &K) -> Result<bool, Error> {
        let desc =
            Owned::try_new(Descriptor::new(key.clone(), State::PendingRemove))?.into_shared();
        let mut guard = R::guard();
        guard.set(desc);
        self.enlist(desc);
        // SAFETY: `guard` protects `desc`.
        let node = unsafe { desc.deref() };
        let removed = self.help_remove(node);
        let _ = node.state.swap(State::Dead, Ordering::AcqRel);
        debug_log!(removed, "remove resolved");
        Ok(removed)
    }

    /// Removes `key` from the set. Returns whether the key was present.
    ///
    /// Allocation failure is routed to [`handle_alloc_error`].
    pub fn remove(&self, key: &K) -> bool {
        match self.try_remove(key) {
            Ok(removed) => removed,
            Err(Error::OutOfMemory { .. }) => handle_alloc_error(Layout::new::<Descriptor<K>>()),
        }
    }
}

impl<K, R: Reclaim> Default for LogSet<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, R: Reclaim> Drop for LogSet<K, R> {
    fn drop(&mut self) {
        let mut curr = self.head.load(Ordering::Relaxed);
        while !curr.is_null() {
            // SAFETY: since we have `&mut self`, no operation is in flight, and every reachable
            // descriptor is owned by the log. Retired ones are no longer reachable.
            let node = unsafe { curr.with_tag(0).into_owned() }.into_box();
            curr = node.next.load(Ordering::Relaxed);
        }
    }
}

impl<K, R: Reclaim> fmt::Debug for LogSet<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSet").finish_non_exhaustive()
    }
}

impl<K: Eq + Clone + Send + Sync + 'static, R: Reclaim> ConcurrentSet<K> for LogSet<K, R> {
    fn contains(&self, key: &K) -> bool {
        self.contains(key)
    }

    fn insert(&self, key: K) -> bool {
        self.insert(key)
    }

    fn remove(&self, key: &K) -> bool {
        self.remove(key)
    }
}

#[cfg(all(test, not(feature = "check-loom")))]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering::*};
    use std::sync::Arc;
    use std::thread::scope;

    use super::LogSet;
    use crate::log::{Descriptor, State};
    use crate::reclaim::{Epoch, HazardPointer, Leak, Owned, Reclaim, Shared};

    fn publish<R: Reclaim>(
        set: &LogSet<u32, R>,
        key: u32,
        state: State,
    ) -> Shared<Descriptor<u32>> {
        let desc = Owned::new(Descriptor::new(key, state)).into_shared();
        set.enlist(desc);
        desc
    }

    #[test]
    fn sequential() {
        let set = LogSet::<u32>::new();
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert!(set.contains(&1));
        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert!(!set.contains(&1));
        assert!(set.insert(1));
        assert!(set.contains(&1));
    }

    #[test]
    fn keys_are_independent() {
        let mut set = LogSet::<u32>::new();
        for key in 0..16 {
            assert!(set.try_insert(key).unwrap());
        }
        for key in (0..16).step_by(2) {
            assert!(set.try_remove(&key).unwrap());
        }
        for key in 0..16 {
            assert_eq!(set.contains(&key), key % 2 == 1);
        }
        assert!(set.log_len() >= 8);
    }

    #[test]
    fn log_stays_bounded() {
        let mut set = LogSet::<u32>::new();
        for _ in 0..1000 {
            assert!(set.insert(7));
            assert!(set.remove(&7));
            assert!(set.log_len() <= 2);
        }
        // The scan from the head prunes whatever is left.
        assert!(!set.contains(&7));
        assert_eq!(set.log_len(), 0);
    }

    #[test]
    fn earlier_pending_insert_wins() {
        let set = LogSet::<u32, Leak>::new();
        let older = publish(&set, 1, State::PendingInsert);
        let newer = publish(&set, 1, State::PendingInsert);
        unsafe {
            assert_eq!(set.help_insert(newer.deref()), Some(false));
            assert_eq!(set.help_insert(older.deref()), Some(true));
            assert!(!set.commit_insert(newer.deref()));
            assert!(set.commit_insert(older.deref()));
        }
        assert!(set.contains(&1));
    }

    #[test]
    fn pending_remove_admits_insert() {
        let set = LogSet::<u32, Leak>::new();
        let _ = publish(&set, 1, State::PendingRemove);
        let insert = publish(&set, 1, State::PendingInsert);
        assert_eq!(unsafe { set.help_insert(insert.deref()) }, Some(true));
    }

    #[test]
    fn remove_cancels_admitted_insert() {
        let set = LogSet::<u32, Leak>::new();
        let insert = publish(&set, 2, State::PendingInsert);
        // `contains` is optimistic about pending inserts.
        assert!(set.contains(&2));
        assert!(set.remove(&2));
        let insert = unsafe { insert.deref() };
        assert_eq!(insert.state.load(Acquire), State::Dead);
        assert!(insert.state.is_evicted(Acquire));
        // The initiator loses its own commit but still reports success.
        assert!(set.commit_insert(insert));
        assert!(!set.contains(&2));
    }

    #[test]
    fn remove_skips_duplicate_insert() {
        let set = LogSet::<u32, Leak>::new();
        assert!(set.insert(3));
        let duplicate = publish(&set, 3, State::PendingInsert);
        assert!(set.remove(&3));
        let duplicate = unsafe { duplicate.deref() };
        assert_eq!(duplicate.state.load(Acquire), State::Dead);
        assert!(!duplicate.state.is_evicted(Acquire));
        assert!(!set.commit_insert(duplicate));
        assert!(!set.contains(&3));
        assert!(!set.remove(&3));
    }

    #[derive(Clone)]
    struct Tracked(u32, Arc<AtomicUsize>);

    impl PartialEq for Tracked {
        fn eq(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    impl Eq for Tracked {}

    impl Drop for Tracked {
        fn drop(&mut self) {
            let _ = self.1.fetch_add(1, Relaxed);
        }
    }

    #[test]
    fn drop_frees_reachable_descriptors() {
        let drops = Arc::new(AtomicUsize::new(0));
        let set = LogSet::<Tracked, Leak>::new();
        for key in 0..10 {
            assert!(set.insert(Tracked(key, drops.clone())));
        }
        assert_eq!(drops.load(Relaxed), 0);
        drop(set);
        assert_eq!(drops.load(Relaxed), 10);
    }

    fn parallel_usage<R: Reclaim>() {
        const THREADS: u32 = 4;
        const ITER: usize = 1024 * 4;

        let set = LogSet::<u32, R>::new();
        scope(|s| {
            for key in 0..THREADS {
                let set = &set;
                let _ = s.spawn(move || {
                    for _ in 0..ITER {
                        assert!(set.insert(key));
                        assert!(set.contains(&key));
                        assert!(set.remove(&key));
                    }
                });
            }
        });
        for key in 0..THREADS {
            assert!(!set.contains(&key));
        }
    }

    #[test]
    fn parallel_usage_epoch() {
        parallel_usage::<Epoch>();
    }

    #[test]
    fn parallel_usage_hazard_pointer() {
        parallel_usage::<HazardPointer>();
    }

    #[test]
    fn parallel_usage_leak() {
        parallel_usage::<Leak>();
    }
}
