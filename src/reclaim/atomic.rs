use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use std::alloc;

#[cfg(not(feature = "check-loom"))]
use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "check-loom")]
use loom::sync::atomic::{AtomicUsize, Ordering};

use crate::Error;

/// Low bits of a pointer to `T` that alignment leaves free for a tag.
#[inline]
fn tag_mask<T>() -> usize {
    mem::align_of::<T>() - 1
}

/// Splits a tagged pointer into its address and its tag.
#[inline]
fn split<T>(data: usize) -> (usize, usize) {
    (data & !tag_mask::<T>(), data & tag_mask::<T>())
}

/// An owned heap-allocated object that no other thread can see yet.
///
/// This type is very similar to `Box<T>`, except that the allocation can fail gracefully and
/// the pointer can be handed over to the shared structure with [`Owned::into_shared`].
pub struct Owned<T> {
    data: usize,
    _marker: PhantomData<Box<T>>,
}

/// An atomic, tagged pointer that can be safely shared between threads.
///
/// The pointer must be properly aligned. Since it is aligned, a tag can be stored into the unused
/// least significant bits of the address. For example, the tag for a pointer to a sized type `T`
/// should be less than `mem::align_of::<T>()`.
pub struct Atomic<T> {
    data: AtomicUsize,
    _marker: PhantomData<*const T>,
}

/// A snapshot of an [`Atomic`]: a tagged pointer that is only safe to dereference while some
/// [`Guard`](super::Guard) protects it.
pub struct Shared<T> {
    data: usize,
    _marker: PhantomData<*const T>,
}

impl<T> Owned<T> {
    /// Allocates `value` on the heap and returns a new owned pointer pointing to it.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Like [`Owned::new`], but reports allocation failure instead of aborting the process.
    pub fn try_new(value: T) -> Result<Self, Error> {
        let layout = Layout::new::<T>();
        if layout.size() == 0 {
            return Ok(Self::new(value));
        }

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) }.cast::<T>();
        if ptr.is_null() {
            return Err(Error::OutOfMemory {
                size: layout.size(),
                align: layout.align(),
            });
        }

        // SAFETY: `ptr` is a fresh allocation made for `T` by the global allocator, so it is
        // valid for writes, and `Box<T>` may take it over later.
        unsafe { ptr.write(value) };
        Ok(Self {
            data: ptr as usize,
            _marker: PhantomData,
        })
    }

    fn from_box(value: Box<T>) -> Self {
        Self {
            data: Box::into_raw(value) as usize,
            _marker: PhantomData,
        }
    }

    /// Converts the owned pointer into a [`Shared`]. The allocation is leaked until it is
    /// either retired or taken back with [`Shared::into_owned`].
    pub fn into_shared(self) -> Shared<T> {
        let data = self.data;
        mem::forget(self);
        Shared::from_usize(data)
    }

    /// Converts the owned pointer back into a `Box`.
    pub fn into_box(self) -> Box<T> {
        let (data, _) = split::<T>(self.data);
        mem::forget(self);
        // SAFETY: `data` came from `Box::into_raw` or an equivalent global allocation.
        unsafe { Box::from_raw(data as *mut T) }
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        let (data, _) = split::<T>(self.data);
        // SAFETY: we own the allocation and nobody else can reach it.
        drop(unsafe { Box::from_raw(data as *mut T) });
    }
}

impl<T> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&(self.data as *const T)).finish()
    }
}

unsafe impl<T: Send + Sync> Send for Atomic<T> {}
unsafe impl<T: Send + Sync> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    /// Returns a new null atomic pointer.
    pub fn null() -> Self {
        Self::from(Shared::null())
    }

    /// Loads a `Shared` from the atomic pointer.
    #[inline]
    pub fn load(&self, ord: Ordering) -> Shared<T> {
        Shared::from_usize(self.data.load(ord))
    }

    /// Stores a `Shared` into the atomic pointer.
    #[inline]
    pub fn store(&self, new: Shared<T>, ord: Ordering) {
        self.data.store(new.data, ord);
    }

    /// Stores `new` if the current value is `current`. The tag is part of the comparison, so two
    /// pointers to the same object with different tags are not equal.
    ///
    /// Returns the previous value on success and the actual current value on failure.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: Shared<T>,
        new: Shared<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Shared<T>, Shared<T>> {
        self.data
            .compare_exchange(current.data, new.data, success, failure)
            .map(Shared::from_usize)
            .map_err(Shared::from_usize)
    }

    /// Performs a bitwise "or" operation on the current tag and the argument `tag`, and sets the
    /// new tag to the result. Returns the previous pointer.
    #[inline]
    pub fn fetch_or(&self, tag: usize, ord: Ordering) -> Shared<T> {
        Shared::from_usize(self.data.fetch_or(tag & tag_mask::<T>(), ord))
    }
}

impl<T> From<Shared<T>> for Atomic<T> {
    fn from(ptr: Shared<T>) -> Self {
        Self {
            data: AtomicUsize::new(ptr.data),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Atomic<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Shared<T> {}

impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<T> Eq for Shared<T> {}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (data, tag) = split::<T>(self.data);
        f.debug_struct("Shared")
            .field("raw", &(data as *const T))
            .field("tag", &tag)
            .finish()
    }
}

impl<T> Shared<T> {
    /// Returns a new null pointer.
    pub fn null() -> Self {
        Self::from_usize(0)
    }

    /// Wraps a raw pointer. The pointer must be aligned for `T`.
    pub fn from_raw(ptr: *const T) -> Self {
        Self::from_usize(ptr as usize)
    }

    /// Returns a new pointer pointing to the tagged pointer `data`.
    pub(crate) fn from_usize(data: usize) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Returns the machine representation of the pointer, tag included.
    pub fn into_usize(self) -> usize {
        self.data
    }

    /// Returns the address without the tag.
    pub fn addr(self) -> usize {
        split::<T>(self.data).0
    }

    /// Returns the untagged raw pointer.
    pub fn as_raw(self) -> *mut T {
        self.addr() as *mut T
    }

    /// Returns the tag stored within the pointer.
    pub fn tag(self) -> usize {
        split::<T>(self.data).1
    }

    /// Returns the same pointer, but tagged with `tag`. `tag` is truncated to be fit into the
    /// unused bits of the pointer to `T`.
    pub fn with_tag(self, tag: usize) -> Self {
        Self::from_usize(self.addr() | (tag & tag_mask::<T>()))
    }

    /// Returns `true` if the pointer is null ignoring its tag.
    pub fn is_null(self) -> bool {
        self.addr() == 0
    }

    /// Dereferences the pointer.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the pointee must stay allocated for `'a`, normally because
    /// a guard protects it.
    pub unsafe fn deref<'a>(self) -> &'a T {
        // SAFETY: guaranteed by the caller.
        unsafe { &*self.as_raw() }
    }

    /// Converts the pointer to a reference, or `None` if it is null.
    ///
    /// # Safety
    ///
    /// Same as [`Shared::deref`] for non-null pointers.
    pub unsafe fn as_ref<'a>(self) -> Option<&'a T> {
        // SAFETY: guaranteed by the caller.
        unsafe { self.as_raw().as_ref() }
    }

    /// Takes ownership of the pointee.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null, must come from [`Owned::into_shared`], and nobody else may
    /// hold or later obtain a reference to the same object.
    pub unsafe fn into_owned(self) -> Owned<T> {
        debug_assert!(!self.is_null(), "converting a null `Shared` into `Owned`");
        Owned {
            data: self.addr(),
            _marker: PhantomData,
        }
    }
}
