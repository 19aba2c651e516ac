//! Element storage with an explicit ownership mode.
//!
//! An [`ElementStore`] either owns its buffer or aliases memory that belongs to someone
//! else. The ownership mode is the only state the store keeps about its memory: whether
//! a copy also lives on a compute device is tracked by the device layer, keyed by
//! [`StoreKey`].

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::MatrixError;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

fn next_store_id() -> u64 {
    NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a store as seen by a device.
///
/// The id is unique for the lifetime of the process and changes whenever the store is
/// rebound to different memory, so a stale device copy can never be mistaken for the
/// current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreKey {
    /// Process-unique store id.
    pub id: u64,
    /// Length of the buffer in bytes.
    pub bytes: usize,
}

enum Buffer<T> {
    Owned(Vec<T>),
    External { ptr: NonNull<T>, len: usize },
}

/// A contiguous buffer of `T` that is either owned or a view over external memory.
pub struct ElementStore<T> {
    buffer: Buffer<T>,
    id: u64,
}

impl<T> ElementStore<T> {
    /// Creates an empty owned store.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Creates an owned store taking ownership of `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            buffer: Buffer::Owned(data),
            id: next_store_id(),
        }
    }

    /// Creates a store that views `len` elements starting at `ptr`.
    ///
    /// The store never frees or reallocates that memory.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `ptr` is valid for reads and writes of `len` elements of `T`
    /// - `ptr` is properly aligned for `T`
    /// - the memory outlives the store and every matrix built on it
    /// - no other code accesses the memory while the store is in use
    ///
    /// # Errors
    ///
    /// Returns an error if `ptr` is null.
    pub unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> Result<Self, MatrixError> {
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| MatrixError::unsupported("view", "null pointer"))?;
        Ok(Self {
            buffer: Buffer::External { ptr, len },
            id: next_store_id(),
        })
    }

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.buffer {
            Buffer::Owned(data) => data.len(),
            Buffer::External { len, .. } => *len,
        }
    }

    /// Returns true if the store holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the store aliases memory it does not own.
    #[inline]
    pub fn is_view(&self) -> bool {
        matches!(self.buffer, Buffer::External { .. })
    }

    /// Returns the process-unique id of the store.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the key a device uses to track this store's residency.
    #[inline]
    pub fn key(&self) -> StoreKey {
        StoreKey {
            id: self.id,
            bytes: self.len() * std::mem::size_of::<T>(),
        }
    }

    /// Returns the elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match &self.buffer {
            Buffer::Owned(data) => data.as_slice(),
            // SAFETY: the constructor contract guarantees `ptr` is valid for `len` elements
            Buffer::External { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    /// Returns the elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.buffer {
            Buffer::Owned(data) => data.as_mut_slice(),
            // SAFETY: the constructor contract guarantees `ptr` is valid and unaliased
            Buffer::External { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }

    /// Returns a pointer to the first element.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.as_slice().as_ptr()
    }

    /// Returns a mutable pointer to the first element.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.as_mut_slice().as_mut_ptr()
    }

    /// Rebinds this store to the memory of `other` without copying.
    ///
    /// Any buffer this store owned is dropped. Afterwards the store is a view and gets a
    /// new identity.
    ///
    /// # Safety
    ///
    /// `other` must outlive every use of this store and must not be reallocated or
    /// accessed through another path while this store is used.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::SizeMismatch`] if the element counts differ.
    pub unsafe fn view(&mut self, other: &mut ElementStore<T>) -> Result<(), MatrixError> {
        if self.len() != other.len() {
            return Err(MatrixError::size_mismatch("view", self.len(), other.len()));
        }
        let len = other.len();
        let ptr = NonNull::new(other.as_mut_ptr())
            .ok_or_else(|| MatrixError::unsupported("view", "null pointer"))?;
        self.buffer = Buffer::External { ptr, len };
        self.id = next_store_id();
        Ok(())
    }
}

impl<T: Clone> Clone for ElementStore<T> {
    /// Deep copy into a new owned store, also when `self` is a view.
    fn clone(&self) -> Self {
        Self::from_vec(self.as_slice().to_vec())
    }
}

impl<T> Default for ElementStore<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::fmt::Debug for ElementStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementStore")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("is_view", &self.is_view())
            .finish()
    }
}

// SAFETY: an owned buffer is a Vec<T>; an external buffer is exclusively accessed
// through this store per the constructor contract, so it behaves like &mut [T].
unsafe impl<T: Send> Send for ElementStore<T> {}

// SAFETY: shared access only hands out &[T].
unsafe impl<T: Sync> Sync for ElementStore<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_from_vec() {
        let store = ElementStore::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(store.len(), 4);
        assert!(!store.is_view());
        assert_eq!(store.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(store.key().bytes, 4 * std::mem::size_of::<i32>());
    }

    #[test]
    fn test_store_ids_are_unique() {
        let a = ElementStore::<u8>::empty();
        let b = ElementStore::<u8>::empty();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_store_external_leaves_memory() -> Result<(), MatrixError> {
        let mut data = vec![1.0f32, 2.0, 3.0];
        {
            let mut store = unsafe { ElementStore::from_raw_parts(data.as_mut_ptr(), data.len())? };
            assert!(store.is_view());
            store.as_mut_slice()[1] = 20.0;
        }
        assert_eq!(data, vec![1.0, 20.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_store_null_pointer() {
        let res = unsafe { ElementStore::<u8>::from_raw_parts(std::ptr::null_mut(), 4) };
        assert!(res.is_err());
    }

    #[test]
    fn test_store_view_rebinds() -> Result<(), MatrixError> {
        let mut owner = ElementStore::from_vec(vec![1, 2, 3]);
        let mut viewer = ElementStore::from_vec(vec![0, 0, 0]);
        let old_id = viewer.id();

        unsafe { viewer.view(&mut owner)? };
        assert!(viewer.is_view());
        assert_ne!(viewer.id(), old_id);

        viewer.as_mut_slice()[0] = 7;
        assert_eq!(owner.as_slice(), &[7, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_store_view_size_mismatch() {
        let mut owner = ElementStore::from_vec(vec![1, 2, 3]);
        let mut viewer = ElementStore::from_vec(vec![0, 0]);
        let res = unsafe { viewer.view(&mut owner) };
        assert_eq!(res, Err(MatrixError::size_mismatch("view", 2, 3)));
        assert!(!viewer.is_view());
    }

    #[test]
    fn test_store_clone_is_owned() -> Result<(), MatrixError> {
        let mut data = vec![5u16, 6];
        let view = unsafe { ElementStore::from_raw_parts(data.as_mut_ptr(), 2)? };
        let copy = view.clone();
        assert!(!copy.is_view());
        assert_ne!(copy.id(), view.id());
        assert_eq!(copy.as_slice(), &[5, 6]);
        Ok(())
    }
}
