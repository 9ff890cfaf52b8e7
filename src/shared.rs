//! Thread-safe wrapper around any [`Index`].

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Result;
use crate::Index;

/// An index behind a reader/writer lock.
///
/// Lookups take the read lock and return owned values; inserts take the
/// write lock. Splits and directory doubling happen entirely under the write
/// lock, so readers never observe a partially restructured index.
///
/// ```rust
/// use std::sync::Arc;
/// use dynindex::{LinearHashIndex, SharedIndex};
///
/// let shared = Arc::new(SharedIndex::new(LinearHashIndex::<u32, u32>::new(4)?));
/// let writer = {
///     let shared = Arc::clone(&shared);
///     std::thread::spawn(move || {
///         for k in 0..100u32 {
///             shared.put(k, k + 1).ok();
///         }
///     })
/// };
/// writer.join().ok();
/// assert_eq!(shared.get(&41), Some(42));
/// # Ok::<(), dynindex::IndexError>(())
/// ```
pub struct SharedIndex<I> {
    inner: RwLock<I>,
}

impl<I> SharedIndex<I> {
    /// Wraps `index`.
    pub fn new(index: I) -> Self {
        Self {
            inner: RwLock::new(index),
        }
    }

    /// Inserts under the write lock. See [`Index::put`].
    pub fn put<K, V>(&self, key: K, value: V) -> Result<Option<V>>
    where
        I: Index<K, V>,
    {
        let mut inner = self.inner.write();
        inner.put(key, value)
    }

    /// Looks up `key` under the read lock and returns a copy of its value.
    pub fn get<K, V>(&self, key: &K) -> Option<V>
    where
        I: Index<K, V>,
        V: Clone,
    {
        let inner = self.inner.read();
        inner.get(key).cloned()
    }

    /// Returns `true` if `key` is stored.
    pub fn contains_key<K, V>(&self, key: &K) -> bool
    where
        I: Index<K, V>,
    {
        let inner = self.inner.read();
        inner.get(key).is_some()
    }

    /// Number of stored keys.
    pub fn len<K, V>(&self) -> usize
    where
        I: Index<K, V>,
    {
        self.inner.read().len()
    }

    /// Nominal size of the wrapped index. See [`Index::size`].
    pub fn size<K, V>(&self) -> usize
    where
        I: Index<K, V>,
    {
        self.inner.read().size()
    }

    /// Copies every pair out under a single read lock.
    pub fn entries<K, V>(&self) -> Vec<(K, V)>
    where
        I: Index<K, V>,
        K: Clone,
        V: Clone,
    {
        let inner = self.inner.read();
        inner.entries().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Shared access to the wrapped index for operations outside [`Index`],
    /// such as range scans. Blocks writers while held.
    pub fn read(&self) -> RwLockReadGuard<'_, I> {
        self.inner.read()
    }

    /// Exclusive access to the wrapped index.
    pub fn write(&self) -> RwLockWriteGuard<'_, I> {
        self.inner.write()
    }

    /// Unwraps the index.
    pub fn into_inner(self) -> I {
        self.inner.into_inner()
    }
}

impl<I: Default> Default for SharedIndex<I> {
    fn default() -> Self {
        Self::new(I::default())
    }
}

impl<I> From<I> for SharedIndex<I> {
    fn from(index: I) -> Self {
        Self::new(index)
    }
}
