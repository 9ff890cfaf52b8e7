//! Fixed-capacity slot arrays shared by the hash indexes.

use std::borrow::Borrow;
use std::fmt;

use smallvec::SmallVec;

/// Number of key/value slots per hash bucket.
pub const SLOTS: usize = 4;

/// Stable index of a bucket inside its owning index's bucket arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub(crate) struct BucketId(u32);

impl BucketId {
    /// # Panics
    /// Panics if the arena outgrows `u32` ids.
    #[inline]
    pub(crate) fn from_usize(idx: usize) -> Self {
        assert!(idx < u32::MAX as usize, "bucket arena too large");
        Self(idx as u32)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Occupied slots `[0, len)` of one bucket, stored inline.
#[derive(Clone)]
pub(crate) struct Slots<K, V> {
    entries: SmallVec<[(K, V); SLOTS]>,
}

impl<K, V> Slots<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: SmallVec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() >= SLOTS
    }

    pub(crate) fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.entries.iter().position(|(k, _)| k.borrow() == key)
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub(crate) fn replace(&mut self, idx: usize, value: V) -> V {
        std::mem::replace(&mut self.entries[idx].1, value)
    }

    /// Appends into the next free slot. The caller checks capacity first.
    pub(crate) fn push(&mut self, key: K, value: V) {
        debug_assert!(!self.is_full(), "bucket over capacity");
        self.entries.push((key, value));
    }

    /// Removes every entry, leaving the bucket empty.
    pub(crate) fn take_all(&mut self) -> SmallVec<[(K, V); SLOTS]> {
        std::mem::take(&mut self.entries)
    }

    /// Moves entries whose key satisfies `moves` into a new slot array,
    /// compacting the remaining entries in place (relative order kept).
    pub(crate) fn split_off_by(&mut self, mut moves: impl FnMut(&K) -> bool) -> Slots<K, V> {
        let mut moved = Slots::new();
        let mut i = 0;
        while i < self.entries.len() {
            if moves(&self.entries[i].0) {
                moved.entries.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        moved
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, (K, V)> {
        self.entries.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Display for Slots<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("  ")?;
            }
            write!(f, "{k:?}|{v:?}")?;
        }
        Ok(())
    }
}
