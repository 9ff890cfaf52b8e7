//! # dynindex
//!
//! Dynamic key/value index structures that grow without a full rebuild:
//!
//! - [`LinearHashIndex`]: buckets split one at a time, round-robin, driven by a
//!   load-factor threshold. Overflow is chained.
//! - [`ExtendibleHashIndex`]: a directory of `2^global_depth` slots over shared
//!   buckets. A full bucket splits; the directory doubles only when the bucket
//!   is already split on every directory bit.
//! - [`BPlusTree`] / [`OrderedTreeIndex`]: fixed-fanout B+Tree with ordered
//!   iteration and materialized range views.
//!
//! All three implement [`Index`], so callers can swap one for another.
//!
//! ## Example
//!
//! ```rust
//! use dynindex::{ExtendibleHashIndex, Index, LinearHashIndex, OrderedTreeIndex};
//!
//! fn load<I: Index<u32, u32>>(index: &mut I) -> dynindex::Result<()> {
//!     for k in (1..30).step_by(2) {
//!         index.put(k, k * k)?;
//!     }
//!     Ok(())
//! }
//!
//! let mut linear = LinearHashIndex::new(11)?;
//! let mut extendible = ExtendibleHashIndex::new(2)?;
//! let mut tree = OrderedTreeIndex::new();
//! load(&mut linear)?;
//! load(&mut extendible)?;
//! load(&mut tree)?;
//!
//! assert_eq!(linear.get(&7), Some(&49));
//! assert_eq!(extendible.get(&7), Some(&49));
//! assert_eq!(tree.first_key(), Some(&1));
//! # Ok::<(), dynindex::IndexError>(())
//! ```
//!
//! None of the index types lock internally; wrap one in [`SharedIndex`] to
//! share it between threads.

#![warn(missing_docs)]

pub mod bptree;
mod bucket;
pub mod config;
pub mod error;
pub mod extendible;
pub mod linear;
pub mod shared;
pub mod stats;

pub use bptree::{BPlusTree, OrderedTreeIndex, ORDER};
pub use bucket::SLOTS;
pub use config::HashConfig;
pub use error::{IndexError, Result};
pub use extendible::ExtendibleHashIndex;
pub use linear::LinearHashIndex;
pub use shared::SharedIndex;
pub use stats::{AccessStats, StatsSnapshot};

use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use rustc_hash::FxHasher;

/// Hasher used by the hash indexes unless another is supplied.
///
/// Fx is deterministic across runs, so bucket addresses are reproducible.
pub type DefaultHashBuilder = BuildHasherDefault<FxHasher>;

#[inline]
pub(crate) fn hash_key<Q, S>(build: &S, key: &Q) -> u64
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    build.hash_one(key)
}

/// The contract every index offers to its consumers.
pub trait Index<K, V> {
    /// Iterator over stored pairs. Ascending by key for ordered indexes.
    type Entries<'a>: Iterator<Item = (&'a K, &'a V)>
    where
        Self: 'a,
        K: 'a,
        V: 'a;

    /// Inserts `value` under `key`.
    ///
    /// Hash indexes overwrite and return the previous value. Ordered indexes
    /// reject an existing key with [`IndexError::DuplicateKey`].
    fn put(&mut self, key: K, value: V) -> Result<Option<V>>;

    /// Looks up the value stored under `key`.
    fn get(&self, key: &K) -> Option<&V>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    /// Returns `true` if no key is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nominal size: slot capacity for hash indexes, key count for ordered ones.
    fn size(&self) -> usize;

    /// All stored pairs.
    fn entries(&self) -> Self::Entries<'_>;
}


#[cfg(test)]
mod proptests;
