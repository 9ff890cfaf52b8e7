//! Extendible hashing.
//!
//! A directory of `2^global_depth` slots maps the low `global_depth` bits of a
//! key's hash to a bucket. A bucket with local depth `d` is shared by the
//! `2^(global_depth - d)` slots that agree on the low `d` bits. A full bucket is
//! split on bit `d`; only when `d == global_depth` does the directory double
//! first. Buckets never chain.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use tracing::{debug, trace};

use crate::bucket::{BucketId, Slots, SLOTS};
use crate::config::HashConfig;
use crate::error::{IndexError, Result};
use crate::stats::{AccessStats, StatsSnapshot};
use crate::{hash_key, DefaultHashBuilder, Index};

#[derive(Clone)]
struct Bucket<K, V> {
    slots: Slots<K, V>,
    local_depth: u32,
    id: BucketId,
}

/// A hash index with a doubling directory over splitting buckets.
#[derive(Clone)]
pub struct ExtendibleHashIndex<K, V, S = DefaultHashBuilder> {
    /// Physical buckets, in creation order.
    buckets: Vec<Bucket<K, V>>,
    /// Logical access paths; slots reference `buckets` by id.
    directory: Vec<BucketId>,
    global_depth: u32,
    max_global_depth: u32,
    count: usize,
    hasher: S,
    stats: AccessStats,
}

impl<K, V> ExtendibleHashIndex<K, V>
where
    K: Hash + Eq,
{
    /// Creates an index with `initial_buckets` buckets (a power of two), each
    /// owning one directory slot.
    pub fn new(initial_buckets: usize) -> Result<Self> {
        Self::with_config(HashConfig::with_initial_buckets(initial_buckets))
    }

    /// Creates an index from `config`. `load_factor` is ignored.
    pub fn with_config(config: HashConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V, S> ExtendibleHashIndex<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Like [`new`](Self::new), hashing keys with `hasher`.
    pub fn with_hasher(initial_buckets: usize, hasher: S) -> Result<Self> {
        Self::with_config_and_hasher(HashConfig::with_initial_buckets(initial_buckets), hasher)
    }

    /// Creates an index from `config` that hashes keys with `hasher`.
    pub fn with_config_and_hasher(config: HashConfig, hasher: S) -> Result<Self> {
        let depth = config.validate_extendible()?;
        let n = config.initial_buckets;
        let buckets = (0..n)
            .map(|i| Bucket {
                slots: Slots::new(),
                local_depth: depth,
                id: BucketId::from_usize(i),
            })
            .collect();
        let directory = (0..n).map(BucketId::from_usize).collect();
        Ok(Self {
            buckets,
            directory,
            global_depth: depth,
            max_global_depth: config.max_global_depth,
            count: 0,
            hasher,
            stats: AccessStats::default(),
        })
    }

    /// Number of stored keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no key is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Nominal capacity: `SLOTS * bucket_count()`.
    #[inline]
    pub fn size(&self) -> usize {
        SLOTS * self.buckets.len()
    }

    /// Number of hash bits the directory distinguishes.
    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Number of physical buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of directory slots, `2^global_depth`.
    pub fn directory_len(&self) -> usize {
        self.directory.len()
    }

    /// Snapshot of the access and growth counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The live counters, e.g. to reset or emit them.
    pub fn access_stats(&self) -> &AccessStats {
        &self.stats
    }

    #[inline]
    fn slot_of(&self, hash: u64) -> usize {
        (hash & low_mask(self.global_depth)) as usize
    }

    /// Looks up the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.stats.record_lookup();
        self.stats.record_access(1);
        let hash = hash_key(&self.hasher, key);
        let id = self.directory[self.slot_of(hash)];
        self.buckets[id.index()].slots.get(key)
    }

    /// Returns `true` if `key` is stored.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts or overwrites. Returns the previous value for an existing key.
    ///
    /// Inserting into a full bucket splits it, doubling the directory when
    /// needed, and retries until the key fits. Fails with
    /// [`IndexError::DirectoryExhausted`], leaving the index untouched, when
    /// the key and the bucket's keys cannot be separated within
    /// `max_global_depth` bits.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let hash = hash_key(&self.hasher, &key);
        let mut checked = false;
        loop {
            let id = self.directory[self.slot_of(hash)];
            self.stats.record_access(1);
            let bucket = &mut self.buckets[id.index()];
            if let Some(i) = bucket.slots.position(&key) {
                return Ok(Some(bucket.slots.replace(i, value)));
            }
            if !bucket.slots.is_full() {
                bucket.slots.push(key, value);
                self.count += 1;
                return Ok(None);
            }
            if !checked {
                self.ensure_separable(id, hash)?;
                checked = true;
            }
            self.split_bucket(id);
        }
    }

    /// Fails if the full bucket `id` holds `SLOTS` keys that agree with `hash`
    /// on every bit up to `max_global_depth`: no split could make room.
    fn ensure_separable(&self, id: BucketId, hash: u64) -> Result<()> {
        let mask = low_mask(self.max_global_depth);
        let colliding = self.buckets[id.index()]
            .slots
            .iter()
            .filter(|(k, _)| hash_key(&self.hasher, k) & mask == hash & mask)
            .count();
        if colliding >= SLOTS {
            return Err(IndexError::DirectoryExhausted {
                max_global_depth: self.max_global_depth,
                slots: SLOTS,
            });
        }
        Ok(())
    }

    fn double_directory(&mut self) {
        debug_assert!(self.global_depth < self.max_global_depth);
        self.directory.extend_from_within(..);
        self.global_depth += 1;
        self.stats.record_growth();
        debug!(
            target: "dynindex::extendible",
            global_depth = self.global_depth,
            slots = self.directory.len(),
            "doubled directory"
        );
    }

    /// Splits bucket `id` on bit `local_depth` into itself and a new sibling.
    fn split_bucket(&mut self, id: BucketId) {
        let local = self.buckets[id.index()].local_depth;
        if local == self.global_depth {
            self.double_directory();
        }
        debug_assert!(local < self.global_depth);

        let bit = 1u64 << local;
        let sibling = BucketId::from_usize(self.buckets.len());
        let hasher = &self.hasher;
        let original = &mut self.buckets[id.index()];
        let moved = original
            .slots
            .split_off_by(|k| hash_key(hasher, k) & bit != 0);
        original.local_depth = local + 1;
        let kept = original.slots.len();
        let moved_count = moved.len();
        self.buckets.push(Bucket {
            slots: moved,
            local_depth: local + 1,
            id: sibling,
        });

        for (slot, target) in self.directory.iter_mut().enumerate() {
            if *target == id && (slot as u64) & bit != 0 {
                *target = sibling;
            }
        }

        self.stats.record_split();
        trace!(
            target: "dynindex::extendible",
            bucket = %id,
            sibling = %sibling,
            local_depth = local + 1,
            kept,
            moved = moved_count,
            "split bucket"
        );
    }

    /// Asserts the directory/depth bookkeeping. Test builds only.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        assert_eq!(self.directory.len(), 1usize << self.global_depth);
        let mut refs = vec![0usize; self.buckets.len()];
        let mut total = 0usize;
        for (slot, id) in self.directory.iter().enumerate() {
            let b = &self.buckets[id.index()];
            assert!(
                b.local_depth <= self.global_depth,
                "bucket {} local depth {} > global depth {}",
                b.id,
                b.local_depth,
                self.global_depth
            );
            refs[id.index()] += 1;
            for (k, _) in b.slots.iter() {
                let h = hash_key(&self.hasher, k);
                assert_eq!(
                    h & low_mask(b.local_depth),
                    slot as u64 & low_mask(b.local_depth),
                    "key in bucket {} does not match slot {slot}",
                    b.id
                );
            }
        }
        for (i, b) in self.buckets.iter().enumerate() {
            assert_eq!(b.id.index(), i);
            assert!(b.slots.len() <= SLOTS);
            assert_eq!(
                refs[i],
                1usize << (self.global_depth - b.local_depth),
                "bucket {} referenced by wrong number of slots",
                b.id
            );
            total += b.slots.len();
        }
        assert_eq!(total, self.count);
    }
}

#[inline]
fn low_mask(depth: u32) -> u64 {
    if depth >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << depth) - 1
    }
}

impl<K, V, S> ExtendibleHashIndex<K, V, S> {
    /// All stored pairs in physical bucket order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            slots: Default::default(),
        }
    }
}

/// Iterator over the pairs of an [`ExtendibleHashIndex`], in no particular order.
pub struct Iter<'a, K, V> {
    buckets: std::slice::Iter<'a, Bucket<K, V>>,
    slots: std::slice::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.slots.next() {
                return Some((k, v));
            }
            self.slots = self.buckets.next()?.slots.iter();
        }
    }
}

impl<K, V, S> Index<K, V> for ExtendibleHashIndex<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Entries<'a> = Iter<'a, K, V>
    where
        Self: 'a,
        K: 'a,
        V: 'a;

    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        ExtendibleHashIndex::put(self, key, value)
    }

    fn get(&self, key: &K) -> Option<&V> {
        ExtendibleHashIndex::get(self, key)
    }

    fn len(&self) -> usize {
        self.count
    }

    fn size(&self) -> usize {
        ExtendibleHashIndex::size(self)
    }

    fn entries(&self) -> Self::Entries<'_> {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for ExtendibleHashIndex<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Directory and bucket dump.
impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Display for ExtendibleHashIndex<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "extendible hash: global_depth={} buckets={} keys={}",
            self.global_depth,
            self.buckets.len(),
            self.count
        )?;
        for (slot, id) in self.directory.iter().enumerate() {
            writeln!(f, "  dir[{slot}] -> {id}")?;
        }
        for b in &self.buckets {
            writeln!(f, "  bucket {} (ld={}): [{}]", b.id, b.local_depth, b.slots)?;
        }
        Ok(())
    }
}
