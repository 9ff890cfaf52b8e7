//! Linear hashing.
//!
//! The table starts with `mod1` home buckets. Whenever the load factor is
//! exceeded, the bucket named by the split pointer is split: a new home bucket
//! is appended at position `mod1 + split` and the old chain's keys are
//! redistributed with the high-resolution modulus `mod2 = 2 * mod1`. Once every
//! bucket of the round has split, `mod1` doubles and the pointer wraps.
//!
//! Full buckets never reject a key; they chain an overflow bucket instead.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use tracing::{debug, trace};

use crate::bucket::{BucketId, Slots, SLOTS};
use crate::config::HashConfig;
use crate::error::Result;
use crate::stats::{AccessStats, StatsSnapshot};
use crate::{hash_key, DefaultHashBuilder, Index};

#[derive(Clone)]
struct Bucket<K, V> {
    slots: Slots<K, V>,
    /// Overflow bucket, if this one filled up.
    next: Option<BucketId>,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            slots: Slots::new(),
            next: None,
        }
    }
}

/// A hash index that grows one bucket at a time.
#[derive(Clone)]
pub struct LinearHashIndex<K, V, S = DefaultHashBuilder> {
    /// Bucket arena: home buckets and overflow buckets alike.
    buckets: Vec<Bucket<K, V>>,
    /// Logical position -> home bucket. Length is always `mod1 + split`.
    table: Vec<BucketId>,
    /// Overflow buckets emptied by a split, ready for reuse.
    free: Vec<BucketId>,
    mod1: usize,
    mod2: usize,
    split: usize,
    count: usize,
    load_factor: f64,
    hasher: S,
    stats: AccessStats,
}

impl<K, V> LinearHashIndex<K, V>
where
    K: Hash + Eq,
{
    /// Creates an index with `initial_buckets` home buckets and the default
    /// load factor.
    pub fn new(initial_buckets: usize) -> Result<Self> {
        Self::with_config(HashConfig::with_initial_buckets(initial_buckets))
    }

    /// Creates an index from `config`. `max_global_depth` is ignored.
    pub fn with_config(config: HashConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V, S> LinearHashIndex<K, V, S>
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
        config.validate_linear()?;
        let n = config.initial_buckets;
        let buckets: Vec<Bucket<K, V>> = (0..n).map(|_| Bucket::new()).collect();
        let table = (0..n).map(BucketId::from_usize).collect();
        Ok(Self {
            buckets,
            table,
            free: Vec::new(),
            mod1: n,
            mod2: 2 * n,
            split: 0,
            count: 0,
            load_factor: config.load_factor,
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

    /// Nominal capacity: `SLOTS * (mod1 + split)`. Overflow buckets are not counted.
    #[inline]
    pub fn size(&self) -> usize {
        SLOTS * (self.mod1 + self.split)
    }

    /// The next bucket scheduled to split.
    pub fn split_pointer(&self) -> usize {
        self.split
    }

    /// The low- and high-resolution moduli `(mod1, mod2)`.
    pub fn moduli(&self) -> (usize, usize) {
        (self.mod1, self.mod2)
    }

    /// Number of home buckets (logical positions).
    pub fn home_buckets(&self) -> usize {
        self.table.len()
    }

    /// Length, in buckets, of the longest chain.
    pub fn longest_chain(&self) -> usize {
        self.table
            .iter()
            .map(|&home| self.chain(home).count())
            .max()
            .unwrap_or(0)
    }

    /// Current load factor: stored keys over nominal capacity.
    pub fn load(&self) -> f64 {
        self.count as f64 / self.size() as f64
    }

    /// Snapshot of the access and growth counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The live counters, e.g. to reset or emit them.
    pub fn access_stats(&self) -> &AccessStats {
        &self.stats
    }

    /// Position of the chain that holds (or would hold) a key with this hash.
    #[inline]
    fn address(&self, hash: u64) -> usize {
        let low = (hash % self.mod1 as u64) as usize;
        if low < self.split {
            // Already redistributed in this round.
            (hash % self.mod2 as u64) as usize
        } else {
            low
        }
    }

    fn chain(&self, home: BucketId) -> ChainIds<'_, K, V> {
        ChainIds {
            buckets: &self.buckets,
            next: Some(home),
        }
    }

    /// Looks up the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.stats.record_lookup();
        let hash = hash_key(&self.hasher, key);
        let home = self.table[self.address(hash)];
        for id in self.chain(home) {
            self.stats.record_access(1);
            if let Some(v) = self.buckets[id.index()].slots.get(key) {
                return Some(v);
            }
        }
        None
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
    /// A new key may trigger one bucket split. This never fails; the `Result`
    /// keeps the signature uniform with the other indexes.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let hash = hash_key(&self.hasher, &key);
        let home = self.table[self.address(hash)];

        let mut cur = Some(home);
        while let Some(id) = cur {
            self.stats.record_access(1);
            let bucket = &mut self.buckets[id.index()];
            if let Some(i) = bucket.slots.position(&key) {
                return Ok(Some(bucket.slots.replace(i, value)));
            }
            cur = bucket.next;
        }

        self.chain_push(home, key, value);
        self.count += 1;

        if self.load() > self.load_factor {
            self.split_bucket();
        }
        Ok(None)
    }

    /// Stores into the first bucket of the chain with a free slot, chaining a
    /// new overflow bucket when every bucket is full.
    fn chain_push(&mut self, home: BucketId, key: K, value: V) {
        let mut id = home;
        loop {
            let bucket = &self.buckets[id.index()];
            if !bucket.slots.is_full() {
                break;
            }
            let next = bucket.next;
            match next {
                Some(next) => id = next,
                None => {
                    let overflow = self.alloc_bucket();
                    self.buckets[id.index()].next = Some(overflow);
                    id = overflow;
                    break;
                }
            }
        }
        self.buckets[id.index()].slots.push(key, value);
    }

    fn alloc_bucket(&mut self) -> BucketId {
        if let Some(id) = self.free.pop() {
            debug_assert!(self.buckets[id.index()].slots.is_empty());
            return id;
        }
        let id = BucketId::from_usize(self.buckets.len());
        self.buckets.push(Bucket::new());
        id
    }

    /// Splits the chain at the split pointer into itself and a new home bucket
    /// at `mod1 + split`, then advances the pointer.
    fn split_bucket(&mut self) {
        let old_home = self.table[self.split];
        let ids: Vec<BucketId> = self.chain(old_home).collect();

        let mut entries = Vec::with_capacity(ids.len() * SLOTS);
        for &id in &ids {
            let bucket = &mut self.buckets[id.index()];
            entries.extend(bucket.slots.take_all());
            bucket.next = None;
        }
        // Chain overflow buckets are empty now; the redistribution below may
        // pick them up again.
        self.free.extend(ids[1..].iter().rev().copied());

        let new_home = self.alloc_bucket();
        self.table.push(new_home);
        debug_assert_eq!(self.table.len(), self.mod1 + self.split + 1);

        let mut moved = 0usize;
        for (key, value) in entries {
            let hash = hash_key(&self.hasher, &key);
            let pos = (hash % self.mod2 as u64) as usize;
            let target = if pos == self.split {
                old_home
            } else {
                debug_assert_eq!(pos, self.mod1 + self.split);
                moved += 1;
                new_home
            };
            self.chain_push(target, key, value);
        }

        self.stats.record_split();
        trace!(
            target: "dynindex::linear",
            bucket = self.split,
            new_bucket = self.mod1 + self.split,
            moved,
            "split bucket"
        );

        self.split += 1;
        if self.split == self.mod1 {
            self.split = 0;
            self.mod1 = self.mod2;
            self.mod2 *= 2;
            self.stats.record_growth();
            debug!(
                target: "dynindex::linear",
                mod1 = self.mod1,
                mod2 = self.mod2,
                "completed growth round"
            );
        }
    }
}

#[cfg(test)]
impl<K, V, S> LinearHashIndex<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Asserts every structural invariant. Test builds only.
    pub(crate) fn validate(&self) {
        assert!(self.split < self.mod1, "split pointer past round");
        assert_eq!(self.mod2, 2 * self.mod1);
        assert_eq!(self.table.len(), self.mod1 + self.split);
        assert!(self.load() <= self.load_factor, "load factor left exceeded");

        let mut seen = vec![false; self.buckets.len()];
        let mut total = 0;
        for (pos, &home) in self.table.iter().enumerate() {
            for id in self.chain(home) {
                assert!(!seen[id.index()], "bucket {id} reachable twice");
                seen[id.index()] = true;
                let bucket = &self.buckets[id.index()];
                assert!(bucket.slots.len() <= SLOTS);
                for (k, _) in bucket.slots.iter() {
                    let hash = hash_key(&self.hasher, k);
                    assert_eq!(self.address(hash), pos, "key stored in wrong chain");
                    total += 1;
                }
            }
        }
        for &id in &self.free {
            assert!(!seen[id.index()], "free bucket {id} still chained");
            assert!(self.buckets[id.index()].slots.is_empty());
            seen[id.index()] = true;
        }
        assert!(seen.iter().all(|&s| s), "leaked bucket");
        assert_eq!(total, self.count);
    }
}

impl<K, V, S> LinearHashIndex<K, V, S> {
    /// All stored pairs in bucket-arena order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            slots: Default::default(),
        }
    }
}

struct ChainIds<'a, K, V> {
    buckets: &'a [Bucket<K, V>],
    next: Option<BucketId>,
}

impl<K, V> Iterator for ChainIds<'_, K, V> {
    type Item = BucketId;

    fn next(&mut self) -> Option<BucketId> {
        let id = self.next?;
        self.next = self.buckets[id.index()].next;
        Some(id)
    }
}

/// Iterator over the pairs of a [`LinearHashIndex`], in no particular order.
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

impl<K, V, S> Index<K, V> for LinearHashIndex<K, V, S>
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
        LinearHashIndex::put(self, key, value)
    }

    fn get(&self, key: &K) -> Option<&V> {
        LinearHashIndex::get(self, key)
    }

    fn len(&self) -> usize {
        self.count
    }

    fn size(&self) -> usize {
        LinearHashIndex::size(self)
    }

    fn entries(&self) -> Self::Entries<'_> {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for LinearHashIndex<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Bucket dump, one logical position per line with its overflow chain.
impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Display for LinearHashIndex<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "linear hash: mod1={} mod2={} split={} keys={}",
            self.mod1, self.mod2, self.split, self.count
        )?;
        for (pos, &home) in self.table.iter().enumerate() {
            write!(f, "{pos:>4}:")?;
            let mut cur = Some(home);
            while let Some(id) = cur {
                let bucket = &self.buckets[id.index()];
                write!(f, " [{}]", bucket.slots)?;
                cur = bucket.next;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
