//! B+Tree with a compile-time fanout.
//!
//! Leaves hold up to `FANOUT - 1` sorted keys with co-indexed values and are
//! chained left to right for ordered scans. Internal nodes hold up to
//! `FANOUT - 1` separator keys and one more child than keys; every key under
//! child `i` is `< keys[i]` and `>= keys[i - 1]`.
//!
//! Inserting into a full leaf splits it at the midpoint and copies the right
//! half's first key into the parent. An overfull internal node splits around
//! its middle key, which moves up. A split that reaches the root allocates a
//! new root; that is the only way the tree grows taller.

use std::borrow::Borrow;
use std::fmt;
use std::ops::{Bound, RangeBounds};

use tracing::{debug, trace};

use crate::error::{IndexError, Result};
use crate::stats::{AccessStats, StatsSnapshot};
use crate::Index;

/// Default fanout: maximum children per internal node.
pub const ORDER: usize = 5;

// =============================================================================
// Node references
// =============================================================================

/// Child/root reference: 32-bit tagged index.
///
/// - Bit 31 = 1: index into `leaves`
/// - Bit 31 = 0: index into `internals`
#[derive(Clone, Copy, PartialEq, Eq)]
struct NodeRef(u32);

impl NodeRef {
    const LEAF_BIT: u32 = 1 << 31;
    const INDEX_MASK: u32 = Self::LEAF_BIT - 1;

    #[inline]
    fn leaf(idx: usize) -> Self {
        assert!(idx < Self::INDEX_MASK as usize, "leaf arena too large");
        Self(idx as u32 | Self::LEAF_BIT)
    }

    #[inline]
    fn internal(idx: usize) -> Self {
        assert!(idx < Self::INDEX_MASK as usize, "internal arena too large");
        Self(idx as u32)
    }

    #[inline]
    fn is_leaf(self) -> bool {
        self.0 & Self::LEAF_BIT != 0
    }

    #[inline]
    fn index(self) -> usize {
        (self.0 & Self::INDEX_MASK) as usize
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_leaf() {
            write!(f, "L{}", self.index())
        } else {
            write!(f, "N{}", self.index())
        }
    }
}

#[derive(Clone)]
struct Leaf<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    /// Index into `internals`; `None` only while this leaf is the root.
    parent: Option<usize>,
    /// Right neighbour in key order.
    next: Option<usize>,
}

#[derive(Clone)]
struct Internal<K> {
    keys: Vec<K>,
    children: Vec<NodeRef>,
    parent: Option<usize>,
}

/// Index of the child to follow for `key`: the first separator strictly
/// greater than `key`, or the last child.
#[inline]
fn child_slot<K, Q>(keys: &[K], key: &Q) -> usize
where
    K: Borrow<Q>,
    Q: Ord + ?Sized,
{
    keys.iter()
        .position(|k| key < k.borrow())
        .unwrap_or(keys.len())
}

// =============================================================================
// BPlusTree
// =============================================================================

/// An ordered index backed by a B+Tree with `FANOUT` children per node.
///
/// Keys are unique: [`put`](Self::put) rejects an existing key with
/// [`IndexError::DuplicateKey`].
#[derive(Clone)]
pub struct BPlusTree<K, V, const FANOUT: usize = ORDER> {
    leaves: Vec<Leaf<K, V>>,
    internals: Vec<Internal<K>>,
    root: NodeRef,
    /// Leftmost leaf. Splits only ever add right siblings, so it never moves.
    head: usize,
    count: usize,
    height: usize,
    stats: AccessStats,
}

/// The B+Tree with the default fanout of [`ORDER`].
pub type OrderedTreeIndex<K, V> = BPlusTree<K, V, ORDER>;

impl<K, V, const FANOUT: usize> BPlusTree<K, V, FANOUT> {
    const FANOUT_OK: () = assert!(FANOUT >= 3, "B+Tree fanout must be at least 3");

    /// Creates an empty tree: a single empty leaf as root.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FANOUT_OK;
        Self {
            leaves: vec![Self::empty_leaf(None)],
            internals: Vec::new(),
            root: NodeRef::leaf(0),
            head: 0,
            count: 0,
            height: 1,
            stats: AccessStats::default(),
        }
    }

    fn empty_leaf(parent: Option<usize>) -> Leaf<K, V> {
        Leaf {
            keys: Vec::with_capacity(FANOUT),
            values: Vec::with_capacity(FANOUT),
            parent,
            next: None,
        }
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

    /// Number of keys; same as [`len`](Self::len).
    #[inline]
    pub fn size(&self) -> usize {
        self.count
    }

    /// Number of levels, counting the leaf level. An empty tree has height 1.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of leaf and internal nodes.
    pub fn node_count(&self) -> usize {
        self.leaves.len() + self.internals.len()
    }

    /// Snapshot of the access and growth counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The live counters, e.g. to reset or emit them.
    pub fn access_stats(&self) -> &AccessStats {
        &self.stats
    }

    /// Ascending iterator over all pairs.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            leaves: &self.leaves,
            leaf: Some(self.head),
            pos: 0,
        }
    }

    /// Smallest key.
    pub fn first_key(&self) -> Option<&K> {
        self.leaves[self.head].keys.first()
    }

    /// Largest key.
    pub fn last_key(&self) -> Option<&K> {
        let mut node = self.root;
        while !node.is_leaf() {
            let children = &self.internals[node.index()].children;
            node = children[children.len() - 1];
        }
        self.leaves[node.index()].keys.last()
    }

    fn set_parent(&mut self, node: NodeRef, parent: usize) {
        if node.is_leaf() {
            self.leaves[node.index()].parent = Some(parent);
        } else {
            self.internals[node.index()].parent = Some(parent);
        }
    }

    fn parent_of(&self, node: NodeRef) -> Option<usize> {
        if node.is_leaf() {
            self.leaves[node.index()].parent
        } else {
            self.internals[node.index()].parent
        }
    }
}

impl<K: Ord, V, const FANOUT: usize> BPlusTree<K, V, FANOUT> {
    /// Descends from the root to the leaf that covers `key`.
    fn find_leaf<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = self.root;
        loop {
            self.stats.record_access(1);
            if node.is_leaf() {
                return node.index();
            }
            let internal = &self.internals[node.index()];
            node = internal.children[child_slot(&internal.keys, key)];
        }
    }

    /// Looks up the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.stats.record_lookup();
        let leaf = &self.leaves[self.find_leaf(key)];
        leaf.keys
            .binary_search_by(|k| k.borrow().cmp(key))
            .ok()
            .map(|i| &leaf.values[i])
    }

    /// Returns `true` if `key` is stored.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }
}

impl<K: Ord + Clone, V, const FANOUT: usize> BPlusTree<K, V, FANOUT> {
    /// Inserts a new key.
    ///
    /// Returns `Ok(None)` on success and [`IndexError::DuplicateKey`] if the
    /// key is already present, in which case the tree is unchanged.
    pub fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let leaf_idx = self.find_leaf(&key);
        let leaf = &mut self.leaves[leaf_idx];
        let pos = match leaf.keys.binary_search(&key) {
            Ok(_) => return Err(IndexError::DuplicateKey),
            Err(pos) => pos,
        };
        leaf.keys.insert(pos, key);
        leaf.values.insert(pos, value);
        let overfull = leaf.keys.len() > FANOUT - 1;
        self.count += 1;

        if overfull {
            self.split_leaf(leaf_idx);
        }
        Ok(None)
    }

    /// Splits an overfull leaf; the left half keeps the larger share.
    fn split_leaf(&mut self, idx: usize) {
        let new_idx = self.leaves.len();
        let mut right = Self::empty_leaf(None);

        let leaf = &mut self.leaves[idx];
        debug_assert_eq!(leaf.keys.len(), FANOUT, "leaf split before overflow");
        let mid = (leaf.keys.len() + 1) / 2;
        right.keys.extend(leaf.keys.drain(mid..));
        right.values.extend(leaf.values.drain(mid..));
        right.parent = leaf.parent;
        right.next = leaf.next.replace(new_idx);

        let separator = right.keys[0].clone();
        self.leaves.push(right);
        self.stats.record_split();
        trace!(
            target: "dynindex::bptree",
            leaf = idx,
            sibling = new_idx,
            left_keys = mid,
            "split leaf"
        );

        self.insert_into_parent(NodeRef::leaf(idx), separator, NodeRef::leaf(new_idx));
    }

    /// Splits an overfull internal node around its middle key, which moves up.
    fn split_internal(&mut self, idx: usize) {
        let new_idx = self.internals.len();

        let node = &mut self.internals[idx];
        debug_assert_eq!(node.keys.len(), FANOUT, "internal split before overflow");
        let mid = node.keys.len() / 2;
        let mut keys = Vec::with_capacity(FANOUT);
        keys.extend(node.keys.drain(mid + 1..));
        let promoted = node.keys.remove(mid);
        let mut children = Vec::with_capacity(FANOUT + 1);
        children.extend(node.children.drain(mid + 1..));
        let parent = node.parent;

        for &child in &children {
            self.set_parent(child, new_idx);
        }
        self.internals.push(Internal {
            keys,
            children,
            parent,
        });
        self.stats.record_internal_split();
        trace!(
            target: "dynindex::bptree",
            node = idx,
            sibling = new_idx,
            "split internal node"
        );

        self.insert_into_parent(NodeRef::internal(idx), promoted, NodeRef::internal(new_idx));
    }

    /// Links `right`, split off from `left`, into `left`'s parent under
    /// `separator`, growing a new root when `left` was the root.
    fn insert_into_parent(&mut self, left: NodeRef, separator: K, right: NodeRef) {
        let Some(parent) = self.parent_of(left) else {
            let root = self.internals.len();
            let mut keys = Vec::with_capacity(FANOUT);
            keys.push(separator);
            let mut children = Vec::with_capacity(FANOUT + 1);
            children.extend([left, right]);
            self.internals.push(Internal {
                keys,
                children,
                parent: None,
            });
            self.set_parent(left, root);
            self.set_parent(right, root);
            self.root = NodeRef::internal(root);
            self.height += 1;
            self.stats.record_growth();
            debug!(
                target: "dynindex::bptree",
                height = self.height,
                "grew new root"
            );
            return;
        };

        self.set_parent(right, parent);
        let node = &mut self.internals[parent];
        // `separator` falls inside `left`'s key range, so it selects `left`.
        let slot = child_slot(&node.keys, &separator);
        debug_assert!(node.children[slot] == left, "separator does not select split child");
        node.keys.insert(slot, separator);
        node.children.insert(slot + 1, right);

        if node.keys.len() > FANOUT - 1 {
            self.split_internal(parent);
        }
    }

    /// Ascending iterator over the pairs whose keys fall in `range`.
    pub fn range<R>(&self, range: R) -> Range<'_, K, V>
    where
        R: RangeBounds<K>,
    {
        let (leaf, pos) = match range.start_bound() {
            Bound::Unbounded => (self.head, 0),
            Bound::Included(start) => {
                let leaf = self.find_leaf(start);
                (leaf, self.leaves[leaf].keys.partition_point(|k| k < start))
            }
            Bound::Excluded(start) => {
                let leaf = self.find_leaf(start);
                (leaf, self.leaves[leaf].keys.partition_point(|k| k <= start))
            }
        };
        Range {
            iter: Iter {
                leaves: &self.leaves,
                leaf: Some(leaf),
                pos,
            },
            end: range.end_bound().cloned(),
        }
    }
}

impl<K: Ord + Clone, V: Clone, const FANOUT: usize> BPlusTree<K, V, FANOUT> {
    fn materialize<R: RangeBounds<K>>(&self, range: R) -> Self {
        let mut tree = Self::new();
        tree.extend(self.range(range).map(|(k, v)| (k.clone(), v.clone())));
        tree
    }

    /// New tree holding the entries with `key < to`.
    pub fn head_map(&self, to: &K) -> Self {
        self.materialize((Bound::Unbounded, Bound::Excluded(to.clone())))
    }

    /// New tree holding the entries with `from <= key`.
    pub fn tail_map(&self, from: &K) -> Self {
        self.materialize((Bound::Included(from.clone()), Bound::Unbounded))
    }

    /// New tree holding the entries with `from <= key < to`. Empty if
    /// `from >= to`.
    pub fn sub_map(&self, from: &K, to: &K) -> Self {
        self.materialize((Bound::Included(from.clone()), Bound::Excluded(to.clone())))
    }
}

#[cfg(test)]
impl<K: Ord, V, const FANOUT: usize> BPlusTree<K, V, FANOUT> {
    /// Asserts every structural invariant. Test builds only.
    pub(crate) fn validate(&self) {
        let mut leaf_depth = None;
        let mut leaves_in_order = Vec::new();
        self.validate_node(self.root, None, None, None, 1, &mut leaf_depth, &mut leaves_in_order);
        assert_eq!(leaf_depth, Some(self.height), "height out of sync");

        // The leaf chain visits the same leaves, left to right.
        let mut chain = Vec::new();
        let mut cur = Some(self.head);
        while let Some(idx) = cur {
            chain.push(idx);
            cur = self.leaves[idx].next;
        }
        assert_eq!(chain, leaves_in_order, "leaf chain out of order");
        assert_eq!(chain.len(), self.leaves.len(), "unreachable leaf");

        let keys: Vec<&K> = self.iter().map(|(k, _)| k).collect();
        assert_eq!(keys.len(), self.count);
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys not strictly ascending");
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_node(
        &self,
        node: NodeRef,
        parent: Option<usize>,
        lo: Option<&K>,
        hi: Option<&K>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves_in_order: &mut Vec<usize>,
    ) {
        let is_root = node == self.root;
        let in_bounds = |k: &K| lo.map_or(true, |lo| lo <= k) && hi.map_or(true, |hi| k < hi);
        if node.is_leaf() {
            let leaf = &self.leaves[node.index()];
            assert_eq!(leaf.parent, parent, "leaf {:?} parent link", node);
            assert_eq!(leaf.keys.len(), leaf.values.len());
            assert!(leaf.keys.len() <= FANOUT - 1, "leaf over capacity");
            assert!(is_root || !leaf.keys.is_empty(), "empty non-root leaf");
            assert!(leaf.keys.windows(2).all(|w| w[0] < w[1]));
            assert!(leaf.keys.iter().all(in_bounds), "leaf key outside separators");
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) => assert_eq!(d, depth, "leaves at unequal depth"),
            }
            leaves_in_order.push(node.index());
            return;
        }

        let internal = &self.internals[node.index()];
        assert_eq!(internal.parent, parent, "node {:?} parent link", node);
        assert!(!internal.keys.is_empty());
        assert!(internal.keys.len() <= FANOUT - 1, "internal node over capacity");
        assert_eq!(internal.children.len(), internal.keys.len() + 1);
        assert!(internal.keys.windows(2).all(|w| w[0] < w[1]));
        assert!(internal.keys.iter().all(in_bounds));
        for (i, &child) in internal.children.iter().enumerate() {
            let child_lo = if i == 0 { lo } else { Some(&internal.keys[i - 1]) };
            let child_hi = internal.keys.get(i).or(hi);
            self.validate_node(
                child,
                Some(node.index()),
                child_lo,
                child_hi,
                depth + 1,
                leaf_depth,
                leaves_in_order,
            );
        }
    }
}

impl<K, V, const FANOUT: usize> Default for BPlusTree<K, V, FANOUT> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keys already present are skipped; the first value wins.
impl<K: Ord + Clone, V, const FANOUT: usize> Extend<(K, V)> for BPlusTree<K, V, FANOUT> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            match self.put(k, v) {
                Ok(_) | Err(IndexError::DuplicateKey) => {}
                Err(e) => panic!("B+Tree insert failed: {e}"),
            }
        }
    }
}

impl<K: Ord + Clone, V, const FANOUT: usize> FromIterator<(K, V)> for BPlusTree<K, V, FANOUT> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<K: Ord + Clone, V, const FANOUT: usize> Index<K, V> for BPlusTree<K, V, FANOUT> {
    type Entries<'a> = Iter<'a, K, V>
    where
        Self: 'a,
        K: 'a,
        V: 'a;

    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        BPlusTree::put(self, key, value)
    }

    fn get(&self, key: &K) -> Option<&V> {
        BPlusTree::get(self, key)
    }

    fn len(&self) -> usize {
        self.count
    }

    fn size(&self) -> usize {
        self.count
    }

    fn entries(&self) -> Self::Entries<'_> {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, const FANOUT: usize> fmt::Debug for BPlusTree<K, V, FANOUT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Pre-order dump, one node per line, indented by level.
impl<K: fmt::Debug, V, const FANOUT: usize> fmt::Display for BPlusTree<K, V, FANOUT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self.root, 0usize)];
        while let Some((node, level)) = stack.pop() {
            for _ in 0..level {
                f.write_str("    ")?;
            }
            let keys: &[K] = if node.is_leaf() {
                &self.leaves[node.index()].keys
            } else {
                &self.internals[node.index()].keys
            };
            f.write_str("[ .")?;
            for k in keys {
                write!(f, " {k:?} .")?;
            }
            f.write_str(" ]\n")?;
            if !node.is_leaf() {
                for &child in self.internals[node.index()].children.iter().rev() {
                    stack.push((child, level + 1));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Ascending iterator over a [`BPlusTree`], following the leaf chain.
pub struct Iter<'a, K, V> {
    leaves: &'a [Leaf<K, V>],
    leaf: Option<usize>,
    pos: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = &self.leaves[self.leaf?];
            if self.pos < leaf.keys.len() {
                let i = self.pos;
                self.pos += 1;
                return Some((&leaf.keys[i], &leaf.values[i]));
            }
            self.leaf = leaf.next;
            self.pos = 0;
        }
    }
}

/// Ascending iterator over a key range of a [`BPlusTree`].
pub struct Range<'a, K, V> {
    iter: Iter<'a, K, V>,
    end: Bound<K>,
}

impl<'a, K: Ord, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (k, v) = self.iter.next()?;
        let within = match &self.end {
            Bound::Unbounded => true,
            Bound::Included(end) => k <= end,
            Bound::Excluded(end) => k < end,
        };
        if within {
            Some((k, v))
        } else {
            self.iter.leaf = None;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_tracing;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn keys_of<K: Clone, V, const F: usize>(t: &BPlusTree<K, V, F>) -> Vec<K> {
        t.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn test_one_to_nine() -> Result<()> {
        init_tracing();
        let mut t: OrderedTreeIndex<u32, u32> = OrderedTreeIndex::new();
        for k in 1..=9 {
            assert_eq!(t.put(k, k * k)?, None);
        }
        t.validate();
        assert_eq!(t.first_key(), Some(&1));
        assert_eq!(t.last_key(), Some(&9));
        assert_eq!(t.len(), 9);
        assert_eq!(t.size(), 9);

        let sub = t.sub_map(&3, &7);
        assert_eq!(keys_of(&sub), vec![3, 4, 5, 6]);
        assert_eq!(sub.get(&5), Some(&25));
        sub.validate();
        Ok(())
    }

    #[test]
    fn test_first_leaf_split_grows_root() -> Result<()> {
        let mut t: OrderedTreeIndex<u32, &str> = OrderedTreeIndex::new();
        for k in 1..=4 {
            t.put(k, "v")?;
        }
        assert_eq!(t.height(), 1);
        t.put(5, "v")?;
        assert_eq!(t.height(), 2);
        assert!(!t.root.is_leaf());

        let root = &t.internals[t.root.index()];
        assert_eq!(root.keys, vec![4]);
        assert_eq!(root.children.len(), 2);
        assert_eq!(t.leaves[0].keys, vec![1, 2, 3]);
        assert_eq!(t.leaves[1].keys, vec![4, 5]);
        assert_eq!(t.stats().splits, 1);
        assert_eq!(t.stats().growths, 1);

        // Equal to the separator: must descend right.
        assert_eq!(t.get(&4), Some(&"v"));
        assert_eq!(t.get(&3), Some(&"v"));
        assert_eq!(t.get(&6), None);
        t.validate();
        Ok(())
    }

    #[test]
    fn test_duplicate_rejected_without_change() -> Result<()> {
        let mut t: OrderedTreeIndex<u32, u32> = (0..20).map(|k| (k, k)).collect();
        let before = t.node_count();
        assert_eq!(t.put(7, 700), Err(IndexError::DuplicateKey));
        assert_eq!(t.get(&7), Some(&7));
        assert_eq!(t.len(), 20);
        assert_eq!(t.node_count(), before);
        t.validate();
        Ok(())
    }

    #[test]
    fn test_internal_splits_with_small_fanout() -> Result<()> {
        let mut t: BPlusTree<u32, u32, 3> = BPlusTree::new();
        for k in 0..100 {
            t.put(k, k + 1)?;
            t.validate();
        }
        assert!(t.height() >= 4);
        assert!(t.stats().internal_splits > 0);
        for k in 0..100 {
            assert_eq!(t.get(&k), Some(&(k + 1)));
        }
        assert_eq!(keys_of(&t), (0..100).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_descending_inserts() -> Result<()> {
        let mut t: BPlusTree<i64, i64, 4> = BPlusTree::new();
        for k in (0..500).rev() {
            t.put(k, -k)?;
        }
        t.validate();
        assert_eq!(t.first_key(), Some(&0));
        assert_eq!(t.last_key(), Some(&499));
        assert_eq!(t.get(&250), Some(&-250));
        Ok(())
    }

    #[test]
    fn test_random_order_matches_btreemap() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut keys: Vec<u32> = (0..3_000).map(|_| rng.gen_range(0..1_000_000)).collect();
        keys.sort_unstable();
        keys.dedup();
        keys.shuffle(&mut rng);

        let mut t: OrderedTreeIndex<u32, u64> = OrderedTreeIndex::new();
        let mut m = BTreeMap::new();
        for &k in &keys {
            let v: u64 = rng.gen();
            t.put(k, v)?;
            m.insert(k, v);
        }
        t.validate();

        let got: Vec<(u32, u64)> = t.iter().map(|(k, v)| (*k, *v)).collect();
        let expected: Vec<(u32, u64)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(got, expected);

        let got: Vec<u32> = t.range(1_000..200_000).map(|(k, _)| *k).collect();
        let expected: Vec<u32> = m.range(1_000..200_000).map(|(k, _)| *k).collect();
        assert_eq!(got, expected);
        Ok(())
    }

    #[test]
    fn test_range_bounds() -> Result<()> {
        let t: OrderedTreeIndex<u32, ()> = (0..50).map(|k| (k * 2, ())).collect();
        let r = |range: (Bound<u32>, Bound<u32>)| -> Vec<u32> {
            t.range(range).map(|(k, _)| *k).collect()
        };
        assert_eq!(r((Bound::Included(10), Bound::Excluded(16))), vec![10, 12, 14]);
        assert_eq!(r((Bound::Excluded(10), Bound::Included(16))), vec![12, 14, 16]);
        assert_eq!(r((Bound::Included(11), Bound::Excluded(13))), vec![12]);
        assert_eq!(r((Bound::Unbounded, Bound::Excluded(4))), vec![0, 2]);
        assert_eq!(r((Bound::Included(95), Bound::Unbounded)), vec![96, 98]);
        assert_eq!(r((Bound::Included(200), Bound::Unbounded)), Vec::<u32>::new());
        assert_eq!(r((Bound::Included(20), Bound::Excluded(10))), Vec::<u32>::new());
        Ok(())
    }

    #[test]
    fn test_head_and_tail_maps() -> Result<()> {
        let t: OrderedTreeIndex<u32, String> = (1..=9).map(|k| (k, k.to_string())).collect();

        let head = t.head_map(&4);
        assert_eq!(keys_of(&head), vec![1, 2, 3]);
        let tail = t.tail_map(&7);
        assert_eq!(keys_of(&tail), vec![7, 8, 9]);
        assert_eq!(tail.get(&8).map(String::as_str), Some("8"));

        // Views are copies.
        let mut head = head;
        head.put(100, "x".to_string())?;
        assert_eq!(t.get(&100), None);
        Ok(())
    }

    #[test]
    fn test_extend_keeps_first_value() {
        let mut t: OrderedTreeIndex<u32, &str> = [(2, "a"), (1, "b")].into_iter().collect();
        t.extend([(2, "c"), (3, "d"), (1, "e")]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(&1), Some(&"b"));
        assert_eq!(t.get(&2), Some(&"a"));
        assert_eq!(t.get(&3), Some(&"d"));
        t.validate();
    }

    #[test]
    fn test_empty_tree() {
        let t: OrderedTreeIndex<u32, u32> = OrderedTreeIndex::new();
        assert!(t.is_empty());
        assert_eq!(t.first_key(), None);
        assert_eq!(t.last_key(), None);
        assert_eq!(t.get(&1), None);
        assert_eq!(t.iter().count(), 0);
        assert!(t.sub_map(&0, &10).is_empty());
        t.validate();
    }

    #[test]
    fn test_string_keys_borrowed_lookup() -> Result<()> {
        let mut t: OrderedTreeIndex<String, usize> = OrderedTreeIndex::new();
        for (i, w) in ["pear", "apple", "fig", "kiwi", "date", "lime"].iter().enumerate() {
            t.put(w.to_string(), i)?;
        }
        assert_eq!(t.get("fig"), Some(&2));
        assert!(t.contains_key("lime"));
        assert!(!t.contains_key("plum"));
        assert_eq!(t.first_key().map(String::as_str), Some("apple"));
        t.validate();
        Ok(())
    }

    #[test]
    fn test_lookup_visits_one_node_per_level() -> Result<()> {
        let t: BPlusTree<u32, u32, 3> = (0..64).map(|k| (k, k)).collect();
        t.access_stats().reset_accesses();
        for k in 0..64 {
            assert_eq!(t.get(&k), Some(&k));
        }
        let s = t.stats();
        assert_eq!(s.lookups, 64);
        assert_eq!(s.accesses, 64 * t.height() as u64);
        Ok(())
    }

    #[test]
    fn test_display() -> Result<()> {
        let t: OrderedTreeIndex<u32, ()> = (1..=5).map(|k| (k, ())).collect();
        assert_eq!(t.to_string(), "[ . 4 . ]\n    [ . 1 . 2 . 3 . ]\n    [ . 4 . 5 . ]\n");
        Ok(())
    }
}
