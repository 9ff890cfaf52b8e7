use super::*;

use crate::test_support::{ConstantState, IdentityState};
use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// One step against a hash index. Keys come from a narrow range so that
/// overwrites and repeated lookups are common.
#[derive(Clone, Debug, Arbitrary)]
enum HashOp {
    #[proptest(weight = 3)]
    Put(#[proptest(strategy = "0u32..512")] u32, u64),
    Get(#[proptest(strategy = "0u32..512")] u32),
}

#[derive(Clone, Debug)]
enum TreeOp {
    Put(u32, u64),
    Get(u32),
    Range(Bound<u32>, Bound<u32>),
}

fn bound_strategy() -> impl Strategy<Value = Bound<u32>> {
    prop_oneof![
        Just(Bound::Unbounded),
        (0u32..600).prop_map(Bound::Included),
        (0u32..600).prop_map(Bound::Excluded),
    ]
}

fn tree_ops_strategy() -> impl Strategy<Value = Vec<TreeOp>> {
    let op = prop_oneof![
        60 => (0u32..600, any::<u64>()).prop_map(|(k, v)| TreeOp::Put(k, v)),
        30 => (0u32..600).prop_map(TreeOp::Get),
        10 => (bound_strategy(), bound_strategy()).prop_map(|(lo, hi)| TreeOp::Range(lo, hi)),
    ];
    prop::collection::vec(op, 0..=1500)
}

fn sorted_entries<'a, I>(entries: I) -> Vec<(u32, u64)>
where
    I: Iterator<Item = (&'a u32, &'a u64)>,
{
    let mut got: Vec<(u32, u64)> = entries.map(|(k, v)| (*k, *v)).collect();
    got.sort_unstable();
    got
}

fn check_hash_ops<I>(index: &mut I, ops: Vec<HashOp>) -> std::result::Result<(), TestCaseError>
where
    I: Index<u32, u64>,
{
    let mut m: HashMap<u32, u64> = HashMap::new();
    for op in ops {
        match op {
            HashOp::Put(k, v) => {
                let old = index.put(k, v);
                let expected = m.insert(k, v);
                prop_assert_eq!(old, Ok(expected));
            }
            HashOp::Get(k) => {
                prop_assert_eq!(index.get(&k), m.get(&k));
            }
        }
        prop_assert_eq!(index.len(), m.len());
    }

    let mut expected: Vec<(u32, u64)> = m.iter().map(|(k, v)| (*k, *v)).collect();
    expected.sort_unstable();
    prop_assert_eq!(sorted_entries(index.entries()), expected);
    Ok(())
}

fn check_tree_ops<const F: usize>(ops: Vec<TreeOp>) -> std::result::Result<(), TestCaseError> {
    let mut t: BPlusTree<u32, u64, F> = BPlusTree::new();
    let mut m: BTreeMap<u32, u64> = BTreeMap::new();

    for op in ops {
        match op {
            TreeOp::Put(k, v) => {
                let got = t.put(k, v);
                if m.contains_key(&k) {
                    prop_assert_eq!(got, Err(IndexError::DuplicateKey));
                } else {
                    prop_assert_eq!(got, Ok(None));
                    m.insert(k, v);
                }
            }
            TreeOp::Get(k) => {
                prop_assert_eq!(t.get(&k), m.get(&k));
            }
            TreeOp::Range(lo, hi) => {
                let got: Vec<u32> = t.range((lo, hi)).map(|(k, _)| *k).collect();
                let expected: Vec<u32> = match (lo, hi) {
                    // BTreeMap::range panics on these; a tree range is just empty.
                    (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b))
                        if a > b =>
                    {
                        Vec::new()
                    }
                    (Bound::Excluded(a), Bound::Excluded(b)) if a == b => Vec::new(),
                    _ => m.range((lo, hi)).map(|(k, _)| *k).collect(),
                };
                prop_assert_eq!(got, expected);
            }
        }
        prop_assert_eq!(t.len(), m.len());
    }

    t.validate();
    let got: Vec<(u32, u64)> = t.iter().map(|(k, v)| (*k, *v)).collect();
    let expected: Vec<(u32, u64)> = m.iter().map(|(k, v)| (*k, *v)).collect();
    prop_assert_eq!(got, expected);
    prop_assert_eq!(t.first_key(), m.keys().next());
    prop_assert_eq!(t.last_key(), m.keys().next_back());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_linear_matches_hashmap(
        initial in 1usize..12,
        ops in prop::collection::vec(any::<HashOp>(), 0..=2000),
    ) {
        let mut index: LinearHashIndex<u32, u64> = LinearHashIndex::new(initial).unwrap();
        check_hash_ops(&mut index, ops)?;
        index.validate();
    }

    #[test]
    fn prop_linear_all_collisions(ops in prop::collection::vec(any::<HashOp>(), 0..=300)) {
        let mut index: LinearHashIndex<u32, u64, ConstantState> =
            LinearHashIndex::with_config_and_hasher(HashConfig::with_initial_buckets(3), ConstantState::default())
                .unwrap();
        check_hash_ops(&mut index, ops)?;
        index.validate();
    }

    #[test]
    fn prop_extendible_matches_hashmap(
        depth in 0u32..4,
        ops in prop::collection::vec(any::<HashOp>(), 0..=2000),
    ) {
        let mut index: ExtendibleHashIndex<u32, u64> = ExtendibleHashIndex::new(1 << depth).unwrap();
        check_hash_ops(&mut index, ops)?;
        index.validate();
    }

    #[test]
    fn prop_extendible_exhaustion_is_atomic(
        ops in prop::collection::vec(any::<HashOp>(), 0..=500),
    ) {
        // Identity hashing with 3 directory bits: keys agreeing on their low
        // three bits cannot be separated beyond one bucket's worth.
        let config = HashConfig { max_global_depth: 3, ..HashConfig::with_initial_buckets(1) };
        let mut index: ExtendibleHashIndex<u32, u64, IdentityState> =
            ExtendibleHashIndex::with_config_and_hasher(config, IdentityState::default()).unwrap();
        let mut m: HashMap<u32, u64> = HashMap::new();

        for op in ops {
            match op {
                HashOp::Put(k, v) => {
                    let shape = (index.global_depth(), index.bucket_count());
                    match index.put(k, v) {
                        Ok(old) => {
                            let expected = m.insert(k, v);
                            prop_assert_eq!(old, expected);
                        }
                        Err(IndexError::DirectoryExhausted { max_global_depth, .. }) => {
                            prop_assert_eq!(max_global_depth, 3);
                            prop_assert!(!m.contains_key(&k));
                            prop_assert_eq!((index.global_depth(), index.bucket_count()), shape);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {e}"),
                    }
                }
                HashOp::Get(k) => prop_assert_eq!(index.get(&k), m.get(&k)),
            }
            prop_assert_eq!(index.len(), m.len());
        }
        index.validate();
        prop_assert!(index.len() <= SLOTS * 8);
    }

    #[test]
    fn prop_tree_fanout_3_matches_btreemap(ops in tree_ops_strategy()) {
        check_tree_ops::<3>(ops)?;
    }

    #[test]
    fn prop_tree_fanout_4_matches_btreemap(ops in tree_ops_strategy()) {
        check_tree_ops::<4>(ops)?;
    }

    #[test]
    fn prop_tree_default_order_matches_btreemap(ops in tree_ops_strategy()) {
        check_tree_ops::<ORDER>(ops)?;
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_tree_insert_order_small_set() {
    let keys: Vec<u32> = vec![10, 20, 30, 40, 50, 60, 70];

    for_each_permutation(&keys, |perm| {
        let mut t: BPlusTree<u32, u64, 3> = BPlusTree::new();
        for (i, k) in perm.into_iter().enumerate() {
            assert_eq!(t.put(k, i as u64), Ok(None));
        }
        t.validate();
        let got: Vec<u32> = t.iter().map(|(k, _)| *k).collect();
        assert_eq!(got, keys);
        assert_eq!(keys_in(&t.sub_map(&20, &60)), vec![20, 30, 40, 50]);
    });
}

#[test]
fn exhaustive_hash_insert_order_small_set() {
    // Keys share their low three bits, so every order forces splits.
    let keys: Vec<u32> = (0..7).map(|i| i * 8).collect();

    for_each_permutation(&keys, |perm| {
        let mut linear: LinearHashIndex<u32, u64, IdentityState> =
            LinearHashIndex::with_config_and_hasher(HashConfig::with_initial_buckets(1), IdentityState::default())
                .unwrap();
        let mut extendible: ExtendibleHashIndex<u32, u64, IdentityState> =
            ExtendibleHashIndex::with_config_and_hasher(HashConfig::with_initial_buckets(1), IdentityState::default())
                .unwrap();
        for k in perm {
            assert_eq!(linear.put(k, u64::from(k)), Ok(None));
            assert_eq!(extendible.put(k, u64::from(k)), Ok(None));
        }
        linear.validate();
        extendible.validate();
        for &k in &keys {
            assert_eq!(linear.get(&k), Some(&u64::from(k)));
            assert_eq!(extendible.get(&k), Some(&u64::from(k)));
        }
    });
}

fn keys_in<V, const F: usize>(t: &BPlusTree<u32, V, F>) -> Vec<u32> {
    t.iter().map(|(k, _)| *k).collect()
}
