use crate::{ArtTree, NodeArena};

use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
enum Op {
    Insert(Vec<u8>, u64),
    Remove(Vec<u8>),
    Get(Vec<u8>),
}

/// Short keys over a tiny alphabet: maximal prefix sharing, splits,
/// terminator traffic and path collapse.
fn dense_key() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(0u8..=2, 0..=10)
}

/// Full-range bytes: wide fan-out that pushes nodes through the larger
/// classes.
fn wide_key() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(any::<u8>(), 0..=24)
}

fn ops_strategy(
    key: impl Strategy<Value = Vec<u8>> + Clone,
) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        5 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => key.clone().prop_map(Op::Remove),
        2 => key.prop_map(Op::Get),
    ];
    prop::collection::vec(op, 0..=400)
}

fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut arena: NodeArena<u64> = NodeArena::new();
    let mut tree = ArtTree::new();
    let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

    for op in ops {
        match op {
            Op::Insert(key, value) => {
                let old_t = tree.insert(&mut arena, &key, value);
                let old_m = model.insert(key, value);
                prop_assert_eq!(old_t, old_m);
            }
            Op::Remove(key) => {
                let old_t = tree.remove(&mut arena, &key);
                let old_m = model.remove(&key);
                prop_assert_eq!(old_t, old_m);
            }
            Op::Get(key) => {
                let got_t = tree.get(&arena, &key).copied();
                let got_m = model.get(&key).copied();
                prop_assert_eq!(got_t, got_m);
            }
        }
        prop_assert_eq!(tree.len(), model.len());
    }

    tree.validate(&arena);
    let got: Vec<(Vec<u8>, u64)> = tree.iter(&arena).map(|(k, v)| (k.to_vec(), *v)).collect();
    let expected: Vec<(Vec<u8>, u64)> = model.iter().map(|(k, &v)| (k.clone(), v)).collect();
    prop_assert_eq!(got, expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_dense_keys(ops in ops_strategy(dense_key())) {
        run_ops(ops)?;
    }

    #[test]
    fn prop_equivalence_wide_keys(ops in ops_strategy(wide_key())) {
        run_ops(ops)?;
    }

    #[test]
    fn prop_prefix_queries(
        keys in prop::collection::vec(dense_key(), 0..=120),
        prefix in dense_key(),
    ) {
        let mut arena: NodeArena<u64> = NodeArena::new();
        let mut tree = ArtTree::new();
        let mut model: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for (i, key) in keys.into_iter().enumerate() {
            tree.insert(&mut arena, &key, i as u64);
            model.insert(key, i as u64);
        }

        let got: Vec<Vec<u8>> = tree
            .iter_prefix(&arena, &prefix)
            .map(|(k, _)| k.to_vec())
            .collect();
        let expected: Vec<Vec<u8>> = model
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        prop_assert_eq!(&got, &expected);

        let mut visited = Vec::new();
        tree.visit_prefix(&arena, &prefix, |k, _| {
            visited.push(k.to_vec());
            true
        });
        prop_assert_eq!(visited, got);
    }

    #[test]
    fn prop_min_max_match_iteration(keys in prop::collection::vec(wide_key(), 0..=60)) {
        let mut arena: NodeArena<u64> = NodeArena::new();
        let mut tree = ArtTree::new();
        for (i, key) in keys.into_iter().enumerate() {
            tree.insert(&mut arena, &key, i as u64);
        }
        let all: Vec<Vec<u8>> = tree.iter(&arena).map(|(k, _)| k.to_vec()).collect();
        prop_assert_eq!(tree.min(&arena).map(|(k, _)| k.to_vec()), all.first().cloned());
        prop_assert_eq!(tree.max(&arena).map(|(k, _)| k.to_vec()), all.last().cloned());
    }
}
