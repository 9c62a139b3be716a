#![cfg(test)]

// Property tests for Map kept inside the crate so they can check the
// structural invariants through crate-private state.

use crate::{Map, MapError, MapKey, Policy, Representation};
use proptest::prelude::*;

// Key with a deliberately weak hash so indexed lookups walk collision runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Key(u8);

impl MapKey for Key {
    type Error = MapError;

    fn hash_code(&self) -> Result<u64, MapError> {
        Ok(u64::from(self.0 % 5))
    }

    fn equals(&self, other: &Self) -> Result<bool, MapError> {
        Ok(self.0 == other.0)
    }
}

// Pool-indexed operations: keys shrink toward 0 and lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Set(u8, i32),
    Delete(u8),
    Get(u8),
    Shift,
    Compact,
    Rehash,
    Clear,
    Merge(Vec<(u8, i32)>),
    Duplicate,
    Iterate,
}

fn arb_op(pool: u8) -> impl Strategy<Value = Op> {
    let k = 0..pool;
    prop_oneof![
        6 => (k.clone(), any::<i32>()).prop_map(|(k, v)| Op::Set(k, v)),
        3 => k.clone().prop_map(Op::Delete),
        2 => k.clone().prop_map(Op::Get),
        1 => Just(Op::Shift),
        1 => Just(Op::Compact),
        1 => Just(Op::Rehash),
        1 => Just(Op::Clear),
        1 => proptest::collection::vec((k, any::<i32>()), 0..24).prop_map(Op::Merge),
        1 => Just(Op::Duplicate),
        1 => Just(Op::Iterate),
    ]
}

fn arb_scenario() -> impl Strategy<Value = (usize, usize, Vec<Op>)> {
    (1usize..=8, 0usize..40, 8u8..=48).prop_flat_map(|(threshold, hint, pool)| {
        proptest::collection::vec(arb_op(pool), 1..120)
            .prop_map(move |ops| (threshold, hint, ops))
    })
}

fn model_set(model: &mut Vec<(Key, i32)>, k: Key, v: i32) {
    match model.iter_mut().find(|(mk, _)| *mk == k) {
        Some(slot) => slot.1 = v,
        None => model.push((k, v)),
    }
}

fn check_structure(m: &Map<Key, i32>, model: &[(Key, i32)]) -> Result<(), TestCaseError> {
    let t = m.table.borrow();
    let fp = t.fingerprint();
    prop_assert_eq!(fp.live, model.len());
    prop_assert!(fp.live <= fp.used);
    prop_assert!(fp.used <= fp.log_capacity);
    if fp.representation == Representation::Compact {
        prop_assert!(!m.policy().should_index(fp.live), "compact map above threshold");
        prop_assert!(fp.bucket_bits.is_none());
    } else {
        let bits = fp.bucket_bits.unwrap();
        prop_assert!(m.policy().fits(fp.live, bits), "bucket index over its load factor");
    }
    Ok(())
}

// Property: state-machine equivalence against an ordered Vec model.
// Invariants exercised across random operation sequences:
// - Iteration order is first-insertion order; overwrites keep position.
// - `get` agrees with the model in both representations.
// - `merge` equals sequential sets in source order.
// - `duplicate` is equal at creation and independent afterwards.
// - Structure: live <= used <= capacity, compact implies live <= threshold,
//   indexed implies the load factor holds.
proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((threshold, hint, ops) in arb_scenario()) {
        let policy = Policy::new().with_compact_threshold(threshold);
        let m: Map<Key, i32> = Map::with_policy(hint, policy);
        let mut model: Vec<(Key, i32)> = Vec::new();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    m.set(Key(k), v).unwrap();
                    model_set(&mut model, Key(k), v);
                }
                Op::Delete(k) => {
                    let expected = model.iter().position(|(mk, _)| *mk == Key(k)).map(|i| model.remove(i).1);
                    prop_assert_eq!(m.delete(&Key(k)).unwrap(), expected);
                }
                Op::Get(k) => {
                    let expected = model.iter().find(|(mk, _)| *mk == Key(k)).map(|(_, v)| *v);
                    prop_assert_eq!(m.get(&Key(k)).unwrap(), expected);
                    prop_assert_eq!(m.contains_key(&Key(k)).unwrap(), expected.is_some());
                }
                Op::Shift => {
                    let expected = if model.is_empty() { None } else { Some(model.remove(0)) };
                    prop_assert_eq!(m.shift().unwrap(), expected);
                }
                Op::Compact => {
                    m.compact().unwrap();
                    let once = m.stats();
                    m.compact().unwrap();
                    prop_assert_eq!(m.stats(), once, "compaction must be idempotent");
                    prop_assert_eq!(once.used, once.len);
                }
                Op::Rehash => {
                    m.rehash().unwrap();
                    prop_assert_eq!(m.used(), m.len());
                }
                Op::Clear => {
                    m.clear().unwrap();
                    model.clear();
                    prop_assert!(!m.is_allocated());
                }
                Op::Merge(pairs) => {
                    let src: Map<Key, i32> = Map::new();
                    for (k, v) in pairs {
                        src.set(Key(k), v).unwrap();
                    }
                    m.merge(&src).unwrap();
                    for (k, v) in src.to_vec() {
                        model_set(&mut model, k, v);
                    }
                }
                Op::Duplicate => {
                    let d = m.duplicate();
                    prop_assert_eq!(d.to_vec(), m.to_vec());
                    prop_assert_eq!(d.stats(), m.stats());
                    d.set(Key(200), 0).unwrap();
                    prop_assert!(!m.contains_key(&Key(200)).unwrap());
                }
                Op::Iterate => {
                    prop_assert_eq!(m.to_vec(), model.clone());
                }
            }
            check_structure(&m, &model)?;
        }

        prop_assert_eq!(m.to_vec(), model.clone());
        for (k, v) in &model {
            prop_assert_eq!(m.get(k).unwrap(), Some(*v));
        }
    }
}
