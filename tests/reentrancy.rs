// Re-entrant key callbacks.
//
// Keys run user code from hash_code and equals. That code may hold the map
// and call anything on it. The invariants verified here:
// - Memory safety: no callback can make an operation read or write through
//   stale positions; at worst the operation fails with Modified.
// - Detection: a structural change made by a callback (clear, compact,
//   replace, insert, delete then re-insert) fails the running operation.
// - Non-structural writes (overwriting a value) do not trip detection.
// - Callback errors reach the caller unchanged.
// - Operations on an empty map run no callbacks at all.
mod common;

use common::{key_values, test_map, with_map, Call, KeyError, TestKey, TestMap, MODIFIED};
use rt_hashmap::{Map, Representation};
use std::cell::Cell;
use std::rc::Rc;

fn once(f: impl Fn() + 'static) -> impl Fn(Call) + 'static {
    let fired = Cell::new(false);
    move |_| {
        if !fired.replace(true) {
            f();
        }
    }
}

// Test: hash callback clears a non-empty indexed map during insert.
// Verifies: the insert fails with Modified and writes nothing; the clear
// made by the callback stands.
#[test]
fn hash_callback_clears_indexed_map() {
    let m = test_map(1..=20);
    assert_eq!(m.representation(), Representation::Indexed);

    let k = TestKey::new(100);
    let weak = Rc::downgrade(&m);
    k.on_call(move |call| {
        if call == Call::Hash {
            if let Some(m) = weak.upgrade() {
                m.clear().unwrap();
            }
        }
    });

    assert_eq!(m.set(k, 1), Err(MODIFIED));
    assert!(m.is_empty());
    assert!(!m.is_allocated());
}

// Test: the same scenario on a compact map, where equality is the callback.
#[test]
fn equals_callback_clears_compact_map() {
    let m = test_map(1..=3);
    let k = TestKey::new(100);
    k.on_call(with_map(&m, |m| m.clear().unwrap()));

    assert_eq!(m.set(k.clone(), 1), Err(MODIFIED));
    assert!(m.is_empty());
    k.clear_hook();
    assert_eq!(m.get(&k), Ok(None));
}

// Test: inserting into an empty map.
// Verifies: a compact empty map runs no callback; an indexed empty map runs
// the hash callback, and a clear made there does not fail the insert.
#[test]
fn insert_into_empty_map_succeeds() {
    let m: Rc<TestMap> = Rc::new(Map::new());
    let k = TestKey::new(5);
    k.on_call(with_map(&m, |m| m.clear().unwrap()));
    assert_eq!(m.set(k.clone(), 50), Ok(()));
    assert_eq!(k.calls(), 0);
    assert_eq!(m.len(), 1);

    let m: Rc<TestMap> = Rc::new(Map::with_capacity(32));
    assert_eq!(m.representation(), Representation::Indexed);
    let k = TestKey::new(6);
    k.on_call(with_map(&m, |m| m.clear().unwrap()));
    assert_eq!(m.set(k.clone(), 60), Ok(()));
    assert_eq!(m.len(), 1);
    k.clear_hook();
    assert_eq!(m.get(&TestKey::new(6)), Ok(Some(60)));
}

// Test: lookups and deletes on an empty map run no callback.
#[test]
fn empty_map_runs_no_callbacks() {
    let m: TestMap = Map::new();
    let k = TestKey::new(1);
    k.fail(true);
    assert_eq!(m.get(&k), Ok(None));
    assert_eq!(m.contains_key(&k), Ok(false));
    assert_eq!(m.delete(&k), Ok(None));
    assert_eq!(m.set(k.clone(), 1), Ok(()));
    assert_eq!(k.calls(), 0);
}

// Test: callback compacts the map during a lookup.
// Verifies: a compaction that moves entries trips detection; one that
// finds nothing to do leaves the lookup alone.
#[test]
fn compaction_in_callback() {
    let m = test_map(1..=12);
    for k in 1..=5 {
        m.delete(&TestKey::new(k)).unwrap();
    }
    assert!(m.used() > m.len());

    let k = TestKey::new(0);
    k.on_call(with_map(&m, |m| m.compact().unwrap()));
    assert_eq!(m.get(&k), Err(MODIFIED));
    assert_eq!(m.len(), 7);
    assert_eq!(m.used(), 7);

    assert_eq!(m.get(&k), Ok(None));
    assert_eq!(m.get(&TestKey::new(9)), Ok(Some(9)));
}

// Test: callback replaces the map contents with an identical copy.
// Verifies: fresh storage is detected even though the entry count matches.
#[test]
fn replace_in_callback() {
    let m = test_map(1..=3);
    let same = test_map(1..=3);
    let k = TestKey::new(2);
    let src = Rc::clone(&same);
    k.on_call(with_map(&m, move |m| m.replace(&src).unwrap()));

    assert_eq!(m.get(&k), Err(MODIFIED));
    assert_eq!(key_values(&m), key_values(&same));
}

// Test: callback deletes and re-inserts an entry of an indexed map.
// Verifies: detection holds even though the live count is unchanged.
#[test]
fn delete_and_reinsert_in_callback() {
    let m = test_map(1..=20);
    let k = TestKey::new(50);
    let weak = Rc::downgrade(&m);
    k.on_call(once(move || {
        if let Some(m) = weak.upgrade() {
            m.delete(&TestKey::new(1)).unwrap();
            m.set(TestKey::new(1), 1).unwrap();
        }
    }));

    assert_eq!(m.get(&k), Err(MODIFIED));
    assert_eq!(m.len(), 20);
    assert_eq!(m.keys().last().map(TestKey::value), Some(1));
}

// Test: callback inserts during delete.
// Verifies: the delete fails and the target entry is still present.
#[test]
fn insert_during_delete() {
    let m = test_map(1..=5);
    let k = TestKey::new(3);
    let weak = Rc::downgrade(&m);
    k.on_call(once(move || {
        if let Some(m) = weak.upgrade() {
            m.set(TestKey::new(99), 99).unwrap();
        }
    }));

    assert_eq!(m.delete(&k), Err(MODIFIED));
    assert_eq!(m.get(&TestKey::new(3)), Ok(Some(3)));
    assert_eq!(m.get(&TestKey::new(99)), Ok(Some(99)));
}

// Test: callback overwrites a value during lookup.
// Verifies: overwriting is not structural; the lookup completes and sees
// the new value.
#[test]
fn value_overwrite_in_callback_is_allowed() {
    let m = test_map(1..=3);
    let k = TestKey::new(2);
    k.on_call(with_map(&m, |m| m.set(TestKey::new(2), 200).unwrap()));

    assert_eq!(m.get(&k), Ok(Some(200)));
    assert_eq!(m.len(), 3);
}

// Test: a stored key clears the map while the map switches to indexed.
// Verifies: the insert that triggered the switch fails and inserts nothing.
#[test]
fn stored_key_clears_map_during_upgrade() {
    let m = test_map(1..=16);
    let stored = m.keys()[4].clone();
    stored.on_call(with_map(&m, |m| m.clear().unwrap()));

    assert_eq!(m.set(TestKey::new(17), 17), Err(MODIFIED));
    assert!(m.is_empty());
    assert_eq!(m.representation(), Representation::Compact);
}

// Test: callback errors propagate.
// Verifies: the key's own error reaches the caller unchanged in both
// representations and the map is not modified.
#[test]
fn callback_error_propagates() {
    for n in [3, 30] {
        let m = test_map(1..=n);
        let before = key_values(&m);
        let k = TestKey::new(7);
        k.fail(true);

        let expected = Err(KeyError::Callback(match n {
            3 => "TestKey[7]: Equals failed".to_string(),
            _ => "TestKey[7]: Hash failed".to_string(),
        }));
        assert_eq!(m.get(&k), expected.clone().map(|()| None));
        assert_eq!(m.set(k.clone(), 0), expected.clone());
        assert_eq!(m.delete(&k), expected.map(|()| None));
        assert_eq!(key_values(&m), before);
    }
}

// Test: duplicate and iteration run no key callbacks.
#[test]
fn copies_and_iteration_run_no_callbacks() {
    let m = test_map(1..=20);
    let stored = m.keys();
    for k in &stored {
        k.fail(true);
    }
    let calls: usize = stored.iter().map(TestKey::calls).sum();

    let copy = m.duplicate();
    let _ = m.to_vec();
    m.each_value(|_| {});
    let other: TestMap = Map::new();
    other.replace(&copy).unwrap();

    assert_eq!(stored.iter().map(TestKey::calls).sum::<usize>(), calls);
    assert_eq!(other.len(), 20);
}

// Test: a stored key clears the map while compaction re-hashes it.
// Verifies: compaction of an indexed map fails with Modified and leaves
// the clear in place; a compact map runs no callbacks.
#[test]
fn stored_key_clears_map_during_compaction() {
    let m = test_map(1..=20);
    m.delete(&TestKey::new(20)).unwrap();
    m.keys()[6].on_call(with_map(&m, |m| m.clear().unwrap()));
    assert_eq!(m.compact(), Err(MODIFIED));
    assert!(m.is_empty());

    let m = test_map(1..=10);
    let stored = m.keys()[3].clone();
    stored.fail(true);
    let calls = stored.calls();
    assert_eq!(m.compact(), Ok(()));
    assert_eq!(stored.calls(), calls);
}

// Test: rehash under hostile callbacks.
// Verifies: a failing key's error propagates and the entries stay as they
// were; a key that inserts into the map during its equality check makes
// rehash fail with Modified before anything is folded.
#[test]
fn rehash_callbacks_are_guarded() {
    let m = test_map(1..=20);
    let before = key_values(&m);
    m.keys()[2].fail(true);
    assert_eq!(
        m.rehash(),
        Err(KeyError::Callback("TestKey[3]: Hash failed".to_string()))
    );
    assert_eq!(key_values(&m), before);

    let m = test_map(1..=5);
    let stored = m.keys();
    stored[4].set_value(1);
    let weak = Rc::downgrade(&m);
    stored[4].on_call(move |call| {
        if call == Call::Equals {
            if let Some(m) = weak.upgrade() {
                m.set(TestKey::new(50), 50).unwrap();
            }
        }
    });
    assert_eq!(m.rehash(), Err(MODIFIED));
    stored[4].clear_hook();
    let values: Vec<i64> = key_values(&m).into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5, 50]);
}
