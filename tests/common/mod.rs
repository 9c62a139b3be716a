// Shared fixtures for the integration suites.
//
// TestKey stands in for a runtime object: its hash and equality run user
// code (a hook), may fail, and its value can be changed after the key was
// stored, because clones share one state cell.
#![allow(dead_code)]

use rt_hashmap::{Map, MapError, MapKey};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Clone, Debug, PartialEq)]
pub enum KeyError {
    Map(MapError),
    Callback(String),
}

impl From<MapError> for KeyError {
    fn from(e: MapError) -> Self {
        KeyError::Map(e)
    }
}

pub const MODIFIED: KeyError = KeyError::Map(MapError::Modified);
pub const FROZEN: KeyError = KeyError::Map(MapError::Frozen);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Hash,
    Equals,
}

type Hook = Rc<dyn Fn(Call)>;

struct KeyState {
    value: Cell<i64>,
    fail: Cell<bool>,
    calls: Cell<usize>,
    hook: RefCell<Option<Hook>>,
}

#[derive(Clone)]
pub struct TestKey {
    state: Rc<KeyState>,
}

impl TestKey {
    pub fn new(value: i64) -> Self {
        TestKey {
            state: Rc::new(KeyState {
                value: Cell::new(value),
                fail: Cell::new(false),
                calls: Cell::new(0),
                hook: RefCell::new(None),
            }),
        }
    }

    pub fn value(&self) -> i64 {
        self.state.value.get()
    }

    /// Changes the value seen by every clone, including the stored one.
    pub fn set_value(&self, value: i64) {
        self.state.value.set(value);
    }

    pub fn fail(&self, on: bool) {
        self.state.fail.set(on);
    }

    /// Number of hash or equality callbacks run on this key (or its clones).
    pub fn calls(&self) -> usize {
        self.state.calls.get()
    }

    pub fn on_call(&self, hook: impl Fn(Call) + 'static) {
        *self.state.hook.borrow_mut() = Some(Rc::new(hook));
    }

    pub fn clear_hook(&self) {
        self.state.hook.borrow_mut().take();
    }

    fn fire(&self, call: Call) -> Result<(), KeyError> {
        self.state.calls.set(self.state.calls.get() + 1);
        let hook = self.state.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(call);
        }
        if self.state.fail.get() {
            return Err(KeyError::Callback(format!("{self:?}: {call:?} failed")));
        }
        Ok(())
    }
}

impl fmt::Debug for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestKey[{}]", self.value())
    }
}

impl PartialEq for TestKey {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl MapKey for TestKey {
    type Error = KeyError;

    fn hash_code(&self) -> Result<u64, KeyError> {
        self.fire(Call::Hash)?;
        Ok(self.value().rem_euclid(3) as u64)
    }

    fn equals(&self, other: &Self) -> Result<bool, KeyError> {
        self.fire(Call::Equals)?;
        Ok(self.value() == other.value())
    }
}

pub type TestMap = Map<TestKey, i64>;

/// Map of TestKey(k) => k for every k in `keys`, in order.
pub fn test_map(keys: impl IntoIterator<Item = i64>) -> Rc<TestMap> {
    let m = Rc::new(TestMap::new());
    for k in keys {
        m.set(TestKey::new(k), k).unwrap();
    }
    m
}

/// Map of k => -k for every k in `keys`, in order.
pub fn int_map(keys: impl IntoIterator<Item = i64>) -> Map<i64, i64> {
    let m = Map::new();
    for k in keys {
        m.set(k, -k).unwrap();
    }
    m
}

pub fn key_values(m: &TestMap) -> Vec<(i64, i64)> {
    m.to_vec().into_iter().map(|(k, v)| (k.value(), v)).collect()
}

/// Hook that runs `f` against the map if it is still alive.
pub fn with_map(map: &Rc<TestMap>, f: impl Fn(&TestMap) + 'static) -> impl Fn(Call) + 'static {
    let weak: Weak<TestMap> = Rc::downgrade(map);
    move |_| {
        if let Some(m) = weak.upgrade() {
            f(&m);
        }
    }
}
