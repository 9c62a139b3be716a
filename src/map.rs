//! Map: insertion-ordered map over keys with re-entrant callbacks.

use crate::bucket_index::BucketIndex;
use crate::error::MapError;
use crate::fingerprint::{guarded, Fingerprint};
use crate::key::MapKey;
use crate::policy::Policy;
use crate::selector::Representation;
use crate::table::Table;
use core::cell::{Cell, RefCell};
use core::fmt;

/// Insertion-ordered map whose keys supply their own hash and equality.
///
/// All operations take `&self`: a key callback may hold a reference to the
/// map (typically through `Rc`) and call any method on it. Such calls never
/// observe a half-done operation, and an operation whose structure was
/// changed underneath it fails with [`MapError::Modified`] instead of
/// writing through stale positions.
pub struct Map<K, V> {
    pub(crate) table: RefCell<Table<K, V>>,
    frozen: Cell<bool>,
    policy: Policy,
}

/// Point-in-time introspection of a map's storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Stats {
    pub representation: Representation,
    /// Live entries.
    pub len: usize,
    /// Live plus tombstoned slots of the entry log.
    pub used: usize,
    /// Entry log capacity.
    pub capacity: usize,
    /// Bucket index bit width while indexed.
    pub bucket_bits: Option<u32>,
}

/// What `Map::each` hands to its callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Visit {
    Keys,
    Values,
    Pairs,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Visited<K, V> {
    Key(K),
    Value(V),
    Pair(K, V),
}

struct Located {
    slot: Option<usize>,
    // Hash of the query key when the lookup had to compute it.
    hash: Option<u64>,
}

impl<K, V> Map<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// A map pre-sized for `hint` entries. Hints up to the compact threshold
    /// start compact; a zero hint allocates nothing.
    pub fn with_capacity(hint: usize) -> Self {
        Self::with_policy(hint, Policy::default())
    }

    pub fn with_policy(hint: usize, policy: Policy) -> Self {
        Self {
            table: RefCell::new(Table::new(hint, &policy)),
            frozen: Cell::new(false),
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.table.borrow().capacity()
    }

    /// Live plus tombstoned slots.
    pub fn used(&self) -> usize {
        self.table.borrow().used()
    }

    /// Whether the entry log has backing storage. A fresh map with a zero
    /// hint, or a cleared map, has none.
    pub fn is_allocated(&self) -> bool {
        self.table.borrow().is_allocated()
    }

    pub fn representation(&self) -> Representation {
        self.table.borrow().representation()
    }

    pub fn bucket_bits(&self) -> Option<u32> {
        self.table.borrow().bucket_bits()
    }

    pub fn stats(&self) -> Stats {
        let t = self.table.borrow();
        Stats {
            representation: t.representation(),
            len: t.len(),
            used: t.used(),
            capacity: t.capacity(),
            bucket_bits: t.bucket_bits(),
        }
    }

    /// Make the map read-only. There is no way back; `duplicate` gives an
    /// unfrozen copy.
    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    fn check_frozen(&self) -> Result<(), MapError> {
        if self.frozen.get() {
            return Err(MapError::Frozen);
        }
        Ok(())
    }

    fn fingerprint(&self) -> Fingerprint {
        self.table.borrow().fingerprint()
    }

    /// Drop all entries and release the storage.
    pub fn clear(&self) -> Result<(), MapError> {
        self.check_frozen()?;
        let released = self.table.borrow_mut().clear();
        drop(released);
        Ok(())
    }

    /// Remove and return the first entry in iteration order.
    pub fn shift(&self) -> Result<Option<(K, V)>, MapError> {
        self.check_frozen()?;
        let removed = {
            let mut t = self.table.borrow_mut();
            match t.first_live() {
                Some(slot) => t.remove(slot, &self.policy),
                None => None,
            }
        };
        Ok(removed)
    }
}

impl<K: Clone, V: Clone> Map<K, V> {
    /// Independent deep copy with the same entries, order, representation
    /// and capacity. No key callback runs. The copy is never frozen.
    pub fn duplicate(&self) -> Map<K, V> {
        Map {
            table: RefCell::new(self.table.borrow().clone()),
            frozen: Cell::new(false),
            policy: self.policy.clone(),
        }
    }

    /// Replace the contents with a structural copy of `source`.
    pub fn replace(&self, source: &Map<K, V>) -> Result<(), MapError> {
        self.check_frozen()?;
        if core::ptr::eq(self, source) {
            return Ok(());
        }
        let copy = source.table.borrow().clone();
        let released = self.table.borrow_mut().adopt(copy);
        drop(released);
        Ok(())
    }

    /// Iterate over clones of the live entries in insertion order.
    ///
    /// The iterator re-reads the map at every step and never runs past the
    /// log length seen when it was created, so the map may be mutated while
    /// iterating; entries added or removed meanwhile may or may not be seen.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            map: self,
            next: 0,
            end: self.used(),
        }
    }

    pub fn each<F>(&self, visit: Visit, mut f: F)
    where
        F: FnMut(Visited<K, V>),
    {
        for (k, v) in self.iter() {
            f(match visit {
                Visit::Keys => Visited::Key(k),
                Visit::Values => Visited::Value(v),
                Visit::Pairs => Visited::Pair(k, v),
            });
        }
    }

    pub fn each_pair<F: FnMut(K, V)>(&self, mut f: F) {
        self.iter().for_each(|(k, v)| f(k, v));
    }

    pub fn each_key<F: FnMut(K)>(&self, mut f: F) {
        self.iter().for_each(|(k, _)| f(k));
    }

    pub fn each_value<F: FnMut(V)>(&self, mut f: F) {
        self.iter().for_each(|(_, v)| f(v));
    }

    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.iter().collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.iter().map(|(_, v)| v).collect()
    }
}

impl<K: MapKey, V: Clone> Map<K, V> {
    fn guarded<T, F>(&self, callback: F) -> Result<T, K::Error>
    where
        F: FnOnce() -> Result<T, K::Error>,
    {
        guarded(|| self.fingerprint(), callback)
    }

    /// Find `key` in a non-empty map. Every callback runs with no borrow
    /// held and under the fingerprint guard, so slot numbers read before a
    /// callback are still valid after it.
    fn locate(&self, key: &K) -> Result<Located, K::Error> {
        let representation = self.representation();
        match representation {
            Representation::Indexed => {
                let hash = self.guarded(|| key.hash_code())?;
                let candidates = self.table.borrow().candidates(hash);
                for slot in candidates {
                    let stored = self.table.borrow().key_at(slot);
                    let Some(stored) = stored else { continue };
                    if self.guarded(|| key.equals(&stored))? {
                        return Ok(Located {
                            slot: Some(slot),
                            hash: Some(hash),
                        });
                    }
                }
                Ok(Located {
                    slot: None,
                    hash: Some(hash),
                })
            }
            Representation::Compact => {
                let used = self.used();
                for slot in 0..used {
                    let stored = self.table.borrow().key_at(slot);
                    let Some(stored) = stored else { continue };
                    if self.guarded(|| key.equals(&stored))? {
                        return Ok(Located {
                            slot: Some(slot),
                            hash: None,
                        });
                    }
                }
                Ok(Located {
                    slot: None,
                    hash: None,
                })
            }
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>, K::Error> {
        if self.is_empty() {
            return Ok(None);
        }
        let found = self.locate(key)?;
        Ok(found.slot.and_then(|slot| self.table.borrow().value_at(slot)))
    }

    /// `get`, substituting `default` when the key is absent.
    pub fn fetch(&self, key: &K, default: V) -> Result<V, K::Error> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn contains_key(&self, key: &K) -> Result<bool, K::Error> {
        if self.is_empty() {
            return Ok(false);
        }
        Ok(self.locate(key)?.slot.is_some())
    }

    /// Insert or overwrite. An existing key keeps its position; a new key is
    /// appended at the end.
    pub fn set(&self, key: K, value: V) -> Result<(), K::Error> {
        self.check_frozen()?;
        // Runs before the lookup so that slots found by it stay valid. A set
        // that then fails leaves the repacked layout behind, with the same
        // entries in the same order.
        self.table.borrow_mut().prepare_write(&self.policy);

        if self.is_empty() {
            // Nothing stored that a callback could invalidate.
            let hash = match self.representation() {
                Representation::Indexed => Some(key.hash_code()?),
                Representation::Compact => None,
            };
            return self.append(key, value, hash);
        }

        let found = self.locate(&key)?;
        match found.slot {
            Some(slot) => {
                let old = self.table.borrow_mut().overwrite(slot, value);
                drop(old);
                Ok(())
            }
            None => self.append(key, value, found.hash),
        }
    }

    fn append(&self, key: K, value: V, hash: Option<u64>) -> Result<(), K::Error> {
        let (representation, live) = {
            let t = self.table.borrow();
            (t.representation(), t.len())
        };
        let hash = match representation {
            Representation::Indexed => match hash {
                Some(h) => h,
                None => self.guarded(|| key.hash_code())?,
            },
            Representation::Compact if self.policy.should_index(live + 1) => {
                let hashes = self.live_hashes()?;
                let h = match hash {
                    Some(h) => h,
                    None => self.guarded(|| key.hash_code())?,
                };
                self.table.borrow_mut().upgrade(&hashes, &self.policy);
                h
            }
            Representation::Compact => hash.unwrap_or(0),
        };
        self.table
            .borrow_mut()
            .append(key, value, hash, &self.policy);
        Ok(())
    }

    /// Current hash of every live entry, in log order.
    fn live_hashes(&self) -> Result<Vec<(usize, u64)>, K::Error> {
        let slots = self.table.borrow().live_slots();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let stored = self.table.borrow().key_at(slot);
            let Some(stored) = stored else { continue };
            out.push((slot, self.guarded(|| stored.hash_code())?));
        }
        Ok(out)
    }

    /// Repack the entry log without tombstones, shrink it to fit, and return
    /// to the compact representation when few enough entries remain.
    ///
    /// A map that stays indexed is re-indexed under every key's current
    /// hash, so an entry whose key hash changed while stored is reachable
    /// again afterwards. Calling it again without intervening writes or key
    /// mutations changes nothing.
    pub fn compact(&self) -> Result<(), K::Error> {
        self.check_frozen()?;
        let (representation, live) = {
            let t = self.table.borrow();
            (t.representation(), t.len())
        };
        let hashes = match representation {
            Representation::Indexed if self.policy.should_index(live) => Some(self.live_hashes()?),
            _ => None,
        };
        self.table
            .borrow_mut()
            .compact(&self.policy, hashes.as_deref());
        Ok(())
    }

    /// Re-hash every key and fold entries whose keys have become equal.
    ///
    /// Of several equal keys the first keeps its position and takes the
    /// value of the last, as if every entry had been set again in order.
    /// The map is then repacked as by [`Map::compact`].
    pub fn rehash(&self) -> Result<(), K::Error> {
        self.check_frozen()?;
        let hashes = self.live_hashes()?;
        let mut seen = BucketIndex::with_bits(self.policy.bits_for(hashes.len()), 0);
        let mut kept = Vec::with_capacity(hashes.len());
        let mut folds = Vec::new();
        for &(slot, hash) in &hashes {
            let key = self.table.borrow().key_at(slot);
            let Some(key) = key else { continue };
            let mut twin = None;
            for earlier in seen.candidates(hash) {
                let stored = self.table.borrow().key_at(earlier);
                let Some(stored) = stored else { continue };
                if self.guarded(|| key.equals(&stored))? {
                    twin = Some(earlier);
                    break;
                }
            }
            match twin {
                Some(earlier) => folds.push((slot, earlier)),
                None => {
                    seen.insert(hash, slot);
                    kept.push((slot, hash));
                }
            }
        }
        let released = self.table.borrow_mut().rehash(&kept, &folds, &self.policy);
        drop(released);
        Ok(())
    }

    /// Remove `key`, returning its value.
    pub fn delete(&self, key: &K) -> Result<Option<V>, K::Error> {
        self.check_frozen()?;
        if self.is_empty() {
            return Ok(None);
        }
        let Some(slot) = self.locate(key)?.slot else {
            return Ok(None);
        };
        let removed = self.table.borrow_mut().remove(slot, &self.policy);
        Ok(removed.map(|(_, v)| v))
    }

    /// Copy every entry of `source` into `self`, in `source` order:
    /// existing keys are overwritten in place, new keys appended.
    ///
    /// A failure part way leaves the entries merged so far in place.
    pub fn merge(&self, source: &Map<K, V>) -> Result<(), K::Error> {
        self.check_frozen()?;
        if core::ptr::eq(self, source) {
            return Ok(());
        }
        let origin = source.fingerprint();
        let end = source.used();
        for slot in 0..end {
            if source.fingerprint() != origin {
                return Err(MapError::Modified.into());
            }
            let entry = source.table.borrow().entry_at(slot);
            let Some((key, value)) = entry else { continue };
            self.set(key, value)?;
        }
        if source.fingerprint() != origin {
            return Err(MapError::Modified.into());
        }
        Ok(())
    }
}

impl<K, V> Default for Map<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for Map<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator returned by [`Map::iter`].
pub struct Iter<'a, K, V> {
    map: &'a Map<K, V>,
    next: usize,
    end: usize,
}

impl<'a, K: Clone, V: Clone> Iterator for Iter<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        let t = self.map.table.borrow();
        let end = self.end.min(t.used());
        while self.next < end {
            let slot = self.next;
            self.next += 1;
            if let Some(entry) = t.entry_at(slot) {
                return Some(entry);
            }
        }
        self.next = self.end;
        None
    }
}
