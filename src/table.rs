//! Table: the structural core behind `Map`.
//!
//! Nothing in here invokes a key callback. Operations that need hashes or
//! equality results receive them from `Map`, which computes them under the
//! fingerprint guard and hands them down once the structure is known to be
//! unchanged. Entries leaving the table are returned to the caller so that
//! their destructors run outside the map's internal borrow.

use crate::bucket_index::BucketIndex;
use crate::entry_log::{Entry, EntryLog};
use crate::fingerprint::Fingerprint;
use crate::policy::Policy;
use crate::selector::{Representation, Shape};
use tracing::{debug, trace};

#[derive(Clone, Debug)]
pub(crate) enum Layout {
    Compact,
    Indexed(BucketIndex),
}

#[derive(Clone, Debug)]
pub(crate) struct Table<K, V> {
    log: EntryLog<K, V>,
    layout: Layout,
    // Source of storage identities; never reset, so a fresh allocation never
    // looks like an earlier one.
    next_id: u64,
}

impl<K, V> Table<K, V> {
    pub(crate) fn new(hint: usize, policy: &Policy) -> Self {
        let mut t = Self {
            log: EntryLog::unallocated(),
            layout: Layout::Compact,
            next_id: 0,
        };
        match policy.initial_shape(hint) {
            Shape::Compact { capacity } => {
                let id = t.mint();
                t.log = EntryLog::with_capacity(capacity, id);
            }
            Shape::Indexed { capacity, bits } => {
                let id = t.mint();
                t.log = EntryLog::with_capacity(capacity, id);
                let id = t.mint();
                t.layout = Layout::Indexed(BucketIndex::with_bits(bits, id));
            }
        }
        t
    }

    fn mint(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn len(&self) -> usize {
        self.log.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.log.len() == 0
    }

    pub(crate) fn used(&self) -> usize {
        self.log.used()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.log.capacity()
    }

    pub(crate) fn is_allocated(&self) -> bool {
        self.log.is_allocated()
    }

    pub(crate) fn representation(&self) -> Representation {
        match self.layout {
            Layout::Compact => Representation::Compact,
            Layout::Indexed(_) => Representation::Indexed,
        }
    }

    pub(crate) fn bucket_bits(&self) -> Option<u32> {
        match &self.layout {
            Layout::Compact => None,
            Layout::Indexed(index) => Some(index.bits()),
        }
    }

    pub(crate) fn fingerprint(&self) -> Fingerprint {
        let (index_id, bucket_bits) = match &self.layout {
            Layout::Compact => (None, None),
            Layout::Indexed(index) => (Some(index.id()), Some(index.bits())),
        };
        Fingerprint {
            representation: self.representation(),
            live: self.log.len(),
            used: self.log.used(),
            log_id: self.log.id(),
            log_capacity: self.log.capacity(),
            index_id,
            bucket_bits,
        }
    }

    pub(crate) fn live_slots(&self) -> Vec<usize> {
        self.log.iter().map(|(slot, _)| slot).collect()
    }

    /// Slots the bucket index associates with `hash`; empty while compact.
    pub(crate) fn candidates(&self, hash: u64) -> Vec<usize> {
        match &self.layout {
            Layout::Compact => Vec::new(),
            Layout::Indexed(index) => index.candidates(hash).collect(),
        }
    }

    pub(crate) fn first_live(&self) -> Option<usize> {
        self.log.first_live()
    }

    /// Replace the value at `slot` in place; the entry keeps its position.
    pub(crate) fn overwrite(&mut self, slot: usize, value: V) -> Option<V> {
        self.log
            .get_mut(slot)
            .map(|e| core::mem::replace(&mut e.value, value))
    }

    /// Append a new entry at the end of the log.
    ///
    /// The caller has already upgraded the table if this entry pushes it past
    /// the compact threshold; `hash` is ignored while compact.
    pub(crate) fn append(&mut self, key: K, value: V, hash: u64, policy: &Policy) -> usize {
        self.reserve_slot(policy);
        debug_assert!(
            matches!(self.layout, Layout::Indexed(_)) || !policy.should_index(self.len() + 1),
            "compact table must be upgraded before it outgrows the threshold"
        );
        if let Layout::Indexed(index) = &self.layout {
            if !policy.fits(index.len() + 1, index.bits()) {
                let bits = policy.bits_for(self.len() + 1);
                self.rebuild_index(bits);
            }
        }
        let slot = self.log.push(Entry { key, value, hash });
        if let Layout::Indexed(index) = &mut self.layout {
            index.insert(hash, slot);
        }
        slot
    }

    fn reserve_slot(&mut self, policy: &Policy) {
        if !self.log.is_full() {
            return;
        }
        let used = self.log.used();
        let compact = matches!(self.layout, Layout::Compact);
        // A compact log past the threshold can only be carrying tombstones:
        // the caller upgrades before live entries outgrow it.
        if policy.reclaim_before_growth(used, self.log.tombstones())
            || (compact && policy.should_index(used + 1))
        {
            self.repack(self.len() + 1, policy);
            return;
        }
        let capacity = policy.grown_capacity(self.log.capacity(), used + 1, compact);
        let id = self.mint();
        trace!(from = self.log.capacity(), to = capacity, "growing entry log");
        self.log.grow(capacity, id);
    }

    /// Switch a compact table to the indexed representation.
    ///
    /// `hashes` holds the current hash of every live entry, in log order.
    /// Entries are indexed one by one without comparing keys, so two stored
    /// keys that have become equal (a key mutated after insertion) are both
    /// indexed and only the first is reachable by lookup.
    pub(crate) fn upgrade(&mut self, hashes: &[(usize, u64)], policy: &Policy) {
        debug_assert!(matches!(self.layout, Layout::Compact));
        debug_assert_eq!(hashes.len(), self.len());
        for &(slot, hash) in hashes {
            if let Some(e) = self.log.get_mut(slot) {
                e.hash = hash;
            }
        }
        let bits = policy.bits_for(self.len() + 1);
        let id = self.mint();
        self.layout = Layout::Indexed(BucketIndex::build(bits, id, hashes.iter().copied()));
        debug!(live = self.len(), bits, "upgraded to indexed representation");
    }

    fn rebuild_index(&mut self, bits: u32) {
        let id = self.mint();
        let index = BucketIndex::build(bits, id, self.log.iter().map(|(slot, e)| (slot, e.hash)));
        trace!(bits, live = self.len(), "rebuilt bucket index");
        self.layout = Layout::Indexed(index);
    }

    /// Tombstone `slot` and unlink it from the index. May compact.
    pub(crate) fn remove(&mut self, slot: usize, policy: &Policy) -> Option<(K, V)> {
        let entry = self.log.kill(slot)?;
        if let Layout::Indexed(index) = &mut self.layout {
            let unlinked = index.remove(entry.hash, slot);
            debug_assert!(unlinked, "live entry missing from bucket index");
        }
        if policy.compact_after_delete(self.log.used(), self.log.tombstones()) {
            self.repack(self.len(), policy);
        }
        Some((entry.key, entry.value))
    }

    /// Before a write: an indexed table that has shrunk to the compact
    /// threshold and still carries tombstones is repacked, which returns it
    /// to the compact representation.
    pub(crate) fn prepare_write(&mut self, policy: &Policy) {
        if matches!(self.layout, Layout::Indexed(_))
            && self.log.tombstones() > 0
            && !policy.should_index(self.len())
        {
            self.repack(self.len(), policy);
        }
    }

    /// Explicit compaction. `hashes`, when given, holds the current hash of
    /// every live entry and replaces the recorded ones, so entries whose key
    /// hash drifted become reachable again. A table that is already packed,
    /// right-sized, in the right representation and indexed under the same
    /// hashes is left untouched.
    pub(crate) fn compact(&mut self, policy: &Policy, hashes: Option<&[(usize, u64)]>) {
        let mut drifted = false;
        for &(slot, hash) in hashes.unwrap_or_default() {
            if let Some(e) = self.log.get_mut(slot) {
                drifted |= e.hash != hash;
                e.hash = hash;
            }
        }
        let live = self.len();
        let capacity = policy.compacted_capacity(self.log.capacity(), live);
        let bits = match self.layout {
            Layout::Indexed(_) if policy.should_index(live) => Some(policy.bits_for(live)),
            _ => None,
        };
        if !drifted
            && self.log.tombstones() == 0
            && capacity == self.log.capacity()
            && bits == self.bucket_bits()
        {
            return;
        }
        self.repack(live, policy);
    }

    /// Fold entries whose keys have become equal and re-index under fresh
    /// hashes.
    ///
    /// `hashes` holds the current hash of every entry that stays. Each
    /// `(folded, kept)` pair moves the value of the later entry `folded` onto
    /// the earlier `kept`, which keeps its position. Displaced keys and
    /// values are handed back. The table is always repacked.
    pub(crate) fn rehash(
        &mut self,
        hashes: &[(usize, u64)],
        folds: &[(usize, usize)],
        policy: &Policy,
    ) -> Vec<(K, V)> {
        let mut released = Vec::with_capacity(folds.len());
        for &(folded, kept) in folds {
            let Some(entry) = self.log.kill(folded) else {
                continue;
            };
            match self.log.get_mut(kept) {
                Some(e) => {
                    let old = core::mem::replace(&mut e.value, entry.value);
                    released.push((entry.key, old));
                }
                None => released.push((entry.key, entry.value)),
            }
        }
        for &(slot, hash) in hashes {
            if let Some(e) = self.log.get_mut(slot) {
                e.hash = hash;
            }
        }
        if !folds.is_empty() {
            debug!(folded = folds.len(), live = self.len(), "folded equal keys");
        }
        self.repack(self.len(), policy);
        released
    }

    /// Move live entries into right-sized storage for `required` entries and
    /// pick the representation for that count.
    fn repack(&mut self, required: usize, policy: &Policy) {
        let capacity = policy.compacted_capacity(self.log.capacity(), required);
        let id = if capacity == 0 { 0 } else { self.mint() };
        let log = core::mem::replace(&mut self.log, EntryLog::unallocated());
        self.log = log.repack(capacity, id);

        match self.layout {
            Layout::Indexed(_) if policy.should_index(required) => {
                self.rebuild_index(policy.bits_for(required));
            }
            Layout::Indexed(_) => {
                self.layout = Layout::Compact;
                debug!(live = self.len(), "downgraded to compact representation");
            }
            Layout::Compact => {}
        }
        debug!(live = self.len(), capacity, "compacted entry log");
    }

    /// Reset to the state of a fresh table with no capacity, handing back
    /// the old storage.
    pub(crate) fn clear(&mut self) -> EntryLog<K, V> {
        self.layout = Layout::Compact;
        core::mem::replace(&mut self.log, EntryLog::unallocated())
    }

    /// Take over the storage of `other` under fresh identities, handing back
    /// the previous storage.
    pub(crate) fn adopt(&mut self, other: Table<K, V>) -> (EntryLog<K, V>, Layout) {
        let Table {
            mut log,
            mut layout,
            ..
        } = other;
        let id = self.mint();
        log.rebrand(id);
        if let Layout::Indexed(index) = &mut layout {
            let id = self.mint();
            index.rebrand(id);
        }
        (
            core::mem::replace(&mut self.log, log),
            core::mem::replace(&mut self.layout, layout),
        )
    }
}

impl<K: Clone, V: Clone> Table<K, V> {
    pub(crate) fn key_at(&self, slot: usize) -> Option<K> {
        self.log.get(slot).map(|e| e.key.clone())
    }

    pub(crate) fn value_at(&self, slot: usize) -> Option<V> {
        self.log.get(slot).map(|e| e.value.clone())
    }

    pub(crate) fn entry_at(&self, slot: usize) -> Option<(K, V)> {
        self.log.get(slot).map(|e| (e.key.clone(), e.value.clone()))
    }
}
