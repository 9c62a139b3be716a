//! EntryLog: insertion-ordered slots with tombstones.
//!
//! The log is the single source of truth for iteration order and, in the
//! compact representation, the only storage there is. Slots are never
//! reordered; deleting leaves a tombstone until the log is repacked.

#[derive(Clone, Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    /// Hash recorded when the entry entered the indexed representation.
    /// Meaningless while the map is compact.
    pub(crate) hash: u64,
}

#[derive(Clone, Debug)]
enum Slot<K, V> {
    Live(Entry<K, V>),
    Tombstone,
}

#[derive(Clone, Debug)]
pub(crate) struct EntryLog<K, V> {
    slots: Vec<Slot<K, V>>,
    capacity: usize,
    live: usize,
    // Identity of the current backing storage; 0 while nothing is allocated.
    id: u64,
}

impl<K, V> EntryLog<K, V> {
    /// A log without backing storage.
    pub(crate) const fn unallocated() -> Self {
        Self {
            slots: Vec::new(),
            capacity: 0,
            live: 0,
            id: 0,
        }
    }

    pub(crate) fn with_capacity(capacity: usize, id: u64) -> Self {
        if capacity == 0 {
            return Self::unallocated();
        }
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            live: 0,
            id,
        }
    }

    /// Live entries.
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Live plus tombstoned slots.
    pub(crate) fn used(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn tombstones(&self) -> usize {
        self.used() - self.live
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_allocated(&self) -> bool {
        self.capacity > 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.used() == self.capacity
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&Entry<K, V>> {
        match self.slots.get(slot) {
            Some(Slot::Live(e)) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut Entry<K, V>> {
        match self.slots.get_mut(slot) {
            Some(Slot::Live(e)) => Some(e),
            _ => None,
        }
    }

    /// Append a live entry and return its slot. The caller reserves room
    /// first.
    pub(crate) fn push(&mut self, entry: Entry<K, V>) -> usize {
        debug_assert!(!self.is_full(), "push into a full entry log");
        let slot = self.slots.len();
        self.slots.push(Slot::Live(entry));
        self.live += 1;
        slot
    }

    /// Tombstone `slot`, handing the entry back to the caller.
    pub(crate) fn kill(&mut self, slot: usize) -> Option<Entry<K, V>> {
        let cell = self.slots.get_mut(slot)?;
        match core::mem::replace(cell, Slot::Tombstone) {
            Slot::Live(e) => {
                self.live -= 1;
                Some(e)
            }
            Slot::Tombstone => None,
        }
    }

    /// Grow the backing storage in place; slot numbers are preserved.
    pub(crate) fn grow(&mut self, capacity: usize, id: u64) {
        debug_assert!(capacity >= self.used());
        self.slots.reserve_exact(capacity - self.slots.len());
        self.capacity = capacity;
        self.id = id;
    }

    /// Move the live entries, in order, into fresh storage of `capacity`.
    pub(crate) fn repack(self, capacity: usize, id: u64) -> Self {
        debug_assert!(capacity >= self.live);
        let mut out = Self::with_capacity(capacity, id);
        for slot in self.slots {
            if let Slot::Live(e) = slot {
                out.slots.push(Slot::Live(e));
                out.live += 1;
            }
        }
        out
    }

    /// Re-label the storage, used when a copied log is adopted by another map.
    pub(crate) fn rebrand(&mut self, id: u64) {
        self.id = if self.is_allocated() { id } else { 0 };
    }

    pub(crate) fn first_live(&self) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, Slot::Live(_)))
    }

    /// Live entries with their slot numbers, in log order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Entry<K, V>)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Live(e) => Some((i, e)),
            Slot::Tombstone => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(k: i32) -> Entry<i32, i32> {
        Entry {
            key: k,
            value: k * 10,
            hash: 0,
        }
    }

    #[test]
    fn unallocated_has_no_storage() {
        let log: EntryLog<i32, i32> = EntryLog::with_capacity(0, 7);
        assert!(!log.is_allocated());
        assert_eq!(log.id(), 0);
        assert!(log.is_full());
    }

    #[test]
    fn kill_leaves_tombstone_and_keeps_order() {
        let mut log = EntryLog::with_capacity(4, 1);
        for k in 1..=4 {
            log.push(entry(k));
        }
        assert!(log.is_full());
        let e = log.kill(1).unwrap();
        assert_eq!(e.key, 2);
        assert!(log.kill(1).is_none(), "double kill is a no-op");
        assert_eq!(log.len(), 3);
        assert_eq!(log.used(), 4);
        assert_eq!(log.tombstones(), 1);
        let keys: Vec<i32> = log.iter().map(|(_, e)| e.key).collect();
        assert_eq!(keys, vec![1, 3, 4]);
    }

    #[test]
    fn repack_drops_tombstones_in_order() {
        let mut log = EntryLog::with_capacity(6, 1);
        for k in 1..=6 {
            log.push(entry(k));
        }
        log.kill(0);
        log.kill(3);
        let log = log.repack(5, 2);
        assert_eq!(log.id(), 2);
        assert_eq!(log.capacity(), 5);
        assert_eq!(log.used(), 4);
        let keys: Vec<(usize, i32)> = log.iter().map(|(s, e)| (s, e.key)).collect();
        assert_eq!(keys, vec![(0, 2), (1, 3), (2, 5), (3, 6)]);
    }

    #[test]
    fn grow_preserves_slots() {
        let mut log = EntryLog::with_capacity(2, 1);
        log.push(entry(1));
        log.push(entry(2));
        log.grow(3, 9);
        assert!(!log.is_full());
        assert_eq!(log.id(), 9);
        assert_eq!(log.push(entry(3)), 2);
        assert_eq!(log.get(0).map(|e| e.key), Some(1));
        assert_eq!(log.first_live(), Some(0));
    }
}
