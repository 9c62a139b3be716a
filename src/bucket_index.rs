//! BucketIndex: power-of-two open-addressing index over entry-log slots.
//!
//! Each bucket stores a slot number and the hash the entry was indexed with.
//! Collisions move to the next bucket; deletion shifts the following run
//! backwards so no index tombstones exist and every scan stops at the first
//! vacant bucket.
//! The index never compares keys: it only narrows a lookup down to the
//! slots whose recorded hash matches.

pub(crate) const MIN_BITS: u32 = 2;

const VACANT: usize = usize::MAX;

// Fibonacci hashing spreads weak user hashes (small integers) over the
// table before the high bits are taken.
const SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Copy, Clone, Debug)]
struct Bucket {
    slot: usize,
    hash: u64,
}

impl Bucket {
    const EMPTY: Bucket = Bucket {
        slot: VACANT,
        hash: 0,
    };

    #[inline]
    fn is_vacant(&self) -> bool {
        self.slot == VACANT
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BucketIndex {
    buckets: Box<[Bucket]>,
    bits: u32,
    len: usize,
    id: u64,
}

impl BucketIndex {
    pub(crate) fn with_bits(bits: u32, id: u64) -> Self {
        let bits = bits.max(MIN_BITS);
        Self {
            buckets: vec![Bucket::EMPTY; 1usize << bits].into_boxed_slice(),
            bits,
            len: 0,
            id,
        }
    }

    /// Index `entries` in the given order. Entries sharing a hash are all
    /// indexed; nothing here checks whether their keys are equal.
    pub(crate) fn build<I>(bits: u32, id: u64, entries: I) -> Self
    where
        I: IntoIterator<Item = (usize, u64)>,
    {
        let mut index = Self::with_bits(bits, id);
        for (slot, hash) in entries {
            index.insert(hash, slot);
        }
        index
    }

    pub(crate) fn bits(&self) -> u32 {
        self.bits
    }

    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn rebrand(&mut self, id: u64) {
        self.id = id;
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    #[inline]
    fn home(&self, hash: u64) -> usize {
        (hash.wrapping_mul(SPREAD) >> (64 - self.bits)) as usize
    }

    pub(crate) fn insert(&mut self, hash: u64, slot: usize) {
        debug_assert!(self.len < self.size(), "bucket index is full");
        let mask = self.mask();
        let mut i = self.home(hash);
        while !self.buckets[i].is_vacant() {
            i = (i + 1) & mask;
        }
        self.buckets[i] = Bucket { slot, hash };
        self.len += 1;
    }

    /// Unlink `slot`, which was indexed under `hash`. Returns false when it
    /// is not on that hash's run of occupied buckets.
    pub(crate) fn remove(&mut self, hash: u64, slot: usize) -> bool {
        let mask = self.mask();
        let mut i = self.home(hash);
        let mut steps = 0;
        loop {
            let b = self.buckets[i];
            if b.is_vacant() || steps == self.size() {
                return false;
            }
            if b.slot == slot {
                break;
            }
            i = (i + 1) & mask;
            steps += 1;
        }

        // Backward shift: pull later members of the run into the hole when
        // their home does not lie strictly between the hole and themselves.
        let mut hole = i;
        let mut j = i;
        loop {
            j = (j + 1) & mask;
            let b = self.buckets[j];
            if b.is_vacant() {
                break;
            }
            let dist_home = j.wrapping_sub(self.home(b.hash)) & mask;
            let dist_hole = j.wrapping_sub(hole) & mask;
            if dist_home >= dist_hole {
                self.buckets[hole] = b;
                hole = j;
            }
        }
        self.buckets[hole] = Bucket::EMPTY;
        self.len -= 1;
        true
    }

    /// Slots recorded under `hash`, in scan order (which is insertion order
    /// among equal hashes).
    pub(crate) fn candidates(&self, hash: u64) -> Candidates<'_> {
        Candidates {
            index: self,
            pos: self.home(hash),
            hash,
            remaining: self.size(),
        }
    }
}

pub(crate) struct Candidates<'a> {
    index: &'a BucketIndex,
    pos: usize,
    hash: u64,
    remaining: usize,
}

impl<'a> Iterator for Candidates<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.remaining > 0 {
            let b = self.index.buckets[self.pos];
            if b.is_vacant() {
                self.remaining = 0;
                return None;
            }
            self.pos = (self.pos + 1) & self.index.mask();
            self.remaining -= 1;
            if b.hash == self.hash {
                return Some(b.slot);
            }
        }
        None
    }
}
