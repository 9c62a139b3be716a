//! Representation selection and sizing decisions.
//!
//! Every structural decision (which representation, how large the entry log
//! and the bucket index are, when tombstones get reclaimed) is answered here
//! from a [`Policy`]; the table only carries them out.

use crate::bucket_index::MIN_BITS;
use crate::policy::Policy;

/// Smallest entry-log capacity allocated on growth.
pub(crate) const MIN_LOG_CAPACITY: usize = 4;

/// Public view of the current storage layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Representation {
    /// Entry log only; lookups scan live entries with `equals`.
    Compact,
    /// Entry log plus a power-of-two bucket index.
    Indexed,
}

/// Initial layout for a capacity hint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Shape {
    Compact { capacity: usize },
    Indexed { capacity: usize, bits: u32 },
}

impl Policy {
    pub(crate) fn initial_shape(&self, hint: usize) -> Shape {
        if self.should_index(hint) {
            Shape::Indexed {
                capacity: hint,
                bits: self.bits_for(hint),
            }
        } else {
            Shape::Compact { capacity: hint }
        }
    }

    /// Whether `live` entries call for the indexed representation.
    pub(crate) fn should_index(&self, live: usize) -> bool {
        live > self.compact_threshold()
    }

    /// Smallest bit width whose bucket count keeps `count` entries within
    /// the load factor.
    pub(crate) fn bits_for(&self, count: usize) -> u32 {
        let mut bits = MIN_BITS;
        while bits < 63 && !self.fits(count, bits) {
            bits += 1;
        }
        bits
    }

    pub(crate) fn fits(&self, count: usize, bits: u32) -> bool {
        count as f64 <= (1u64 << bits) as f64 * self.max_load_factor()
    }

    /// Capacity after growing from `current` until `required` slots fit:
    /// +50% per step, so appends stay amortized O(1). A `compact` log never
    /// grows past the threshold.
    pub(crate) fn grown_capacity(&self, current: usize, required: usize, compact: bool) -> usize {
        let mut cap = current.max(MIN_LOG_CAPACITY);
        while cap < required {
            cap += (cap / 2).max(1);
        }
        if compact {
            cap = cap.min(self.compact_threshold());
        }
        cap.max(required)
    }

    /// Capacity of a repacked log that must hold `required` entries. Keeps
    /// the same headroom as growth but never exceeds `current`, so repacking
    /// an already packed log changes nothing.
    pub(crate) fn compacted_capacity(&self, current: usize, required: usize) -> usize {
        if required == 0 {
            return 0;
        }
        let mut target = (required + required / 2).max(MIN_LOG_CAPACITY);
        if !self.should_index(required) {
            target = target.min(self.compact_threshold());
        }
        target.min(current).max(required)
    }

    /// A full log is repacked instead of grown when at least a quarter of
    /// its slots are tombstones.
    pub(crate) fn reclaim_before_growth(&self, used: usize, tombstones: usize) -> bool {
        tombstones > 0 && tombstones * 4 >= used
    }

    pub(crate) fn compact_after_delete(&self, used: usize, tombstones: usize) -> bool {
        tombstones > 0 && tombstones as f64 >= used as f64 * self.tombstone_ratio()
    }
}
