//! Tunable sizing policy.

/// Thresholds driving representation choice, growth and compaction.
///
/// The defaults are what every `Map::new`/`Map::with_capacity` map uses.
#[derive(Clone, Debug, PartialEq)]
pub struct Policy {
    compact_threshold: usize,
    max_load_factor: f64,
    tombstone_ratio: f64,
}

impl Policy {
    pub const DEFAULT_COMPACT_THRESHOLD: usize = 16;
    pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.75;
    pub const DEFAULT_TOMBSTONE_RATIO: f64 = 0.5;

    pub const fn new() -> Self {
        Self {
            compact_threshold: Self::DEFAULT_COMPACT_THRESHOLD,
            max_load_factor: Self::DEFAULT_MAX_LOAD_FACTOR,
            tombstone_ratio: Self::DEFAULT_TOMBSTONE_RATIO,
        }
    }

    /// Largest live-count kept in the compact (linear scan) representation.
    /// Clamped to at least 1.
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold.max(1);
        self
    }

    /// Maximum ratio of live entries to bucket count. Clamped to `(0, 1]`;
    /// non-finite or non-positive values fall back to the default.
    pub fn with_max_load_factor(mut self, load: f64) -> Self {
        self.max_load_factor = if load.is_finite() && load > 0.0 {
            load.min(1.0)
        } else {
            Self::DEFAULT_MAX_LOAD_FACTOR
        };
        self
    }

    /// Fraction of tombstoned slots (over used slots) at which a delete
    /// compacts the entry log. Values above 1 disable the automatic
    /// compaction.
    pub fn with_tombstone_ratio(mut self, ratio: f64) -> Self {
        self.tombstone_ratio = if ratio.is_nan() || ratio <= 0.0 {
            Self::DEFAULT_TOMBSTONE_RATIO
        } else {
            ratio
        };
        self
    }

    pub fn compact_threshold(&self) -> usize {
        self.compact_threshold
    }

    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    pub fn tombstone_ratio(&self) -> f64 {
        self.tombstone_ratio
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}
