//! Modification fingerprint and the guarded-callback helper.
//!
//! Key callbacks are user code that may call back into the map evaluating
//! them. The map never holds a borrow of its internals while a callback
//! runs; instead it snapshots a fingerprint of the structure, runs the
//! callback, and compares. Any difference means slot numbers, candidate
//! lists or capacities computed before the callback can no longer be
//! trusted, and the operation fails with [`MapError::Modified`].
//!
//! This is a snapshot compare, not a lock: everything runs on one thread
//! and a lock would not stop the same thread from re-entering.

use crate::error::MapError;
use crate::selector::Representation;
use tracing::debug;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Fingerprint {
    pub(crate) representation: Representation,
    pub(crate) live: usize,
    pub(crate) used: usize,
    pub(crate) log_id: u64,
    pub(crate) log_capacity: usize,
    pub(crate) index_id: Option<u64>,
    pub(crate) bucket_bits: Option<u32>,
}

/// Run `callback` between two fingerprints taken with `snapshot`.
///
/// A callback error is returned as is, before the comparison.
pub(crate) fn guarded<T, E, S, F>(snapshot: S, callback: F) -> Result<T, E>
where
    E: From<MapError>,
    S: Fn() -> Fingerprint,
    F: FnOnce() -> Result<T, E>,
{
    let before = snapshot();
    let out = callback()?;
    let after = snapshot();
    if before != after {
        debug!(?before, ?after, "map modified by a key callback");
        return Err(MapError::Modified.into());
    }
    Ok(out)
}
