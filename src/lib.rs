//! rt-hashmap: an insertion-ordered map for language runtimes, whose keys
//! bring their own (possibly re-entrant) hash and equality.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a map that a runtime can expose to user code whose `hash` and
//!   `==` are themselves user code, without ever operating on storage that
//!   such code has moved or freed.
//! - Layers:
//!   - EntryLog: ordered `(key, value, hash)` slots with tombstones. Defines
//!     iteration order.
//!   - BucketIndex: power-of-two open-addressing index from hash to slot.
//!   - Selector (`Policy` decisions): representation, growth, compaction.
//!   - Table: the structure above, manipulated without calling user code.
//!   - Map<K, V>: public API; runs key callbacks under a fingerprint guard.
//!
//! Representations
//! - Compact: up to `Policy::compact_threshold` live entries (16 by
//!   default). No index; lookup scans live entries calling `equals`. No
//!   hash is computed while compact.
//! - Indexed: bucket index present, load factor bounded by
//!   `Policy::max_load_factor`. Lookup hashes the query and compares only
//!   against slots recorded under that hash.
//! - Upgrade happens when an insert pushes the live count past the
//!   threshold; every live key is hashed at that point. Repacking (explicit
//!   `compact`, tombstone-heavy deletes, a full log, or a write to an indexed
//!   map that has shrunk to the threshold) goes back to compact when few
//!   enough entries remain.
//!
//! Reentrancy policy
//! - Single-threaded: `!Sync`, no atomics.
//! - The internal `RefCell` is never borrowed while user code runs. Keys are
//!   cloned out before their callbacks are called, and values and keys
//!   leaving the map are dropped after the borrow ends.
//! - Before each callback on a non-empty map a fingerprint (representation,
//!   live and used counts, log identity and capacity, index identity and bit
//!   width) is taken and compared afterwards; a mismatch aborts the
//!   operation with `MapError::Modified` before anything is written.
//! - Iteration and `duplicate` never call key callbacks.
//!
//! Hash invariants
//! - A key's hash is recorded when it enters the indexed representation.
//!   Index growth and the automatic repacks done by writes reuse the
//!   recorded hashes and run no callbacks. `compact` and `rehash` hash every
//!   live key again (guarded) and index it under its current hash.
//! - A key whose hash or equality changes while stored breaks the key
//!   contract: the entry stays in the log and is iterated, but lookups may
//!   not reach it until the next `compact` or `rehash`. Upgrading indexes
//!   entries without comparing them, so of several stored keys that have
//!   become equal only the first is found; `rehash` folds them into one.
//!
//! Notes and non-goals
//! - Errors from key callbacks are returned unchanged; map errors reach the
//!   caller through the key's `Error: From<MapError>`.
//! - `Clone` and `Drop` of keys and values are not guarded and must not
//!   re-enter the map.

mod bucket_index;
mod entry_log;
mod error;
mod fingerprint;
mod key;
mod map;
mod map_proptest;
mod policy;
mod selector;
mod table;

// Public surface
pub use error::MapError;
pub use key::MapKey;
pub use map::{Iter, Map, Stats, Visit, Visited};
pub use policy::Policy;
pub use selector::Representation;
