//! The capability pair a key must provide.

use crate::error::MapError;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash/equality capability of a map key.
///
/// Both methods may run arbitrary code, including calls back into the map
/// that is currently evaluating them. The map detects structural changes
/// made that way and fails the enclosing operation with
/// [`MapError::Modified`].
///
/// Contract:
/// - `hash_code` is deterministic and stays stable for as long as the key is
///   stored. Breaking this does not cause memory unsafety, but the entry may
///   become unreachable through point lookups (it is still iterated).
/// - `equals` is reflexive, symmetric and transitive, and agrees with
///   `hash_code`.
/// - `Clone` is not a capability callback and must not re-enter the map.
pub trait MapKey: Clone {
    /// Error produced by a failing callback. Map failures are converted into
    /// it, so callers see a single error type.
    type Error: From<MapError>;

    fn hash_code(&self) -> Result<u64, Self::Error>;

    fn equals(&self, other: &Self) -> Result<bool, Self::Error>;
}

fn std_hash<T: Hash + ?Sized>(v: &T) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

macro_rules! plain_keys {
    ($($t:ty),* $(,)?) => {
        $(
            impl MapKey for $t {
                type Error = MapError;

                #[inline]
                fn hash_code(&self) -> Result<u64, MapError> {
                    Ok(std_hash(self))
                }

                #[inline]
                fn equals(&self, other: &Self) -> Result<bool, MapError> {
                    Ok(self == other)
                }
            }
        )*
    };
}

plain_keys!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, bool, char, String,
    &'static str,
);
