//! Errors raised by the map itself.
//!
//! Callback failures are not represented here: they travel in the key's own
//! error type, which absorbs `MapError` through `From`.

/// Failure modes owned by the map.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum MapError {
    /// A mutating operation was attempted on a frozen map. Raised before any
    /// side effect.
    #[error("can't modify frozen map")]
    Frozen,

    /// A key callback changed the structure of a map the enclosing operation
    /// was still using. The operation stopped without committing its write.
    #[error("map modified during operation")]
    Modified,
}
