use anyhow::Result;

use super::model::StoredSecret;

/// A keyed record table with atomic take-one-view semantics.
///
/// Implementations own the critical section: `consume` must check liveness and
/// decrement as one unit with respect to every other call on the same handle.
pub trait SecretBackend: Send + Sync {
    /// Persist `record` under a freshly minted handle and return that handle.
    fn insert(&self, record: &StoredSecret) -> Result<String>;

    /// Take one view from the record at `handle` if it is live at `now`.
    ///
    /// Returns the record as it stands after the decrement, or `None` when the
    /// handle is absent, expired or exhausted.
    fn consume(&self, handle: &str, now: i64) -> Result<Option<StoredSecret>>;

    /// Remove every record that is not live at `now`. Returns how many were removed.
    fn purge(&self, now: i64) -> Result<usize>;
}
