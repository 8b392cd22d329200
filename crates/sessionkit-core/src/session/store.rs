use std::time::Duration;

use crate::error::Result;
use crate::session::Session;

/// Trait for session storage backends.
///
/// Every operation on a single ID is linearizable; nothing is promised
/// across IDs. All backends report a missing, deleted or expired record
/// as [`SessionError::NoRecord`](crate::error::SessionError::NoRecord).
pub trait Store: Send + Sync {
    /// Insert a fresh session for `id`, replacing any existing record.
    fn create(&self, id: &str, ttl: Duration) -> Result<()>;

    /// Return a copy of the live session for `id`.
    fn read(&self, id: &str) -> Result<Session>;

    /// Run `f` once on the live session for `id` and persist the result.
    ///
    /// `f` runs while the store holds exclusive access to the record, so it
    /// must not call back into the same store for the same ID.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Session)) -> Result<()>;

    /// Remove the session for `id`. Removing an absent ID is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Drop every expired record, returning how many were removed.
    fn sweep(&self) -> Result<usize>;
}
