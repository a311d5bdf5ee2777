//! The persistence contract a [`crate::store::Store`] is built on, and the
//! reference implementation of it.

pub mod kv;

use async_trait::async_trait;

use crate::error::Result;

/// A single back-end record as handed back by [`BackEnd::get`].
#[derive(Debug, Clone)]
pub struct Record {
    pub data: Vec<u8>,
    pub user_id: Vec<u8>,
    pub ttl_secs: i64,
    pub max_age_secs: i64,
    pub min_refresh_secs: i64,
}

/// Persistence contract for session records. Implementors choose their own
/// session id scheme; the engine never inspects `sess_id` beyond treating it
/// as an opaque byte string.
///
/// `requires_user_id_for_lookup` tells the engine whether [`SessionRef`
/// shape B](crate::reference) must be used so that `user_id` is available to
/// `get`/`delete` even before the record itself has been read.
#[async_trait]
pub trait BackEnd: Send + Sync {
    /// Declares whether this back-end needs `user_id` supplied to `get`/
    /// `delete` in order to locate a record (as opposed to looking it up by
    /// `sess_id` alone).
    fn requires_user_id_for_lookup(&self) -> bool {
        false
    }

    /// Creates or overwrites a session record.
    ///
    /// If `sess_id` is empty, a fresh globally-unique id is allocated and
    /// returned. Otherwise the existing record for `sess_id` is overwritten;
    /// implementations must fail if no such record exists.
    async fn save(
        &self,
        sess_id: &[u8],
        data: &[u8],
        user_id: &[u8],
        max_age_secs: i64,
        min_refresh_secs: i64,
    ) -> Result<Vec<u8>>;

    /// Looks up a session by id. `user_id_hint` is the user id carried on
    /// the client reference; back-ends that do not
    /// `requires_user_id_for_lookup` ignore it.
    ///
    /// Returns `Err(SessionError::NotFound)` if absent, and
    /// `Err(SessionError::Expired)` — having already deleted the record —
    /// if its time-to-live had elapsed.
    async fn get(&self, sess_id: &[u8], user_id_hint: &[u8]) -> Result<Record>;

    /// Removes a session record and any indices referencing it. Idempotent:
    /// deleting an absent session is not an error.
    async fn delete(&self, sess_id: &[u8], user_id_hint: &[u8]) -> Result<()>;

    /// Removes every session record whose stored `user_id` equals the
    /// argument. Back-ends that cannot support this return `Ok(0)` and
    /// should document the limitation at construction time.
    async fn delete_by_user_id(&self, user_id: &[u8]) -> Result<u64>;
}
