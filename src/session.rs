//! The per-request [`Session`] handle.

use std::sync::Arc;

use crate::error::{Result, SessionError};
use crate::session_data::SessData;
use crate::store::Store;

/// A session bound to a [`Store`]. Not `Clone`: a handle is meant to be
/// owned by one request; sharing it across requests is a caller error the
/// type system should prevent rather than paper over with interior
/// mutability — this engine's back-end calls are already async and
/// serialized per request, so there is no shared mutable state to guard.
pub struct Session<D: SessData> {
    pub(crate) store: Arc<Store<D>>,
    pub(crate) sess_id: Vec<u8>,
    pub(crate) user_id: Vec<u8>,
    pub(crate) data: D,
    pub(crate) max_age_secs: i64,
    pub(crate) min_refresh_secs: i64,
    pub(crate) persisted: bool,
}

impl<D: SessData> std::fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sess_id_len", &self.sess_id.len())
            .field("user_id_len", &self.user_id.len())
            .field("persisted", &self.persisted)
            .finish()
    }
}

impl<D: SessData> Session<D> {
    pub(crate) fn new(store: Arc<Store<D>>, user_id: Vec<u8>, data: D) -> Self {
        let max_age_secs = store.config().max_age_secs;
        let min_refresh_secs = store.config().min_refresh_secs;
        Self {
            store,
            sess_id: Vec::new(),
            user_id,
            data,
            max_age_secs,
            min_refresh_secs,
            persisted: false,
        }
    }

    /// Back-end-assigned session id. Empty until the first [`Session::save`].
    pub fn id(&self) -> &[u8] {
        &self.sess_id
    }

    /// Application-assigned user id. Immutable after construction.
    pub fn user_id(&self) -> &[u8] {
        &self.user_id
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub const fn max_age_secs(&self) -> i64 {
        self.max_age_secs
    }

    pub const fn min_refresh_secs(&self) -> i64 {
        self.min_refresh_secs
    }

    /// Overrides this session's max-age, taking effect on the next
    /// [`Session::save`]. Must be positive or `save` will reject it.
    pub fn set_max_age_secs(&mut self, max_age_secs: i64) {
        self.max_age_secs = max_age_secs;
    }

    pub fn set_min_refresh_secs(&mut self, min_refresh_secs: i64) {
        self.min_refresh_secs = min_refresh_secs;
    }

    /// Marshals the payload, writes it through the back-end (refreshing its
    /// TTL), and returns the reference string to hand to the client.
    #[tracing::instrument(skip(self), err)]
    pub async fn save(&mut self) -> Result<String> {
        if self.max_age_secs <= 0 {
            return Err(SessionError::invariant(
                "Session::save",
                "max_age_secs must be positive",
            ));
        }

        let payload = self
            .data
            .marshal()
            .map_err(|e| SessionError::Marshal("Session::save".into(), e))?;

        let new_id = self
            .store
            .backend()
            .save(
                &self.sess_id,
                &payload,
                &self.user_id,
                self.max_age_secs,
                self.min_refresh_secs,
            )
            .await
            .map_err(|e| wrap(e, "Session::save"))?;

        self.sess_id = new_id;
        self.persisted = true;

        if let Some(hook) = self.store.on_session_saved() {
            hook(&self.user_id, time::OffsetDateTime::now_utc());
        }

        self.token()
    }

    /// Computes the current reference string without touching the
    /// back-end. Callers typically only need this right after [`Session::save`];
    /// [`crate::http`] does this automatically for the HTTP transports.
    pub fn token(&self) -> Result<String> {
        let plain = crate::reference::encode(&self.sess_id, &self.user_id, self.store.config().uid_to_client)?;
        self.store.codec().encrypt(&plain)
    }

    /// Like [`Session::token`], but also reads the session's remaining
    /// time-to-live from the back-end. Fails the same way
    /// [`crate::store::Store::get_token_session`] does if the record has
    /// since expired or gone missing out from under this handle.
    #[tracing::instrument(skip(self), err)]
    pub async fn token_with_ttl(&self) -> Result<(String, i64)> {
        let token = self.token()?;
        if self.sess_id.is_empty() {
            return Err(SessionError::not_found("Session::token_with_ttl"));
        }
        let record = self
            .store
            .backend()
            .get(&self.sess_id, &self.user_id)
            .await
            .map_err(|e| wrap(e, "Session::token_with_ttl"))?;
        Ok((token, record.ttl_secs))
    }

    /// Removes this session from the back-end. Idempotent.
    #[tracing::instrument(skip(self), err)]
    pub async fn delete(&mut self) -> Result<()> {
        if self.sess_id.is_empty() {
            return Ok(());
        }
        self.store
            .backend()
            .delete(&self.sess_id, &self.user_id)
            .await
            .map_err(|e| wrap(e, "Session::delete"))?;
        self.persisted = false;
        Ok(())
    }

    /// Removes every session belonging to this session's `user_id`,
    /// including this one.
    #[tracing::instrument(skip(self), err)]
    pub async fn delete_by_user_id(&mut self) -> Result<u64> {
        let removed = self
            .store
            .backend()
            .delete_by_user_id(&self.user_id)
            .await
            .map_err(|e| wrap(e, "Session::delete_by_user_id"))?;
        self.persisted = false;
        Ok(removed)
    }

    /// Rotates this session's id while keeping its payload, defeating
    /// session-fixation attacks that rely on a pre-known id surviving
    /// authentication.
    #[tracing::instrument(skip(self), err)]
    pub async fn cycle_id(&mut self) -> Result<String> {
        if self.persisted {
            self.store
                .backend()
                .delete(&self.sess_id, &self.user_id)
                .await
                .map_err(|e| wrap(e, "Session::cycle_id"))?;
        }
        self.sess_id = Vec::new();
        self.persisted = false;
        self.save().await
    }
}

fn wrap(err: SessionError, ctx: &str) -> SessionError {
    match err {
        SessionError::NotFound(_) => SessionError::not_found(ctx),
        SessionError::Expired(_) => SessionError::expired(ctx),
        other => other,
    }
}
