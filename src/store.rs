//! The process-wide [`Store`]: configuration, key material, codec, and
//! back-end handle shared by every [`crate::session::Session`] it issues.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::backend::BackEnd;
use crate::codec::{Codec, CustomCipher, KeyRing};
use crate::config::StoreConfig;
use crate::error::{Result, SessionError};
use crate::session::Session;
use crate::session_data::SessData;

type OnSessionSaved = dyn Fn(&[u8], OffsetDateTime) + Send + Sync;
type SendToken = dyn Fn(&str, i64) + Send + Sync;
type DeleteToken = dyn Fn() + Send + Sync;
type GetToken = dyn Fn() -> Option<String> + Send + Sync;
type NewSessData<D> = dyn Fn() -> D + Send + Sync;

/// A process-wide session container: configuration, encryption key set,
/// codec, back-end handle, and the defaults new [`Session`]s inherit.
///
/// `D` is the payload type every [`Session`] issued by this store carries.
/// Constructed once via [`StoreBuilder`] and then shared behind an `Arc`
/// across workers; everything reachable from a `&Store` is read-only after
/// construction.
pub struct Store<D: SessData> {
    config: StoreConfig,
    codec: Codec,
    backend: Arc<dyn BackEnd>,
    on_session_saved: Option<Arc<OnSessionSaved>>,
    send_token: Option<Arc<SendToken>>,
    delete_token: Option<Arc<DeleteToken>>,
    get_token: Option<Arc<GetToken>>,
    new_sess_data: Arc<NewSessData<D>>,
}

impl<D: SessData> Store<D> {
    pub(crate) const fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) const fn codec(&self) -> &Codec {
        &self.codec
    }

    pub(crate) fn backend(&self) -> &Arc<dyn BackEnd> {
        &self.backend
    }

    pub(crate) fn on_session_saved(&self) -> Option<&Arc<OnSessionSaved>> {
        self.on_session_saved.as_ref()
    }

    pub(crate) fn send_token_hook(&self) -> Option<&Arc<SendToken>> {
        self.send_token.as_ref()
    }

    pub(crate) fn delete_token_hook(&self) -> Option<&Arc<DeleteToken>> {
        self.delete_token.as_ref()
    }

    pub(crate) fn get_token_hook(&self) -> Option<&Arc<GetToken>> {
        self.get_token.as_ref()
    }

    /// Allocates a new, not-yet-persisted session for `user_id`. `user_id`
    /// may be empty; it is immutable for the life of the returned handle.
    pub fn new_session(self: &Arc<Self>, user_id: impl Into<Vec<u8>>) -> Session<D> {
        let data = (self.new_sess_data)();
        Session::new(self.clone(), user_id.into(), data)
    }

    /// Resolves an explicit reference string to a live session, bypassing
    /// any HTTP extraction. `GetSession` from [`crate::http`] builds on this.
    #[tracing::instrument(skip(self, token), err)]
    pub async fn get_token_session(self: &Arc<Self>, token: &str) -> Result<(Session<D>, i64)> {
        let plain = self
            .codec
            .decrypt(token)
            .map_err(|e| wrap(e, "Store::get_token_session"))?;

        let sess_ref = crate::reference::decode(&plain, self.config.uid_to_client)
            .map_err(|e| wrap(e, "Store::get_token_session"))?;

        let record = self
            .backend
            .get(&sess_ref.sess_id, &sess_ref.user_id)
            .await
            .map_err(|e| wrap(e, "Store::get_token_session"))?;

        let mut data = (self.new_sess_data)();
        data.unmarshal(&record.data)
            .map_err(|e| SessionError::Unmarshal("Store::get_token_session".into(), e))?;

        let session = Session {
            store: self.clone(),
            sess_id: sess_ref.sess_id,
            user_id: record.user_id,
            data,
            max_age_secs: record.max_age_secs,
            min_refresh_secs: record.min_refresh_secs,
            persisted: true,
        };

        Ok((session, record.ttl_secs))
    }
}

fn wrap(err: SessionError, ctx: &str) -> SessionError {
    match err {
        SessionError::NotFound(_) => SessionError::not_found(ctx),
        SessionError::Expired(_) => SessionError::expired(ctx),
        SessionError::Decrypt(_, cause) => SessionError::Decrypt(ctx.to_string(), cause),
        other => other,
    }
}

/// Builder for [`Store`]. Mirrors the reference implementation's
/// constructor-option list (§6.4 of the design spec): key set, auth type,
/// cookie attributes, optional Bearer hooks, and the `SessData` factory.
pub struct StoreBuilder<D: SessData> {
    config: StoreConfig,
    keys: Vec<[u8; crate::codec::KEY_LEN]>,
    custom_cipher: Option<Arc<dyn CustomCipher>>,
    backend: Arc<dyn BackEnd>,
    on_session_saved: Option<Arc<OnSessionSaved>>,
    send_token: Option<Arc<SendToken>>,
    delete_token: Option<Arc<DeleteToken>>,
    get_token: Option<Arc<GetToken>>,
    new_sess_data: Arc<NewSessData<D>>,
}

impl<D: SessData + Default + 'static> StoreBuilder<D> {
    /// Starts a builder over `backend`, defaulting to [`StoreConfig::default`]
    /// and `D::default` as the session data factory.
    pub fn new(backend: Arc<dyn BackEnd>) -> Self {
        Self {
            config: StoreConfig::default(),
            keys: Vec::new(),
            custom_cipher: None,
            backend,
            on_session_saved: None,
            send_token: None,
            delete_token: None,
            get_token: None,
            new_sess_data: Arc::new(D::default),
        }
    }
}

impl<D: SessData + 'static> StoreBuilder<D> {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a 32-byte AEAD key to the ring. The first key added encrypts;
    /// every key added (in order) is tried on decrypt.
    pub fn add_key(mut self, key: [u8; crate::codec::KEY_LEN]) -> Self {
        self.keys.push(key);
        self
    }

    /// Overrides the built-in AEAD with a caller-supplied implementation.
    /// The key set is still required (at least one key) to satisfy
    /// [`KeyRing::new`], but is otherwise ignored.
    pub fn custom_cipher(mut self, cipher: Arc<dyn CustomCipher>) -> Self {
        self.custom_cipher = Some(cipher);
        self
    }

    /// Registers a factory producing a fresh payload for every
    /// [`Store::new_session`]. Overrides the `D::default` factory installed
    /// by [`StoreBuilder::new`].
    pub fn new_sess_data<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
    {
        self.new_sess_data = Arc::new(factory);
        self
    }

    /// Audit hook invoked after every successful [`Session::save`], with the
    /// saved session's `user_id` and the save timestamp.
    pub fn on_session_saved<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[u8], OffsetDateTime) + Send + Sync + 'static,
    {
        self.on_session_saved = Some(Arc::new(hook));
        self
    }

    /// Bearer-only: called with `(reference, max_age_secs)` on every save
    /// instead of leaving the caller to read back [`Session::token`].
    pub fn send_token<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, i64) + Send + Sync + 'static,
    {
        self.send_token = Some(Arc::new(hook));
        self
    }

    /// Bearer-only: called on [`Session::delete`] instead of leaving the
    /// caller to discard the token themselves.
    pub fn delete_token<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.delete_token = Some(Arc::new(hook));
        self
    }

    /// Bearer-only: overrides parsing `Authorization: Bearer <ref>` with a
    /// caller-supplied token source.
    pub fn get_token<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.get_token = Some(Arc::new(hook));
        self
    }

    /// Finalizes the store. Fails if the key set is empty or any key has
    /// the wrong length — the only construction-time invariant this crate
    /// itself enforces; the rest of `StoreConfig` is trusted as-is.
    pub fn build(self) -> Result<Arc<Store<D>>> {
        let keys = KeyRing::new(self.keys)?;
        if let Some(custom) = self.custom_cipher {
            let codec = Codec::new(keys).with_custom_cipher(custom);
            return Ok(Arc::new(Store {
                config: self.config,
                codec,
                backend: self.backend,
                on_session_saved: self.on_session_saved,
                send_token: self.send_token,
                delete_token: self.delete_token,
                get_token: self.get_token,
                new_sess_data: self.new_sess_data,
            }));
        }

        let codec = Codec::new(keys);
        Ok(Arc::new(Store {
            config: self.config,
            codec,
            backend: self.backend,
            on_session_saved: self.on_session_saved,
            send_token: self.send_token,
            delete_token: self.delete_token,
            get_token: self.get_token,
            new_sess_data: self.new_sess_data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::kv::KvBackend;
    use crate::session_data::MapData;
    use std::time::Duration;

    async fn open_store() -> (Arc<Store<MapData>>, crate::backend::kv::PrunerHandle, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let tree = db.open_tree("sessions").unwrap();
        let (backend, handle) = KvBackend::open(tree, b"store-test:".to_vec(), Duration::from_secs(3600));

        let store = StoreBuilder::<MapData>::new(Arc::new(backend))
            .add_key([7u8; crate::codec::KEY_LEN])
            .build()
            .unwrap();

        (store, handle, dir)
    }

    #[tokio::test]
    async fn new_session_save_and_get_round_trip() {
        let (store, handle, _dir) = open_store().await;

        let mut session = store.new_session(b"xyzzy".to_vec());
        session.data_mut().insert("note", "Hello, World!");
        let token = session.save().await.unwrap();

        let (loaded, ttl) = store.get_token_session(&token).await.unwrap();
        assert_eq!(loaded.user_id(), b"xyzzy");
        assert_eq!(loaded.data().get("note").unwrap(), "Hello, World!");
        assert!(ttl > 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn token_with_ttl_reads_back_end_remaining_lifetime() {
        let (store, handle, _dir) = open_store().await;

        let mut session = store.new_session(b"xyzzy".to_vec());
        session.save().await.unwrap();

        let (token, ttl) = session.token_with_ttl().await.unwrap();
        assert_eq!(token, session.token().unwrap());
        assert!(ttl > 0 && ttl <= store.config().max_age_secs);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn token_with_ttl_fails_before_first_save() {
        let (store, handle, _dir) = open_store().await;

        let session = store.new_session(b"xyzzy".to_vec());
        assert!(session.token_with_ttl().await.is_err());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn build_rejects_empty_key_set() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let tree = db.open_tree("sessions").unwrap();
        let (backend, handle) = KvBackend::open(tree, b"p:".to_vec(), Duration::from_secs(3600));

        let result = StoreBuilder::<MapData>::new(Arc::new(backend)).build();
        assert!(result.is_err());

        handle.shutdown().await;
    }
}
