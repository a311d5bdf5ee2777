//! The reference ordered-key-value back-end: a [`sled`] tree holding three
//! co-maintained tables (session records, an expiration index, a user-id
//! index) with no transactions, kept consistent by careful operation
//! ordering. See the module-level docs on [`schema`] for the key layout.

mod pruner;
mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::backend::{BackEnd, Record};
use crate::error::{Result, SessionError, StorageError};

pub use pruner::{PrunerHandle, DEFAULT_PRUNE_INTERVAL};

type Tree = sled::Tree;

/// A `sled`-backed implementation of [`BackEnd`].
///
/// Construct with [`KvBackend::open`], which also spawns the background
/// pruner and hands back a [`PrunerHandle`] to control it. `prefix` lets
/// several independent session tables share one `sled::Db`.
#[derive(Clone)]
pub struct KvBackend {
    prefix: Vec<u8>,
    tree: Arc<Tree>,
}

impl KvBackend {
    /// Opens (or creates) a back-end over `tree`, scoping all keys under
    /// `prefix`, and spawns its pruner at `prune_interval`.
    pub fn open(tree: sled::Tree, prefix: impl Into<Vec<u8>>, prune_interval: Duration) -> (Self, PrunerHandle) {
        let prefix = prefix.into();
        let tree = Arc::new(tree);

        let handle = pruner::spawn(prefix.clone(), tree.clone(), prune_interval);

        (Self { prefix, tree }, handle)
    }

    /// Convenience over [`KvBackend::open`] taking a [`crate::config::KvConfig`]
    /// wholesale instead of its fields individually.
    pub fn open_with_config(tree: sled::Tree, config: &crate::config::KvConfig) -> (Self, PrunerHandle) {
        Self::open(tree, config.prefix.clone(), config.prune_interval)
    }
}

#[async_trait]
impl BackEnd for KvBackend {
    async fn save(
        &self,
        sess_id: &[u8],
        data: &[u8],
        user_id: &[u8],
        max_age_secs: i64,
        min_refresh_secs: i64,
    ) -> Result<Vec<u8>> {
        if max_age_secs <= 0 {
            return Err(SessionError::invariant(
                "KvBackend::save",
                "max_age_secs must be positive",
            ));
        }

        let prefix = self.prefix.clone();
        let tree = self.tree.clone();
        let data = data.to_vec();
        let user_id = user_id.to_vec();
        let sess_id = sess_id.to_vec();

        tokio::task::spawn_blocking(move || {
            save_blocking(&tree, &prefix, &sess_id, &data, &user_id, max_age_secs, min_refresh_secs)
        })
        .await
        .map_err(|e| SessionError::Storage("KvBackend::save".into(), StorageError::Join(e)))?
    }

    async fn get(&self, sess_id: &[u8], _user_id_hint: &[u8]) -> Result<Record> {
        let prefix = self.prefix.clone();
        let tree = self.tree.clone();
        let sess_id = sess_id.to_vec();

        tokio::task::spawn_blocking(move || get_blocking(&tree, &prefix, &sess_id))
            .await
            .map_err(|e| SessionError::Storage("KvBackend::get".into(), StorageError::Join(e)))?
    }

    async fn delete(&self, sess_id: &[u8], _user_id_hint: &[u8]) -> Result<()> {
        let prefix = self.prefix.clone();
        let tree = self.tree.clone();
        let sess_id = sess_id.to_vec();

        tokio::task::spawn_blocking(move || delete_blocking(&tree, &prefix, &sess_id))
            .await
            .map_err(|e| SessionError::Storage("KvBackend::delete".into(), StorageError::Join(e)))?
    }

    async fn delete_by_user_id(&self, user_id: &[u8]) -> Result<u64> {
        let prefix = self.prefix.clone();
        let tree = self.tree.clone();
        let user_id = user_id.to_vec();

        tokio::task::spawn_blocking(move || delete_by_user_id_blocking(&tree, &prefix, &user_id))
            .await
            .map_err(|e| SessionError::Storage("KvBackend::delete_by_user_id".into(), StorageError::Join(e)))?
    }
}

fn save_blocking(
    tree: &Tree,
    prefix: &[u8],
    sess_id: &[u8],
    data: &[u8],
    user_id: &[u8],
    max_age_secs: i64,
    min_refresh_secs: i64,
) -> Result<Vec<u8>> {
    let expiration = OffsetDateTime::now_utc().unix_timestamp() + max_age_secs;

    let value = schema::SessionValue {
        expiration,
        max_age_secs,
        min_refresh_secs,
        user_id: user_id.to_vec(),
        payload: data.to_vec(),
    }
    .encode()?;

    let storage_err = |e: sled::Error| SessionError::Storage("KvBackend::save".into(), e.into());

    if sess_id.is_empty() {
        // Fresh session: allocate the id, then write index-before-record-
        // before-user-index so a crash mid-write can only leave a harmless
        // orphaned expiration-index entry (cleaned by the pruner) or a
        // session with no user-index entry (only misses a later
        // DeleteByUserID sweep).
        let full_key = schema::session_key(prefix);
        let sess_id_out = full_key[prefix.len() + 1..].to_vec();

        let expiry_key = schema::expiry_key(prefix, expiration, &full_key);
        tree.insert(&expiry_key, &[]).map_err(storage_err)?;
        tree.insert(&full_key, value.as_slice()).map_err(storage_err)?;
        if !user_id.is_empty() {
            let user_key = schema::user_key(prefix, user_id, &full_key);
            tree.insert(&user_key, &[]).map_err(storage_err)?;
        }

        Ok(sess_id_out)
    } else {
        let full_key = [schema::session_prefix(prefix).as_slice(), sess_id].concat();

        let old_raw = tree
            .get(&full_key)
            .map_err(storage_err)?
            .ok_or_else(|| SessionError::not_found("KvBackend::save"))?;
        let old_value = schema::SessionValue::decode(&old_raw)?;

        let new_expiry_key = schema::expiry_key(prefix, expiration, &full_key);
        tree.insert(&new_expiry_key, &[]).map_err(storage_err)?;
        tree.insert(&full_key, value.as_slice()).map_err(storage_err)?;

        let old_expiry_key = schema::expiry_key(prefix, old_value.expiration, &full_key);
        if old_expiry_key != new_expiry_key {
            tree.remove(&old_expiry_key).map_err(storage_err)?;
        }

        if old_value.user_id != user_id {
            if !old_value.user_id.is_empty() {
                tree.remove(schema::user_key(prefix, &old_value.user_id, &full_key))
                    .map_err(storage_err)?;
            }
            if !user_id.is_empty() {
                tree.insert(schema::user_key(prefix, user_id, &full_key), &[])
                    .map_err(storage_err)?;
            }
        }

        Ok(sess_id.to_vec())
    }
}

fn get_blocking(tree: &Tree, prefix: &[u8], sess_id: &[u8]) -> Result<Record> {
    let full_key = [schema::session_prefix(prefix).as_slice(), sess_id].concat();
    let storage_err = |e: sled::Error| SessionError::Storage("KvBackend::get".into(), e.into());

    let raw = tree
        .get(&full_key)
        .map_err(storage_err)?
        .ok_or_else(|| SessionError::not_found("KvBackend::get"))?;

    let value = schema::SessionValue::decode(&raw)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let ttl = value.expiration - now;

    if ttl <= 0 {
        delete_blocking(tree, prefix, sess_id)?;
        return Err(SessionError::expired("KvBackend::get"));
    }

    Ok(Record {
        data: value.payload,
        user_id: value.user_id,
        ttl_secs: ttl,
        max_age_secs: value.max_age_secs,
        min_refresh_secs: value.min_refresh_secs,
    })
}

fn delete_blocking(tree: &Tree, prefix: &[u8], sess_id: &[u8]) -> Result<()> {
    let full_key = [schema::session_prefix(prefix).as_slice(), sess_id].concat();
    let storage_err = |e: sled::Error| SessionError::Storage("KvBackend::delete".into(), e.into());

    let Some(raw) = tree.get(&full_key).map_err(storage_err)? else {
        return Ok(());
    };
    let value = schema::SessionValue::decode(&raw)?;

    if !value.user_id.is_empty() {
        tree.remove(schema::user_key(prefix, &value.user_id, &full_key))
            .map_err(storage_err)?;
    }
    tree.remove(&full_key).map_err(storage_err)?;
    tree.remove(schema::expiry_key(prefix, value.expiration, &full_key))
        .map_err(storage_err)?;

    Ok(())
}

fn delete_by_user_id_blocking(tree: &Tree, prefix: &[u8], user_id: &[u8]) -> Result<u64> {
    let storage_err = |e: sled::Error| SessionError::Storage("KvBackend::delete_by_user_id".into(), e.into());
    let user_prefix = schema::user_prefix(prefix, user_id);
    let fixed_len = user_prefix.len();

    let mut hits = Vec::new();
    for entry in tree.scan_prefix(&user_prefix) {
        let (user_key, _) = entry.map_err(storage_err)?;
        hits.push(schema::session_key_suffix(&user_key, fixed_len).to_vec());
    }

    let mut deleted = 0u64;
    for full_session_key in hits {
        let sess_id = &full_session_key[schema::session_prefix(prefix).len()..];
        match delete_blocking(tree, prefix, sess_id) {
            Ok(()) => deleted += 1,
            Err(err) => tracing::warn!(err = %err, "delete_by_user_id: skipping one record"),
        }
    }

    Ok(deleted)
}
