//! Background expiration sweep for [`super::KvBackend`].
//!
//! Runs on a timer, walks the whole expiration-index prefix each tick, and
//! numerically compares each entry's *stored* expiration against "now"
//! rather than trusting lexicographic key order: the expiration field is
//! little-endian, which does not sort the same as it counts, so an
//! early-exit on the first still-live key would silently stop pruning
//! everything after it.
//!
//! An index entry whose pointed-to session is still alive is not
//! necessarily still live itself: a save-refresh writes the new
//! expiration-index entry before deleting the old one, so an interrupted
//! refresh leaves an index entry pointing at a session whose current
//! expiration no longer matches the one embedded in that entry's key. The
//! sweep decodes and compares that embedded expiration too, and drops the
//! entry whenever it disagrees with the record, independent of the
//! `<= now` check.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;

use super::schema::{self, SessionValue};
use super::Tree;

pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(120);

/// A handle to the running pruner task. Dropping it does not stop the task;
/// call [`PrunerHandle::shutdown`] explicitly.
pub struct PrunerHandle {
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: Option<watch::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl PrunerHandle {
    /// Changes the sweep interval; takes effect after the current sleep
    /// completes.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.interval_tx.send(interval);
    }

    /// Signals the pruner to stop and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

pub fn spawn(prefix: Vec<u8>, tree: Arc<Tree>, interval: Duration) -> PrunerHandle {
    let (interval_tx, mut interval_rx) = watch::channel(interval);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    let task = tokio::spawn(async move {
        loop {
            let current_interval = *interval_rx.borrow();
            tokio::select! {
                () = tokio::time::sleep(current_interval) => {}
                _ = shutdown_rx.changed() => {
                    tracing::trace!("pruner received shutdown signal");
                    return;
                }
                _ = interval_rx.changed() => {
                    continue;
                }
            }

            if let Err(err) = sweep(&prefix, &tree).await {
                tracing::error!(err = %err, "pruner sweep failed");
            }
        }
    });

    PrunerHandle {
        interval_tx,
        shutdown_tx: Some(shutdown_tx),
        task,
    }
}

async fn sweep(prefix: &[u8], tree: &Arc<Tree>) -> sled::Result<()> {
    let prefix = prefix.to_vec();
    let tree = tree.clone();

    tokio::task::spawn_blocking(move || sweep_blocking(&prefix, &tree))
        .await
        .expect("pruner sweep task panicked")
}

fn sweep_blocking(prefix: &[u8], tree: &Tree) -> sled::Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let expiry_prefix = schema::expiry_prefix(prefix);
    let session_prefix = schema::session_prefix(prefix);
    let fixed_len = expiry_prefix.len() + 8;

    let mut stale_index_keys = Vec::new();
    let mut stale_session_keys = Vec::new();
    let mut stale_user_entries = Vec::new();

    for entry in tree.scan_prefix(&expiry_prefix) {
        let (index_key, _) = entry?;
        let sess_key_suffix = schema::session_key_suffix(&index_key, fixed_len);
        let full_session_key = [session_prefix.as_slice(), sess_key_suffix].concat();

        match tree.get(&full_session_key)? {
            None => {
                tracing::trace!("pruner: dropping orphaned expiration-index entry");
                stale_index_keys.push(index_key.to_vec());
            }
            Some(raw_value) => match SessionValue::decode(&raw_value) {
                Ok(value) if value.expiration <= now => {
                    stale_index_keys.push(index_key.to_vec());
                    stale_session_keys.push(full_session_key.clone());
                    if !value.user_id.is_empty() {
                        stale_user_entries.push(schema::user_key(
                            prefix,
                            &value.user_id,
                            &full_session_key,
                        ));
                    }
                }
                Ok(value) => {
                    // The session is still alive, but this index entry's
                    // embedded expiration may not match what's actually
                    // stored: a save-refresh interrupted between putting the
                    // new expiry key and deleting the old one leaves exactly
                    // this kind of stale-but-pointing-at-a-live-session
                    // entry behind. Only the entry carrying the record's
                    // current expiration is the live one; any other gets
                    // dropped here rather than lingering forever.
                    match schema::expiry_key_expiration(&index_key, prefix) {
                        Ok(embedded) if embedded != value.expiration => {
                            tracing::trace!(
                                "pruner: dropping stale expiration-index entry for refreshed session"
                            );
                            stale_index_keys.push(index_key.to_vec());
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!(err = %err, "pruner: malformed expiration-index key, dropping it");
                            stale_index_keys.push(index_key.to_vec());
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(err = %err, "pruner: malformed session record, dropping index entry");
                    stale_index_keys.push(index_key.to_vec());
                }
            },
        }
    }

    for key in &stale_index_keys {
        tree.remove(key)?;
    }
    for key in &stale_session_keys {
        tree.remove(key)?;
    }
    for key in &stale_user_entries {
        tree.remove(key)?;
    }

    if !stale_session_keys.is_empty() {
        tracing::debug!(count = stale_session_keys.len(), "pruner: removed expired sessions");
    }

    Ok(())
}
