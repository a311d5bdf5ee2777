//! Error taxonomy shared across the whole crate.
//!
//! Every public entry point wraps its underlying cause with a stable,
//! greppable context prefix, mirroring the "context - cause" convention
//! the reference implementation uses throughout.

use thiserror::Error;

/// Errors surfaced by [`crate::store::Store`] and [`crate::session::Session`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// No reference was present on the request, or the back-end has no
    /// record for the given session id.
    #[error("{0}: not found")]
    NotFound(String),

    /// The back-end had a record but its time-to-live had elapsed; the
    /// record has already been deleted by the time this is returned.
    #[error("{0}: expired")]
    Expired(String),

    /// The session reference was malformed, truncated, tampered with, or
    /// could not be opened under any configured key.
    #[error("{0}: decrypt failed: {1}")]
    Decrypt(String, String),

    /// The session payload could not be serialized.
    #[error("{0}: marshal failed: {1}")]
    Marshal(String, #[source] MarshalError),

    /// The session payload could not be deserialized.
    #[error("{0}: unmarshal failed: {1}")]
    Unmarshal(String, #[source] MarshalError),

    /// The back-end reported an I/O failure.
    #[error("{0}: storage error: {1}")]
    Storage(String, #[source] StorageError),

    /// An invariant was violated at construction time (missing keys, bad
    /// key length, unknown auth type string).
    #[error("{0}: invalid configuration: {1}")]
    Config(String, String),

    /// An invariant was violated at call time (non-positive `max_age`,
    /// `sess_id` longer than 255 bytes, and similar caller errors).
    #[error("{0}: invariant violated: {1}")]
    Invariant(String, String),
}

impl SessionError {
    pub(crate) fn not_found(ctx: impl Into<String>) -> Self {
        Self::NotFound(ctx.into())
    }

    pub(crate) fn expired(ctx: impl Into<String>) -> Self {
        Self::Expired(ctx.into())
    }

    pub(crate) fn decrypt(ctx: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Decrypt(ctx.into(), cause.to_string())
    }

    pub(crate) fn config(ctx: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Config(ctx.into(), cause.to_string())
    }

    pub(crate) fn invariant(ctx: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Invariant(ctx.into(), cause.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure deserializing or serializing a [`crate::session_data::SessData`] payload.
#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("messagepack: {0}")]
    MessagePackEncode(#[from] rmp_serde::encode::Error),
    #[error("messagepack: {0}")]
    MessagePackDecode(#[from] rmp_serde::decode::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("custom payload: {0}")]
    Custom(String),
}

/// Failure talking to the persistent back-end.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("record corrupt: {0}")]
    Corrupt(String),
    #[error("no record for session id")]
    NoRecord,
}
