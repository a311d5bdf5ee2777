//! `websess` — encrypted, pluggable-backend web session management.
//!
//! A [`store::Store`] issues [`session::Session`] handles backed by any
//! [`backend::BackEnd`] implementation; the reference [`backend::kv::KvBackend`]
//! is a `sled`-backed ordered key-value store with expiration pruning and
//! user-id indexing built in. References travel to the client as an
//! authenticated-encrypted, base64url-encoded cookie or bearer token — see
//! [`codec`] and [`reference`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use websess::backend::kv::KvBackend;
//! use websess::session_data::MapData;
//! use websess::store::StoreBuilder;
//!
//! # async fn example() -> websess::error::Result<()> {
//! let db = sled::open("sessions.db").unwrap();
//! let tree = db.open_tree("sessions").unwrap();
//! let (backend, _pruner) = KvBackend::open(tree, b"websess:".to_vec(), Duration::from_secs(120));
//!
//! let store = StoreBuilder::<MapData>::new(Arc::new(backend))
//!     .add_key([0u8; 32])
//!     .build()?;
//!
//! let mut session = store.new_session(b"user-1".to_vec());
//! session.data_mut().insert("note", "hello");
//! let _token = session.save().await?;
//! # Ok(())
//! # }
//! ```

#![warn(
    clippy::correctness,
    clippy::perf,
    clippy::suspicious,
    clippy::complexity,
    clippy::nursery,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod reference;
pub mod session;
pub mod session_data;
pub mod store;

pub use backend::BackEnd;
pub use codec::{Codec, KeyRing};
pub use config::{AuthType, KvConfig, StoreConfig};
pub use error::{SessionError, Result};
pub use session::Session;
pub use session_data::{MapData, NoData, SessData};
pub use store::{Store, StoreBuilder};
