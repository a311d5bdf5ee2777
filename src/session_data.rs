//! The pluggable session payload.
//!
//! A [`SessData`] implementor knows how to turn itself into bytes and back.
//! Most applications bring their own type (the typical path); [`MapData`]
//! and [`NoData`] cover the two built-in cases the reference implementation
//! ships: a self-describing map payload, and an explicit "no payload at
//! all" sentinel.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::MarshalError;

/// A session payload that can be marshaled to bytes for storage and
/// unmarshaled back. `unmarshal` is called against `&mut self` so that
/// implementors can reuse an existing allocation; implementors must fully
/// overwrite their own state rather than merging into whatever was left
/// over from the previous load, since a stale-but-valid field otherwise
/// survives across a session reuse.
pub trait SessData: Send + Sync {
    fn marshal(&self) -> Result<Vec<u8>, MarshalError>;
    fn unmarshal(&mut self, bytes: &[u8]) -> Result<(), MarshalError>;
}

/// Blanket impl for any `Serialize + DeserializeOwned` type via MessagePack,
/// matching the reference Redis back-end's own `rmp_serde` usage.
impl<T> SessData for T
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn marshal(&self) -> Result<Vec<u8>, MarshalError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    fn unmarshal(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        *self = rmp_serde::from_slice(bytes)?;
        Ok(())
    }
}

/// The sentinel payload for stores configured without a `SessData` factory.
/// Marshal produces no bytes; unmarshal ignores its input.
#[derive(Debug, Clone, Default, Serialize, serde::Deserialize)]
pub struct NoData;

impl SessData for NoData {
    fn marshal(&self) -> Result<Vec<u8>, MarshalError> {
        Ok(Vec::new())
    }

    fn unmarshal(&mut self, _bytes: &[u8]) -> Result<(), MarshalError> {
        Ok(())
    }
}

/// The default self-describing payload: an arbitrary string-keyed map of
/// JSON values, serialized as MessagePack. Mirrors the reference
/// implementation's `VarMap`.
#[derive(Debug, Clone, Default, Serialize, serde::Deserialize, PartialEq)]
pub struct MapData(HashMap<String, Value>);

impl MapData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }
}

impl SessData for MapData {
    fn marshal(&self) -> Result<Vec<u8>, MarshalError> {
        Ok(rmp_serde::to_vec(&self.0)?)
    }

    fn unmarshal(&mut self, bytes: &[u8]) -> Result<(), MarshalError> {
        // Overwrite wholesale: a session reused after a refresh must never
        // see keys left over from an earlier load.
        self.0 = rmp_serde::from_slice(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_data_round_trips() {
        let mut original = MapData::new();
        original.insert("note", "Hello, World!");

        let bytes = original.marshal().unwrap();

        let mut restored = MapData::new();
        restored.insert("stale", "leftover");
        restored.unmarshal(&bytes).unwrap();

        assert_eq!(restored, original);
        assert!(restored.get("stale").is_none());
    }

    #[test]
    fn no_data_marshals_empty() {
        let nd = NoData;
        assert!(nd.marshal().unwrap().is_empty());
    }

    #[test]
    fn custom_struct_round_trips_via_blanket_impl() {
        #[derive(Serialize, serde::Deserialize, PartialEq, Debug, Default)]
        struct AuthUser {
            id: u64,
            name: String,
        }

        let user = AuthUser { id: 7, name: "ferris".into() };
        let bytes = SessData::marshal(&user).unwrap();

        let mut restored = AuthUser::default();
        restored.unmarshal(&bytes).unwrap();

        assert_eq!(restored, user);
    }
}
