//! Key and value layout for [`super::KvBackend`].
//!
//! Three tables share one flat keyspace, distinguished by a one-byte tag
//! right after the caller-chosen prefix:
//!
//! * `0x01` — session table: `prefix ‖ 0x01 ‖ rand(10) ‖ created_nanos(8, LE)`
//!   → `expiration(8,LE) ‖ max_age(8,LE) ‖ min_refresh(8,LE) ‖ uid_len(1) ‖ uid ‖ payload`
//! * `0x02` — expiration index: `prefix ‖ 0x02 ‖ expiration(8,LE) ‖ session_key` → `()`
//! * `0x03` — user-id index: `prefix ‖ 0x03 ‖ user_id ‖ session_key` → `()`

use rand_core::{OsRng, RngCore};

use crate::error::{Result, SessionError, StorageError};

pub const SESSION_TAG: u8 = 0x01;
pub const EXPIRY_TAG: u8 = 0x02;
pub const USER_TAG: u8 = 0x03;

const RAND_LEN: usize = 10;
const TIME_LEN: usize = 8;
/// `rand(10) ‖ created_nanos(8)`
pub const SESSION_KEY_BODY_LEN: usize = RAND_LEN + TIME_LEN;

pub fn session_key(prefix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + SESSION_KEY_BODY_LEN);
    key.extend_from_slice(prefix);
    key.push(SESSION_TAG);

    let mut rand_bytes = [0u8; RAND_LEN];
    OsRng.fill_bytes(&mut rand_bytes);
    key.extend_from_slice(&rand_bytes);

    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos() as u64;
    key.extend_from_slice(&nanos.to_le_bytes());

    key
}

pub fn session_prefix(prefix: &[u8]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.push(SESSION_TAG);
    key
}

pub fn expiry_prefix(prefix: &[u8]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.push(EXPIRY_TAG);
    key
}

pub fn expiry_key(prefix: &[u8], expiration: i64, session_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + 8 + session_key.len());
    key.extend_from_slice(prefix);
    key.push(EXPIRY_TAG);
    key.extend_from_slice(&expiration.to_le_bytes());
    key.extend_from_slice(session_key);
    key
}

pub fn user_prefix(prefix: &[u8], user_id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1 + user_id.len());
    key.extend_from_slice(prefix);
    key.push(USER_TAG);
    key.extend_from_slice(user_id);
    key
}

pub fn user_key(prefix: &[u8], user_id: &[u8], session_key: &[u8]) -> Vec<u8> {
    let mut key = user_prefix(prefix, user_id);
    key.extend_from_slice(session_key);
    key
}

/// Recovers the trailing `session_key` bytes from a full expiration-index or
/// user-index key, given the length of the fixed portion that precedes it.
pub fn session_key_suffix(full_key: &[u8], fixed_len: usize) -> &[u8] {
    &full_key[fixed_len..]
}

/// Recovers the 8-byte little-endian expiration embedded in a full
/// expiration-index key, right after `prefix ‖ EXPIRY_TAG`.
pub fn expiry_key_expiration(full_key: &[u8], prefix: &[u8]) -> Result<i64> {
    let start = prefix.len() + 1;
    let end = start + 8;
    let bytes = full_key.get(start..end).ok_or_else(|| {
        SessionError::Storage(
            "expiry_key_expiration".into(),
            StorageError::Corrupt("expiration-index key shorter than fixed header".into()),
        )
    })?;
    Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
}

/// The decoded contents of a session table value.
#[derive(Debug, Clone)]
pub struct SessionValue {
    pub expiration: i64,
    pub max_age_secs: i64,
    pub min_refresh_secs: i64,
    pub user_id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl SessionValue {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.user_id.len() > u8::MAX as usize {
            return Err(SessionError::invariant(
                "SessionValue::encode",
                format!("user_id length {} exceeds 255", self.user_id.len()),
            ));
        }

        let mut out = Vec::with_capacity(24 + 1 + self.user_id.len() + self.payload.len());
        out.extend_from_slice(&self.expiration.to_le_bytes());
        out.extend_from_slice(&self.max_age_secs.to_le_bytes());
        out.extend_from_slice(&self.min_refresh_secs.to_le_bytes());
        out.push(self.user_id.len() as u8);
        out.extend_from_slice(&self.user_id);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        const HEADER_LEN: usize = 8 + 8 + 8 + 1;
        if bytes.len() < HEADER_LEN {
            return Err(SessionError::Storage(
                "SessionValue::decode".into(),
                StorageError::Corrupt("value shorter than fixed header".into()),
            ));
        }

        let expiration = i64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let max_age_secs = i64::from_le_bytes(bytes[8..16].try_into().unwrap());
        let min_refresh_secs = i64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let uid_len = bytes[24] as usize;

        if HEADER_LEN + uid_len > bytes.len() {
            return Err(SessionError::Storage(
                "SessionValue::decode".into(),
                StorageError::Corrupt("uid_len exceeds remaining value length".into()),
            ));
        }

        let user_id = bytes[HEADER_LEN..HEADER_LEN + uid_len].to_vec();
        let payload = bytes[HEADER_LEN + uid_len..].to_vec();

        Ok(Self {
            expiration,
            max_age_secs,
            min_refresh_secs,
            user_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_value_round_trips() {
        let value = SessionValue {
            expiration: 1_700_000_000,
            max_age_secs: 3600,
            min_refresh_secs: 60,
            user_id: b"user-42".to_vec(),
            payload: b"opaque payload bytes".to_vec(),
        };

        let encoded = value.encode().unwrap();
        let decoded = SessionValue::decode(&encoded).unwrap();

        assert_eq!(decoded.expiration, value.expiration);
        assert_eq!(decoded.max_age_secs, value.max_age_secs);
        assert_eq!(decoded.min_refresh_secs, value.min_refresh_secs);
        assert_eq!(decoded.user_id, value.user_id);
        assert_eq!(decoded.payload, value.payload);
    }

    #[test]
    fn session_keys_are_unique() {
        let prefix = b"sess:";
        let a = session_key(prefix);
        let b = session_key(prefix);
        assert_ne!(a, b);
        assert!(a.starts_with(&session_prefix(prefix)));
    }

    #[test]
    fn expiry_key_embeds_session_key_as_suffix() {
        let prefix = b"p:";
        let skey = session_key(prefix);
        let ekey = expiry_key(prefix, 42, &skey);
        let fixed_len = prefix.len() + 1 + 8;
        assert_eq!(session_key_suffix(&ekey, fixed_len), skey.as_slice());
    }

    #[test]
    fn expiry_key_expiration_recovers_embedded_value() {
        let prefix = b"p:";
        let skey = session_key(prefix);
        let ekey = expiry_key(prefix, 1_700_000_000, &skey);
        assert_eq!(expiry_key_expiration(&ekey, prefix).unwrap(), 1_700_000_000);
    }

    #[test]
    fn expiry_key_expiration_rejects_truncated_key() {
        let prefix = b"p:";
        let mut ekey = expiry_prefix(prefix);
        ekey.extend_from_slice(&[0u8; 3]);
        assert!(expiry_key_expiration(&ekey, prefix).is_err());
    }
}
