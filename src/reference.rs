//! Packing and unpacking of the plaintext that travels inside a session
//! reference, before encryption.
//!
//! Two shapes are supported, chosen once per [`crate::store::Store`]:
//!
//! * shape A — just the session id, used when the back-end can locate a
//!   session by id alone.
//! * shape B — `u8 len(sess_id) ‖ sess_id ‖ user_id`, used when the back-end
//!   needs the user id at lookup time (`requires_user_id_for_lookup`).

use crate::error::{Result, SessionError};

/// The decoded contents of a session reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub sess_id: Vec<u8>,
    pub user_id: Vec<u8>,
}

/// Packs a reference plaintext. `user_id` is included only when
/// `uid_to_client` is set.
pub fn encode(sess_id: &[u8], user_id: &[u8], uid_to_client: bool) -> Result<Vec<u8>> {
    if !uid_to_client {
        return Ok(sess_id.to_vec());
    }

    if sess_id.len() > u8::MAX as usize {
        return Err(SessionError::invariant(
            "reference::encode",
            format!("sess_id length {} exceeds 255", sess_id.len()),
        ));
    }

    let mut out = Vec::with_capacity(1 + sess_id.len() + user_id.len());
    out.push(sess_id.len() as u8);
    out.extend_from_slice(sess_id);
    out.extend_from_slice(user_id);
    Ok(out)
}

/// Unpacks a reference plaintext produced by [`encode`].
pub fn decode(plain: &[u8], uid_to_client: bool) -> Result<SessionRef> {
    if !uid_to_client {
        return Ok(SessionRef {
            sess_id: plain.to_vec(),
            user_id: Vec::new(),
        });
    }

    let Some(&len) = plain.first() else {
        return Err(SessionError::decrypt("reference::decode", "empty reference"));
    };
    let len = len as usize;

    if 1 + len > plain.len() {
        return Err(SessionError::decrypt(
            "reference::decode",
            "sess_id length prefix exceeds reference length",
        ));
    }

    let sess_id = plain[1..1 + len].to_vec();
    let user_id = plain[1 + len..].to_vec();

    Ok(SessionRef { sess_id, user_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_a_round_trips() {
        let encoded = encode(b"abc123", b"", false).unwrap();
        let decoded = decode(&encoded, false).unwrap();
        assert_eq!(decoded.sess_id, b"abc123");
        assert!(decoded.user_id.is_empty());
    }

    #[test]
    fn shape_b_round_trips() {
        let encoded = encode(b"sessid", b"userid-xyzzy", true).unwrap();
        let decoded = decode(&encoded, true).unwrap();
        assert_eq!(decoded.sess_id, b"sessid");
        assert_eq!(decoded.user_id, b"userid-xyzzy");
    }

    #[test]
    fn shape_b_rejects_truncated_length_prefix() {
        let malformed = vec![200u8, 1, 2, 3];
        assert!(decode(&malformed, true).is_err());
    }

    #[test]
    fn shape_b_rejects_empty() {
        assert!(decode(&[], true).is_err());
    }
}
