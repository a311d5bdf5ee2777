//! Authenticated encryption of session references, plus their transport
//! encoding.
//!
//! Encryption is AES-256-GCM with a random 12-byte nonce prepended to the
//! ciphertext. A [`KeyRing`] holds one or more keys: encryption always uses
//! the first, decryption tries each key in turn so that a rotated-out key
//! can still open sessions issued before the rotation.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand_core::{OsRng, RngCore};

use crate::error::{Result, SessionError};

/// Byte length of an AES-256-GCM key.
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// An ordered set of AEAD keys. Index 0 encrypts; all indices are tried on
/// decrypt, in order, so key rotation never invalidates references that
/// were encrypted under a key still present somewhere in the ring.
#[derive(Clone)]
pub struct KeyRing {
    ciphers: Vec<Aes256Gcm>,
}

impl KeyRing {
    /// Builds a key ring from 32-byte keys. Fails if empty or any key is the
    /// wrong length.
    pub fn new<I>(keys: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let ciphers = keys
            .into_iter()
            .map(|k| {
                let k = k.as_ref();
                if k.len() != KEY_LEN {
                    return Err(SessionError::config(
                        "KeyRing::new",
                        format!("key must be {KEY_LEN} bytes, got {}", k.len()),
                    ));
                }
                Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k)))
            })
            .collect::<Result<Vec<_>>>()?;

        if ciphers.is_empty() {
            return Err(SessionError::config(
                "KeyRing::new",
                "at least one key is required",
            ));
        }

        Ok(Self { ciphers })
    }
}

/// Hooks for a caller-supplied AEAD substitute. When set on a [`Codec`], the
/// `KeyRing` is bypassed entirely for both directions.
pub trait CustomCipher: Send + Sync {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Encrypts, then base64url-encodes; decodes, then decrypts. A caller may
/// substitute a [`CustomCipher`] for the built-in AEAD; the key ring is then
/// kept only to satisfy the "at least one key configured" invariant and is
/// otherwise ignored.
#[derive(Clone)]
pub struct Codec {
    keys: KeyRing,
    custom: Option<std::sync::Arc<dyn CustomCipher>>,
}

impl Codec {
    pub const fn new(keys: KeyRing) -> Self {
        Self { keys, custom: None }
    }

    /// Overrides the built-in AEAD with a caller-supplied implementation.
    pub fn with_custom_cipher(mut self, custom: std::sync::Arc<dyn CustomCipher>) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Encrypts `plain`, returning the URL-safe unpadded base64 reference.
    /// With the built-in AEAD this uses the ring's first key and a fresh
    /// random nonce prepended to the ciphertext.
    pub fn encrypt(&self, plain: &[u8]) -> Result<String> {
        if let Some(custom) = &self.custom {
            let encrypted = custom.encrypt(plain)?;
            return Ok(URL_SAFE_NO_PAD.encode(encrypted));
        }

        let cipher = &self.keys.ciphers[0];

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plain)
            .map_err(|e| SessionError::decrypt("encrypt", e))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Reverses [`Codec::encrypt`]. With the built-in AEAD, tries every key
    /// in the ring in order; the first one that opens the ciphertext wins.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let decoded = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| SessionError::decrypt("decrypt", e))?;

        if let Some(custom) = &self.custom {
            return custom.decrypt(&decoded);
        }

        if decoded.len() < NONCE_LEN {
            return Err(SessionError::decrypt("decrypt", "ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = decoded.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        for cipher in &self.keys.ciphers {
            if let Ok(plain) = cipher.decrypt(nonce, ciphertext) {
                return Ok(plain);
            }
        }

        Err(SessionError::decrypt("decrypt", "no key could open ciphertext"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> [u8; KEY_LEN] {
        [byte; KEY_LEN]
    }

    #[test]
    fn round_trips_under_same_key() {
        let ring = KeyRing::new([key(1)]).unwrap();
        let codec = Codec::new(ring);

        let plain = b"hello session";
        let enc = codec.encrypt(plain).unwrap();
        let dec = codec.decrypt(&enc).unwrap();

        assert_eq!(dec, plain);
    }

    #[test]
    fn rotated_key_still_decrypts_while_present() {
        let old_ring = KeyRing::new([key(1), key(2)]).unwrap();
        let old_codec = Codec::new(old_ring);
        let ref_str = old_codec.encrypt(b"payload").unwrap();

        let rotated_ring = KeyRing::new([key(3), key(1)]).unwrap();
        let rotated_codec = Codec::new(rotated_ring);
        assert_eq!(rotated_codec.decrypt(&ref_str).unwrap(), b"payload");

        let fully_rotated = KeyRing::new([key(3)]).unwrap();
        let fully_rotated_codec = Codec::new(fully_rotated);
        assert!(fully_rotated_codec.decrypt(&ref_str).is_err());
    }

    #[test]
    fn tamper_is_rejected() {
        let ring = KeyRing::new([key(9)]).unwrap();
        let codec = Codec::new(ring);
        let mut enc = codec.encrypt(b"tamper me").unwrap().into_bytes();
        let last = enc.len() - 1;
        enc[last] = if enc[last] == b'A' { b'B' } else { b'A' };
        let enc = String::from_utf8(enc).unwrap();

        assert!(codec.decrypt(&enc).is_err());
    }

    #[test]
    fn rejects_empty_key_ring() {
        assert!(KeyRing::new(Vec::<[u8; KEY_LEN]>::new()).is_err());
    }

    #[test]
    fn rejects_wrong_length_key() {
        assert!(KeyRing::new([vec![1u8; 16]]).is_err());
    }
}
