//! Data sealing for transient identifiers
//!
//! A sealer turns a plaintext into an opaque, integrity-protected token that
//! carries its own expiry, and reverses the process. Expiry is reported
//! separately from every other failure.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use thiserror::Error;

use crate::error::ResolutionError;

const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &str = "attrflow 2024 transient identifier sealing key";

/// Sealing errors
#[derive(Debug, Error, PartialEq)]
pub enum SealerError {
    /// The sealed data is past its expiry time
    #[error("Sealed data has expired")]
    Expired,

    /// Any other wrap/unwrap failure
    #[error("Sealing failed: {0}")]
    Sealing(String),
}

impl From<SealerError> for ResolutionError {
    fn from(err: SealerError) -> Self {
        match err {
            SealerError::Expired => ResolutionError::ExpiredIdentifier,
            SealerError::Sealing(message) => ResolutionError::Sealing(message),
        }
    }
}

/// Wraps and unwraps expiring opaque tokens
pub trait DataSealer: Send + Sync {
    /// Seal `plaintext` so that it unwraps until `expiry_millis` (Unix epoch ms)
    fn wrap(&self, plaintext: &str, expiry_millis: i64) -> Result<String, SealerError>;

    /// Recover the plaintext of a sealed token
    fn unwrap(&self, sealed: &str) -> Result<String, SealerError>;
}

/// AES-256-GCM sealer
///
/// Token layout before base64: 12-byte random nonce, then the GCM ciphertext of
/// the big-endian expiry timestamp followed by the UTF-8 plaintext.
pub struct AesGcmDataSealer {
    cipher: Aes256Gcm,
}

impl AesGcmDataSealer {
    /// Create a sealer with a key derived from `secret`
    pub fn new(secret: &[u8]) -> Self {
        let key = blake3::derive_key(KEY_CONTEXT, secret);
        Self {
            cipher: Aes256Gcm::new((&key).into()),
        }
    }

    /// Sealer with a fresh random key; tokens do not survive a restart
    pub fn random() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(&secret)
    }

    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        nonce
    }
}

impl DataSealer for AesGcmDataSealer {
    fn wrap(&self, plaintext: &str, expiry_millis: i64) -> Result<String, SealerError> {
        let mut payload = Vec::with_capacity(8 + plaintext.len());
        payload.extend_from_slice(&expiry_millis.to_be_bytes());
        payload.extend_from_slice(plaintext.as_bytes());

        let nonce = Self::generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
            .map_err(|e| SealerError::Sealing(format!("AES encryption failed: {}", e)))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    fn unwrap(&self, sealed: &str) -> Result<String, SealerError> {
        let token = URL_SAFE_NO_PAD
            .decode(sealed.trim())
            .map_err(|e| SealerError::Sealing(format!("Invalid token encoding: {}", e)))?;
        if token.len() <= NONCE_LEN {
            return Err(SealerError::Sealing("Token is too short".to_string()));
        }

        let (nonce, ciphertext) = token.split_at(NONCE_LEN);
        let payload = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SealerError::Sealing(format!("AES decryption failed: {}", e)))?;
        if payload.len() < 8 {
            return Err(SealerError::Sealing("Payload is missing its expiry".to_string()));
        }

        let (expiry, plaintext) = payload.split_at(8);
        let mut expiry_bytes = [0u8; 8];
        expiry_bytes.copy_from_slice(expiry);
        if chrono::Utc::now().timestamp_millis() > i64::from_be_bytes(expiry_bytes) {
            return Err(SealerError::Expired);
        }

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| SealerError::Sealing(format!("Plaintext is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_one_minute() -> i64 {
        chrono::Utc::now().timestamp_millis() + 60_000
    }

    #[test]
    fn test_wrap_unwrap() {
        let sealer = AesGcmDataSealer::new(b"test secret");
        let sealed = sealer.wrap("idp!sp!jdoe", in_one_minute()).unwrap();

        assert!(!sealed.contains("jdoe"));
        assert_eq!(sealer.unwrap(&sealed).unwrap(), "idp!sp!jdoe");
    }

    #[test]
    fn test_tokens_are_randomized() {
        let sealer = AesGcmDataSealer::new(b"test secret");
        let expiry = in_one_minute();
        assert_ne!(sealer.wrap("x", expiry).unwrap(), sealer.wrap("x", expiry).unwrap());
    }

    #[test]
    fn test_expired_token() {
        let sealer = AesGcmDataSealer::new(b"test secret");
        let past = chrono::Utc::now().timestamp_millis() - 1;
        let sealed = sealer.wrap("idp!sp!jdoe", past).unwrap();

        assert_eq!(sealer.unwrap(&sealed), Err(SealerError::Expired));
    }

    #[test]
    fn test_wrong_key_and_tampering() {
        let sealer = AesGcmDataSealer::new(b"test secret");
        let other = AesGcmDataSealer::new(b"other secret");
        let sealed = sealer.wrap("idp!sp!jdoe", in_one_minute()).unwrap();

        assert!(matches!(other.unwrap(&sealed), Err(SealerError::Sealing(_))));
        assert!(matches!(sealer.unwrap("not a token"), Err(SealerError::Sealing(_))));
    }
}
