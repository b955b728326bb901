//! Cryptographic primitives for Lockbox.
//!
//! Provides AES-256-GCM authenticated encryption, HKDF-SHA256 key
//! derivation, and zeroize-on-drop key newtypes. All key material is
//! automatically cleared from memory when dropped.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Ciphertext format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - Each secret encrypts under its own key, derived from the master key
//!   via HKDF-SHA256 with the secret's id as `info`. Compromise of one
//!   derived key exposes one secret.
//! - All key types derive `Zeroize` + `ZeroizeOnDrop`.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Minimum ciphertext length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_CIPHERTEXT_LEN: usize = 12 + 16;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// HKDF salt binding derived keys to this deployment's record layout.
const DERIVE_SALT: &[u8] = b"lockbox-secret-v1";

/// A 256-bit encryption key that is zeroized on drop.
///
/// Used as the master key and for per-secret derived keys. The inner
/// bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Parse a key from 64 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encoding`] if the input is not exactly
    /// 32 bytes of valid hex.
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        let raw = hex::decode(input.trim()).map_err(|e| CryptoError::Encoding {
            reason: e.to_string(),
        })?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| CryptoError::Encoding {
            reason: "master key must be 32 bytes".to_owned(),
        })?;
        Ok(Self(bytes))
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care — the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    // nonce || ciphertext (includes tag appended by aes-gcm)
    let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the input is shorter
/// than 28 bytes (nonce + tag minimum).
///
/// Returns [`CryptoError::Decryption`] if authentication fails (wrong
/// key, corrupted data, or tampered tag).
pub fn decrypt(key: &EncryptionKey, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: MIN_CIPHERTEXT_LEN,
            actual: combined.len(),
        });
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

/// Derive the per-secret encryption key from the master key.
///
/// Deterministic for a given (master key, secret id) pair, so no key
/// material is ever stored next to the ciphertext.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if HKDF expansion fails.
pub fn derive_secret_key(
    master: &EncryptionKey,
    secret_id: Uuid,
) -> Result<EncryptionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(DERIVE_SALT), master.as_bytes());
    let mut derived = [0u8; 32];
    hk.expand(secret_id.as_bytes(), &mut derived)
        .map_err(|e| CryptoError::KeyDerivation {
            context: secret_id.to_string(),
            reason: e.to_string(),
        })?;
    Ok(EncryptionKey::from_bytes(derived))
}

/// Encrypt a UTF-8 string field to base64 ciphertext.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt_field(key: &EncryptionKey, plaintext: &str) -> Result<String, CryptoError> {
    Ok(BASE64.encode(encrypt(key, plaintext.as_bytes())?))
}

/// Decrypt a base64 ciphertext back to the original string field.
///
/// # Errors
///
/// Returns [`CryptoError::Encoding`] if the input is not valid base64,
/// [`CryptoError::Decryption`] if authentication fails, or
/// [`CryptoError::Encoding`] again if the plaintext is not UTF-8.
pub fn decrypt_field(key: &EncryptionKey, encoded: &str) -> Result<String, CryptoError> {
    let combined = BASE64.decode(encoded).map_err(|e| CryptoError::Encoding {
        reason: e.to_string(),
    })?;
    let plaintext = decrypt(key, &combined)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Encoding {
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let plaintext = b"hunter2, but longer";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let ciphertext = encrypt(&key1, b"secret").unwrap();
        assert!(decrypt(&key2, &ciphertext).is_err());
    }

    #[test]
    fn decrypt_too_short_fails() {
        let key = EncryptionKey::generate();
        let result = decrypt(&key, &[0u8; 10]);
        assert!(matches!(
            result,
            Err(CryptoError::CiphertextTooShort {
                expected: 28,
                actual: 10
            })
        ));
    }

    #[test]
    fn decrypt_tampered_ciphertext_fails() {
        let key = EncryptionKey::generate();
        let mut ciphertext = encrypt(&key, b"secret").unwrap();
        // Flip a byte in the ciphertext portion (after the nonce).
        if let Some(byte) = ciphertext.get_mut(NONCE_LEN) {
            *byte ^= 0xFF;
        }
        assert!(matches!(
            decrypt(&key, &ciphertext),
            Err(CryptoError::Decryption { .. })
        ));
    }

    #[test]
    fn two_encryptions_produce_different_ciphertext() {
        let key = EncryptionKey::generate();
        let ct1 = encrypt(&key, b"same data").unwrap();
        let ct2 = encrypt(&key, b"same data").unwrap();
        // Different nonces → different ciphertext.
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn derived_key_is_deterministic_per_secret() {
        let master = EncryptionKey::generate();
        let id = Uuid::new_v4();
        let k1 = derive_secret_key(&master, id).unwrap();
        let k2 = derive_secret_key(&master, id).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_secrets_derive_different_keys() {
        let master = EncryptionKey::generate();
        let k1 = derive_secret_key(&master, Uuid::new_v4()).unwrap();
        let k2 = derive_secret_key(&master, Uuid::new_v4()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn field_roundtrip_through_base64() {
        let master = EncryptionKey::generate();
        let key = derive_secret_key(&master, Uuid::new_v4()).unwrap();
        let encoded = encrypt_field(&key, "correct horse battery staple").unwrap();
        assert_ne!(encoded, "correct horse battery staple");
        let decoded = decrypt_field(&key, &encoded).unwrap();
        assert_eq!(decoded, "correct horse battery staple");
    }

    #[test]
    fn decrypt_field_rejects_bad_base64() {
        let key = EncryptionKey::generate();
        assert!(matches!(
            decrypt_field(&key, "not-base64!!!"),
            Err(CryptoError::Encoding { .. })
        ));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(EncryptionKey::from_hex("deadbeef").is_err());
    }

    #[test]
    fn from_hex_roundtrip() {
        let key = EncryptionKey::generate();
        let encoded = hex::encode(key.as_bytes());
        let parsed = EncryptionKey::from_hex(&encoded).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn encryption_key_debug_redacts_bytes() {
        let key = EncryptionKey::generate();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
    }
}
