//! Error types for the core vault logic.

use lockbox_storage::StorageError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// HKDF key derivation failed.
    #[error("key derivation failed for context '{context}': {reason}")]
    KeyDerivation { context: String, reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// Stored ciphertext is not valid base64.
    #[error("ciphertext encoding invalid: {reason}")]
    Encoding { reason: String },
}

/// Errors from vault operations.
///
/// `NotFound` covers both "no such secret" and "secret exists but the
/// caller has no relationship with it" — callers with no grant entry
/// cannot distinguish the two, so existence never leaks. `Forbidden` is
/// reserved for callers with a grant entry that lacks the required flag.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The request payload failed validation.
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    /// The caller is known to this secret but lacks the required permission.
    #[error("permission denied")]
    Forbidden,

    /// The secret does not exist, or the caller has no relationship with it.
    #[error("not found")]
    NotFound,

    /// A share link is invalid: bad signature, expired, superseded, or the
    /// secret is gone. Deliberately uniform — the caller learns nothing
    /// about which.
    #[error("share link is invalid or has expired")]
    InvalidLink,

    /// A uniqueness constraint was violated.
    #[error("{0} already exists")]
    Conflict(String),

    /// A cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The storage layer failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl VaultError {
    /// Build a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}
