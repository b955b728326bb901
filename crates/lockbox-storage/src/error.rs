//! Storage error types.
//!
//! Every variant carries enough context to diagnose the problem without a
//! debugger. Reasons come from the backend driver; they never contain
//! secret payload data (payloads are ciphertext by the time they get here).

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to or initialize the backing store.
    #[error("failed to open store: {reason}")]
    Open { reason: String },

    /// Failed to read records of the given entity.
    #[error("failed to read {entity}: {reason}")]
    Read { entity: String, reason: String },

    /// Failed to write records of the given entity.
    #[error("failed to write {entity}: {reason}")]
    Write { entity: String, reason: String },

    /// Failed to delete records of the given entity.
    #[error("failed to delete {entity}: {reason}")]
    Delete { entity: String, reason: String },

    /// A uniqueness constraint was violated.
    #[error("{entity} already exists")]
    Conflict { entity: String },
}

impl StorageError {
    /// Build a read error for an entity.
    #[must_use]
    pub fn read(entity: &str, reason: impl std::fmt::Display) -> Self {
        Self::Read {
            entity: entity.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Build a write error for an entity.
    #[must_use]
    pub fn write(entity: &str, reason: impl std::fmt::Display) -> Self {
        Self::Write {
            entity: entity.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Build a delete error for an entity.
    #[must_use]
    pub fn delete(entity: &str, reason: impl std::fmt::Display) -> Self {
        Self::Delete {
            entity: entity.to_owned(),
            reason: reason.to_string(),
        }
    }
}
