//! Server configuration for Lockbox.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `LOCKBOX_*` environment variables.

use std::net::SocketAddr;

use lockbox_core::crypto::EncryptionKey;

/// Server configuration.
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Master key all per-secret keys derive from.
    pub master_key: EncryptionKey,
    /// Whether the master key was generated this boot (nothing encrypted
    /// before this boot will decrypt).
    pub master_key_ephemeral: bool,
    /// Key that signs share-link tokens.
    pub link_signing_key: Vec<u8>,
    /// Base URL used when formatting share-link URLs.
    pub link_base_url: String,
    /// Secret that verifies `Authorization: Bearer` JWTs.
    pub auth_secret: Vec<u8>,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` — port to bind on (binds to `0.0.0.0`)
    /// - `LOCKBOX_BIND_ADDR` — full bind address (overrides `PORT`, default: `127.0.0.1:8200`)
    /// - `LOCKBOX_STORAGE` — `memory` or `postgres` (default: `memory`)
    /// - `DATABASE_URL` — PostgreSQL connection string (required when `LOCKBOX_STORAGE=postgres`)
    /// - `LOCKBOX_LOG_LEVEL` — log filter (default: `info`)
    /// - `LOCKBOX_MASTER_KEY` — 64 hex chars; generated (ephemeral!) if unset
    /// - `LOCKBOX_LINK_SIGNING_KEY` — share-link HMAC key; derived from the master key if unset
    /// - `LOCKBOX_LINK_BASE_URL` — base for share-link URLs (default: `http://localhost:8200`)
    /// - `LOCKBOX_AUTH_SECRET` — HS256 secret for bearer JWTs; derived from the master key if unset
    ///
    /// # Errors
    ///
    /// Returns an error if `LOCKBOX_MASTER_KEY` is set but not 64 hex
    /// chars, or `LOCKBOX_STORAGE=postgres` without `DATABASE_URL`.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = if let Ok(addr) = std::env::var("LOCKBOX_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8200)))
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(8200);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], 8200))
        };

        let storage_backend = match std::env::var("LOCKBOX_STORAGE")
            .unwrap_or_else(|_| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => {
                let url = std::env::var("DATABASE_URL").map_err(|_| {
                    anyhow::anyhow!("LOCKBOX_STORAGE=postgres requires DATABASE_URL")
                })?;
                StorageBackendType::Postgres { url }
            }
            _ => StorageBackendType::Memory,
        };

        let log_level = std::env::var("LOCKBOX_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        let (master_key, master_key_ephemeral) = match std::env::var("LOCKBOX_MASTER_KEY") {
            Ok(encoded) => (
                EncryptionKey::from_hex(&encoded)
                    .map_err(|e| anyhow::anyhow!("LOCKBOX_MASTER_KEY: {e}"))?,
                false,
            ),
            Err(_) => (EncryptionKey::generate(), true),
        };

        let link_signing_key = std::env::var("LOCKBOX_LINK_SIGNING_KEY")
            .map(String::into_bytes)
            .unwrap_or_else(|_| derive_subkey(&master_key, b"lockbox-link-signing"));

        let link_base_url = std::env::var("LOCKBOX_LINK_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8200".to_owned());

        let auth_secret = std::env::var("LOCKBOX_AUTH_SECRET")
            .map(String::into_bytes)
            .unwrap_or_else(|_| derive_subkey(&master_key, b"lockbox-auth"));

        Ok(Self {
            bind_addr,
            storage_backend,
            log_level,
            master_key,
            master_key_ephemeral,
            link_signing_key,
            link_base_url,
            auth_secret,
        })
    }
}

impl StorageBackendType {
    /// Loggable name — never includes connection strings.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

/// Derive a 32-byte subkey from the master key for an unrelated concern,
/// so unset optional keys never fall back to a shared value.
fn derive_subkey(master: &EncryptionKey, info: &[u8]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    // HMAC-SHA256 accepts any key length per RFC 2104, so new_from_slice
    // will never fail here.
    #[allow(clippy::unwrap_used)]
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(master.as_bytes()).unwrap();
    mac.update(info);
    mac.finalize().into_bytes().to_vec()
}
