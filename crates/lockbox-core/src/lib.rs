//! Core library for Lockbox.
//!
//! Everything the HTTP layer needs to run a multi-user secrets vault:
//!
//! - [`crypto`] — AES-256-GCM encryption at rest with per-secret HKDF
//!   keys, zeroize-on-drop key newtypes
//! - [`kind`] — per-kind payload descriptors and strict validation
//! - [`sharing`] — independent view/edit/delete permission triples
//! - [`share_link`] — time-boxed HMAC-signed anonymous links
//! - [`audit`] — append-only audit vocabulary
//! - [`vault`] — the [`Vault`](vault::Vault) service wiring it all onto
//!   a [`VaultStore`](lockbox_storage::VaultStore)

pub mod audit;
pub mod crypto;
mod error;
pub mod kind;
pub mod notify;
pub mod share_link;
pub mod sharing;
pub mod vault;

pub use error::{CryptoError, VaultError};
pub use vault::Vault;
