//! Shared application state.

use lockbox_core::Vault;

/// State threaded through every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The vault service.
    pub vault: Vault,
    /// Secret that verifies bearer JWTs.
    pub auth_secret: std::sync::Arc<Vec<u8>>,
}
