//! Bearer authentication — HS256 JWT verification.
//!
//! The frontend authenticates users elsewhere and sends a signed session
//! token as `Authorization: Bearer <jwt>`. The middleware verifies the
//! HMAC-SHA256 signature against the configured secret, checks expiry,
//! and injects an [`Identity`] into request extensions.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use lockbox_core::audit::RequestOrigin;

use crate::error::ApiError;
use crate::state::AppState;

/// Identity of the authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Claims carried in the session JWT.
#[derive(Debug, serde::Deserialize)]
struct Claims {
    /// Subject — the user id.
    sub: Uuid,
    #[serde(default)]
    email: Option<String>,
    /// Expiration timestamp (seconds since epoch).
    exp: u64,
}

/// Verify an HS256 JWT and extract the identity.
///
/// # Errors
///
/// Returns [`ApiError::Unauthorized`] if the token is malformed, the
/// signature does not verify, or the token is expired.
pub fn verify_session_token(secret: &[u8], token: &str) -> Result<Identity, ApiError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ApiError::Unauthorized("invalid JWT format".to_owned()));
    };

    // HMAC-SHA256 accepts any key length per RFC 2104, so new_from_slice
    // will never fail here.
    #[allow(clippy::unwrap_used)]
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let expected = mac.finalize().into_bytes();

    let presented = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| ApiError::Unauthorized("invalid JWT signature encoding".to_owned()))?;
    let valid: bool = presented.ct_eq(&expected).into();
    if !valid {
        return Err(ApiError::Unauthorized("JWT signature mismatch".to_owned()));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| ApiError::Unauthorized("invalid JWT payload encoding".to_owned()))?;
    let claims: Claims = serde_json::from_slice(&payload_bytes)
        .map_err(|e| ApiError::Unauthorized(format!("invalid JWT claims: {e}")))?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if claims.exp < now {
        return Err(ApiError::Unauthorized("JWT expired".to_owned()));
    }

    Ok(Identity {
        user_id: claims.sub,
        email: claims.email,
    })
}

/// Capture the request origin for audit entries.
#[must_use]
pub fn request_origin(req: &Request) -> RequestOrigin {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    };
    RequestOrigin {
        // First hop in x-forwarded-for is the client.
        ip_address: header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or("").trim().to_owned())
            .filter(|v| !v.is_empty()),
        user_agent: header("user-agent"),
    }
}

/// Axum middleware that authenticates API requests.
///
/// Injects [`Identity`] and [`RequestOrigin`] into request extensions.
///
/// # Errors
///
/// Returns 401 if the `Authorization` header is missing, malformed, or
/// carries an invalid token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_owned()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized("Authorization header must use Bearer scheme".to_owned())
    })?;

    let identity = verify_session_token(&state.auth_secret, token)?;
    let origin = request_origin(&req);
    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(origin);

    Ok(next.run(req).await)
}

/// Mint a token the way the session issuer does. Test support only.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn mint_session_token(secret: &[u8], sub: Uuid, exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&serde_json::json!({ "sub": sub, "exp": exp })).unwrap());
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).unwrap();
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{header}.{payload}.{signature}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-auth-secret";

    fn mint(secret: &[u8], sub: Uuid, exp: u64) -> String {
        mint_session_token(secret, sub, exp)
    }

    #[test]
    fn valid_token_verifies() {
        let user = Uuid::new_v4();
        let token = mint(SECRET, user, u64::MAX);
        let identity = verify_session_token(SECRET, &token).unwrap();
        assert_eq!(identity.user_id, user);
    }

    #[test]
    fn expired_token_fails() {
        let token = mint(SECRET, Uuid::new_v4(), 1);
        assert!(verify_session_token(SECRET, &token).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let token = mint(b"other-secret", Uuid::new_v4(), u64::MAX);
        assert!(verify_session_token(SECRET, &token).is_err());
    }

    #[test]
    fn tampered_payload_fails() {
        let token = mint(SECRET, Uuid::new_v4(), u64::MAX);
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&serde_json::json!({
                "sub": Uuid::new_v4(),
                "exp": u64::MAX,
            }))
            .unwrap(),
        );
        parts[1] = &forged;
        assert!(verify_session_token(SECRET, &parts.join(".")).is_err());
    }

    #[test]
    fn malformed_token_fails() {
        assert!(verify_session_token(SECRET, "just-a-string").is_err());
        assert!(verify_session_token(SECRET, "a.b.c.d").is_err());
    }
}
