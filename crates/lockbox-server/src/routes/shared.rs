//! Public share-link redemption. The only unauthenticated API route.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use lockbox_core::audit::RequestOrigin;
use lockbox_core::vault::RedeemedField;
use lockbox_storage::models::SecretKind;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the public share-link router.
pub fn router() -> Router<AppState> {
    Router::new().route("/secrets/{kind}/{id}/share-link/{token}", get(redeem))
}

fn origin_from_headers(headers: &HeaderMap) -> RequestOrigin {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    };
    RequestOrigin {
        ip_address: header("x-forwarded-for")
            .map(|v| v.split(',').next().unwrap_or("").trim().to_owned())
            .filter(|v| !v.is_empty()),
        user_agent: header("user-agent"),
    }
}

/// `GET /v1/secrets/{kind}/{id}/share-link/{token}` — redeem a share link.
///
/// Reveals only the secret's primary sensitive field. Any failure —
/// forged token, superseded link, expiry, deleted secret — returns the
/// same 400 body.
async fn redeem(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id, token)): Path<(SecretKind, Uuid, String)>,
) -> Result<Json<RedeemedField>, ApiError> {
    let origin = origin_from_headers(&headers);
    let revealed = state
        .vault
        .redeem_share_link(kind, id, &token, &origin)
        .await?;
    Ok(Json(revealed))
}
