//! Favorite toggling.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use lockbox_core::audit::RequestOrigin;
use lockbox_storage::models::SecretKind;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// One toggle outcome.
#[derive(Debug, Serialize)]
pub struct ToggleResult {
    pub id: Uuid,
    pub favorite: bool,
}

/// Build the favorites router.
pub fn router() -> Router<AppState> {
    Router::new().route("/secrets/{kind}/{id}/favorite", post(toggle))
}

/// `POST /v1/secrets/{kind}/{id}/favorite` — flip membership of each id.
///
/// The `{id}` segment accepts a comma-separated batch; each id toggles
/// independently.
async fn toggle(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((_kind, ids)): Path<(SecretKind, String)>,
) -> Result<Json<Vec<ToggleResult>>, ApiError> {
    let ids = parse_id_batch(&ids)?;

    let results = state
        .vault
        .toggle_favorites(identity.user_id, &ids, &origin)
        .await?
        .into_iter()
        .map(|(id, favorite)| ToggleResult { id, favorite })
        .collect();
    Ok(Json(results))
}

/// Parse a comma-separated id path segment.
pub(crate) fn parse_id_batch(raw: &str) -> Result<Vec<Uuid>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Uuid>()
                .map_err(|_| ApiError::BadRequest(format!("invalid id: {s}")))
        })
        .collect()
}
