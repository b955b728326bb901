//! Audit trail routes.
//!
//! The trail is strictly user-scoped: the actor filter is forced to the
//! caller, so no combination of query parameters reads another user's
//! history.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use lockbox_storage::models::AuditRecord;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Optional audit filters; all combine with AND.
#[derive(Debug, Deserialize)]
pub struct AuditParams {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Build the audit router.
pub fn router() -> Router<AppState> {
    Router::new().route("/audit", get(search))
}

/// `GET /v1/audit` — the caller's audit trail, newest first.
async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    let entries = state
        .vault
        .audit_log(
            identity.user_id,
            params.action,
            params.start,
            params.end,
            params.limit,
        )
        .await?;
    Ok(Json(entries))
}
