//! Folder routes.

use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use lockbox_storage::models::FolderRecord;

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating a folder.
#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

/// Build the folders router.
pub fn router() -> Router<AppState> {
    Router::new().route("/folders", post(create_folder).get(list_folders))
}

/// `POST /v1/folders` — create a folder.
async fn create_folder(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateFolderRequest>,
) -> Result<Json<FolderRecord>, ApiError> {
    let folder = state
        .vault
        .create_folder(identity.user_id, &body.name)
        .await?;
    Ok(Json(folder))
}

/// `GET /v1/folders` — the caller's folders.
async fn list_folders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<FolderRecord>>, ApiError> {
    let folders = state.vault.list_folders(identity.user_id).await?;
    Ok(Json(folders))
}
