//! Secret routes — CRUD, listing, sharing, share links, and tags.
//!
//! Every route is kind-scoped: `{kind}` is one of `password`, `card`,
//! `note`, `file`, `identity`, `address`. Sensitive payload fields are
//! encrypted before storage and decrypted on read; responses carry
//! plaintext for callers the vault has authorized.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lockbox_core::audit::RequestOrigin;
use lockbox_core::vault::{IssuedLink, ListOptions};
use lockbox_storage::models::{
    GrantRecipient, Page, SecretKind, SecretRecord, StoredGrant, TagRecord,
};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating a secret.
#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
}

/// Request body for updating a secret (partial payload).
#[derive(Debug, Deserialize)]
pub struct UpdateSecretRequest {
    pub payload: serde_json::Value,
}

/// Request body for sharing a secret.
#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub recipients: Vec<GrantRecipient>,
}

/// Request body for tagging a secret.
#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

/// Query parameters for secret listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_filter() -> String {
    "all".to_owned()
}
fn default_sort() -> String {
    "created_at".to_owned()
}
fn default_order() -> String {
    "asc".to_owned()
}
const fn default_page() -> u32 {
    1
}
const fn default_limit() -> u32 {
    10
}

/// Response for secret listing.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub items: Vec<SecretRecord>,
    pub total_count: u64,
    pub total_pages: u64,
    pub page: u32,
    pub page_size: u32,
}

impl From<Page<SecretRecord>> for ListResponse {
    fn from(page: Page<SecretRecord>) -> Self {
        Self {
            total_pages: page.total_pages(),
            items: page.items,
            total_count: page.total_count,
            page: page.page,
            page_size: page.page_size,
        }
    }
}

/// Build the secrets router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/secrets/{kind}", post(create_secret).get(list_secrets))
        .route(
            "/secrets/{kind}/{id}",
            get(get_secret).patch(update_secret).delete(delete_secrets),
        )
        .route("/secrets/{kind}/{id}/share", post(share_secret))
        .route(
            "/secrets/{kind}/{id}/share/{user_id}",
            delete(unshare_secret),
        )
        .route("/secrets/{kind}/{id}/share-link", post(issue_share_link))
        .route("/secrets/{kind}/{id}/tags", post(add_tag).get(list_tags))
}

/// `POST /v1/secrets/{kind}` — create a secret.
async fn create_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path(kind): Path<SecretKind>,
    Json(body): Json<CreateSecretRequest>,
) -> Result<Json<SecretRecord>, ApiError> {
    let record = state
        .vault
        .create_secret(identity.user_id, kind, body.payload, body.folder_id, &origin)
        .await?;
    Ok(Json(record))
}

/// `GET /v1/secrets/{kind}` — list visible secrets.
async fn list_secrets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path(kind): Path<SecretKind>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let options = ListOptions {
        filter: params.filter.parse().map_err(ApiError::Vault)?,
        search: params.search,
        folder_id: params.folder_id,
        sort_field: params.sort,
        ascending: !params.order.eq_ignore_ascii_case("desc"),
        page: params.page,
        page_size: params.limit,
    };
    let page = state
        .vault
        .list_secrets(identity.user_id, kind, &options, &origin)
        .await?;
    Ok(Json(page.into()))
}

/// `GET /v1/secrets/{kind}/{id}` — fetch one secret, decrypted.
async fn get_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, id)): Path<(SecretKind, Uuid)>,
) -> Result<Json<SecretRecord>, ApiError> {
    let record = state
        .vault
        .get_secret(identity.user_id, kind, id, &origin)
        .await?;
    Ok(Json(record))
}

/// `PATCH /v1/secrets/{kind}/{id}` — apply a partial update.
async fn update_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, id)): Path<(SecretKind, Uuid)>,
    Json(body): Json<UpdateSecretRequest>,
) -> Result<Json<SecretRecord>, ApiError> {
    let record = state
        .vault
        .update_secret(identity.user_id, kind, id, body.payload, &origin)
        .await?;
    Ok(Json(record))
}

/// `DELETE /v1/secrets/{kind}/{id}` — delete one or more secrets.
///
/// The `{id}` segment accepts a comma-separated batch; each delete is
/// authorized independently, and the first failure stops the batch.
async fn delete_secrets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, ids)): Path<(SecretKind, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ids = super::favorites::parse_id_batch(&ids)?;
    for id in &ids {
        state
            .vault
            .delete_secret(identity.user_id, kind, *id, &origin)
            .await?;
    }
    Ok(Json(serde_json::json!({ "deleted": ids })))
}

/// `POST /v1/secrets/{kind}/{id}/share` — share with users (owner only).
async fn share_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, id)): Path<(SecretKind, Uuid)>,
    Json(body): Json<ShareRequest>,
) -> Result<Json<StoredGrant>, ApiError> {
    let grant = state
        .vault
        .share_secret(identity.user_id, kind, id, body.recipients, &origin)
        .await?;
    Ok(Json(grant))
}

/// `DELETE /v1/secrets/{kind}/{id}/share/{user_id}` — remove a recipient.
async fn unshare_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, id, user_id)): Path<(SecretKind, Uuid, Uuid)>,
) -> Result<Json<StoredGrant>, ApiError> {
    let grant = state
        .vault
        .unshare_secret(identity.user_id, kind, id, user_id, &origin)
        .await?;
    Ok(Json(grant))
}

/// `POST /v1/secrets/{kind}/{id}/share-link` — issue an anonymous link.
async fn issue_share_link(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, id)): Path<(SecretKind, Uuid)>,
) -> Result<Json<IssuedLink>, ApiError> {
    let link = state
        .vault
        .issue_share_link(identity.user_id, kind, id, &origin)
        .await?;
    Ok(Json(link))
}

/// `POST /v1/secrets/{kind}/{id}/tags` — attach a tag by name.
async fn add_tag(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((kind, id)): Path<(SecretKind, Uuid)>,
    Json(body): Json<TagRequest>,
) -> Result<Json<TagRecord>, ApiError> {
    let tag = state
        .vault
        .add_tag(identity.user_id, kind, id, &body.name, &origin)
        .await?;
    Ok(Json(tag))
}

/// `GET /v1/secrets/{kind}/{id}/tags` — tags attached to a secret.
async fn list_tags(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((kind, id)): Path<(SecretKind, Uuid)>,
) -> Result<Json<Vec<TagRecord>>, ApiError> {
    let tags = state.vault.secret_tags(identity.user_id, kind, id).await?;
    Ok(Json(tags))
}
