//! Organization routes — create, list, invite, accept.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use lockbox_core::audit::RequestOrigin;
use lockbox_storage::models::{OrgMemberRecord, OrgRecord};

use crate::auth::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for creating an organization.
#[derive(Debug, Deserialize)]
pub struct CreateOrgRequest {
    pub name: String,
}

/// Request body for inviting a member.
#[derive(Debug, Deserialize)]
pub struct InviteMemberRequest {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "member".to_owned()
}

/// Build the organizations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orgs", post(create_org).get(list_orgs))
        .route("/orgs/{org_id}/invitations", post(invite_member))
        .route("/orgs/{org_id}/members", get(list_members))
        .route(
            "/orgs/{org_id}/invitations/{invitation_id}/accept",
            post(accept_invitation),
        )
}

/// `POST /v1/orgs` — create an organization.
async fn create_org(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Json(body): Json<CreateOrgRequest>,
) -> Result<Json<OrgRecord>, ApiError> {
    let org = state
        .vault
        .create_org(identity.user_id, &body.name, &origin)
        .await?;
    Ok(Json(org))
}

/// `GET /v1/orgs` — organizations the caller owns or belongs to.
async fn list_orgs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<OrgRecord>>, ApiError> {
    let orgs = state.vault.list_orgs(identity.user_id).await?;
    Ok(Json(orgs))
}

/// `POST /v1/orgs/{org_id}/invitations` — invite a member (owner only).
async fn invite_member(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path(org_id): Path<Uuid>,
    Json(body): Json<InviteMemberRequest>,
) -> Result<Json<OrgMemberRecord>, ApiError> {
    let member = state
        .vault
        .invite_member(identity.user_id, org_id, &body.email, &body.role, &origin)
        .await?;
    Ok(Json(member))
}

/// `GET /v1/orgs/{org_id}/members` — members and pending invitations.
async fn list_members(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<OrgMemberRecord>>, ApiError> {
    let members = state.vault.list_members(identity.user_id, org_id).await?;
    Ok(Json(members))
}

/// `POST /v1/orgs/{org_id}/invitations/{invitation_id}/accept`
async fn accept_invitation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(origin): Extension<RequestOrigin>,
    Path((org_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<OrgMemberRecord>, ApiError> {
    let member = state
        .vault
        .accept_invitation(identity.user_id, org_id, invitation_id, &origin)
        .await?;
    Ok(Json(member))
}
