//! Audit log vocabulary and entry construction.
//!
//! Every mutation and every read of decrypted material produces an
//! entry. Entries are facts about the past: they are never updated, and
//! deleting a secret does not touch its audit trail. Value snapshots are
//! redacted before they get here — see
//! [`redact_payload`](crate::kind::redact_payload).

use chrono::Utc;
use lockbox_storage::models::AuditRecord;
use serde_json::Value;
use uuid::Uuid;

/// Actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    View,
    /// Collection-level listing; entity id is absent.
    Search,
    Share,
    Unshare,
    IssueLink,
    /// Anonymous share-link redemption.
    Access,
    ToggleFavorite,
    AddTag,
    Invite,
    AcceptInvite,
}

impl AuditAction {
    /// The wire name stored in the `action` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::View => "view",
            Self::Search => "search",
            Self::Share => "share",
            Self::Unshare => "unshare",
            Self::IssueLink => "issue_link",
            Self::Access => "access",
            Self::ToggleFavorite => "toggle_favorite",
            Self::AddTag => "add_tag",
            Self::Invite => "invite",
            Self::AcceptInvite => "accept_invite",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata captured into audit entries.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Build an audit entry. `actor` is `None` for anonymous actions.
#[must_use]
pub fn entry(
    actor: Option<Uuid>,
    action: AuditAction,
    entity: &str,
    entity_id: Option<Uuid>,
    old_value: Option<Value>,
    new_value: Option<Value>,
    origin: &RequestOrigin,
) -> AuditRecord {
    AuditRecord {
        id: Uuid::new_v4(),
        actor_id: actor,
        action: action.as_str().to_owned(),
        entity: entity.to_owned(),
        entity_id,
        old_value,
        new_value,
        ip_address: origin.ip_address.clone(),
        user_agent: origin.user_agent.clone(),
        created_at: Utc::now(),
    }
}
