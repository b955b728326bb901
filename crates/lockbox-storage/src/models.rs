//! Record types persisted by the [`VaultStore`](crate::VaultStore).
//!
//! Secret payloads are JSON documents — plaintext fields plus sensitive
//! fields that the core crate replaces with ciphertext before any record
//! reaches this layer. Nothing in this crate encrypts or decrypts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Secrets ──────────────────────────────────────────────────────────

/// The kind of a secret entity.
///
/// Each kind carries its own payload shape; the core crate holds the
/// per-kind field descriptors. The storage layer treats kinds as opaque
/// partitioning tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres-backend",
    sqlx(type_name = "text", rename_all = "lowercase")
)]
pub enum SecretKind {
    Password,
    Card,
    Note,
    File,
    Identity,
    Address,
}

impl SecretKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::Password,
        Self::Card,
        Self::Note,
        Self::File,
        Self::Identity,
        Self::Address,
    ];

    /// The lowercase wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Card => "card",
            Self::Note => "note",
            Self::File => "file",
            Self::Identity => "identity",
            Self::Address => "address",
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecretKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "card" => Ok(Self::Card),
            "note" => Ok(Self::Note),
            "file" => Ok(Self::File),
            "identity" => Ok(Self::Identity),
            "address" => Ok(Self::Address),
            other => Err(format!("unknown secret kind: {other}")),
        }
    }
}

/// A stored secret entity.
///
/// `payload` is the JSON document for the secret; sensitive fields inside
/// it are ciphertext (base64) by the time the record is persisted. The
/// share-link state lives directly on the record — one active link per
/// secret, overwritten on reissue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct SecretRecord {
    pub id: Uuid,
    pub kind: SecretKind,
    pub owner_id: Uuid,
    pub payload: serde_json::Value,
    pub folder_id: Option<Uuid>,
    pub tags: Vec<Uuid>,
    #[serde(skip_serializing)]
    pub share_token: Option<String>,
    #[serde(skip_serializing)]
    pub share_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Sharing ──────────────────────────────────────────────────────────

/// Independent permission flags on a shared secret.
///
/// These are not a hierarchy: `edit` does not imply `view`. Every
/// operation checks exactly the flag it requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub view: bool,
    #[serde(default)]
    pub edit: bool,
    #[serde(default)]
    pub delete: bool,
}

impl PermissionSet {
    /// A triple with all flags cleared — sharing with this is the
    /// "revoked but still listed" terminal state.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            view: false,
            edit: false,
            delete: false,
        }
    }

    /// Read-only access.
    #[must_use]
    pub const fn view_only() -> Self {
        Self {
            view: true,
            edit: false,
            delete: false,
        }
    }
}

/// One recipient entry in a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecipient {
    pub user_id: Uuid,
    pub permissions: PermissionSet,
}

/// The sharing grant for one secret.
///
/// At most one grant exists per (kind, secret id); recipients are unique
/// within it. An empty recipient list is valid and means "not currently
/// shared with anyone".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGrant {
    pub kind: SecretKind,
    pub secret_id: Uuid,
    pub owner_id: Uuid,
    pub recipients: Vec<GrantRecipient>,
}

impl StoredGrant {
    /// Look up the permission triple last written for a user, if any.
    #[must_use]
    pub fn permissions_for(&self, user_id: Uuid) -> Option<PermissionSet> {
        self.recipients
            .iter()
            .find(|r| r.user_id == user_id)
            .map(|r| r.permissions)
    }
}

// ── Tags & folders ───────────────────────────────────────────────────

/// A tag, unique by name, attachable to any secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct TagRecord {
    pub id: Uuid,
    pub name: String,
}

/// A folder owned by a user; secrets may reference one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct FolderRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ── Audit ────────────────────────────────────────────────────────────

/// An append-only audit log entry.
///
/// Never updated or deleted by application logic. `actor_id` is `None`
/// for anonymous actions (share-link redemption). Snapshots hold redacted
/// JSON — sensitive fields are stripped before they reach storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<Uuid>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional, independently combinable audit filters (AND semantics).
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

// ── Organizations ────────────────────────────────────────────────────

/// An organization (tenant grouping for users).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct OrgRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// An organization member. A row with `accepted_at = None` is a pending
/// invitation; `user_id` is filled in on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-backend", derive(sqlx::FromRow))]
pub struct OrgMemberRecord {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub invited_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

// ── Listing ──────────────────────────────────────────────────────────

/// Which secrets a listing may touch.
///
/// A record is in scope when `(owner matches OR id ∈ shared_ids)` and,
/// if `restrict_ids` is set, its id is also in that set. The core crate
/// builds scopes from ownership plus view-granting shares, so the store
/// never has to understand permissions.
#[derive(Debug, Clone, Default)]
pub struct ListScope {
    pub owner_id: Option<Uuid>,
    pub shared_ids: Vec<Uuid>,
    pub restrict_ids: Option<Vec<Uuid>>,
}

/// Search, sort, and pagination parameters for secret listings.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// Case-insensitive substring search over `search_fields`.
    pub search: Option<String>,
    /// Payload fields the search applies to (kind-specific, supplied by
    /// the core crate's descriptors).
    pub search_fields: Vec<String>,
    pub folder_id: Option<Uuid>,
    /// Payload field to sort by, or `created_at` / `updated_at`.
    pub sort_field: String,
    pub ascending: bool,
    /// 1-indexed page number.
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            search_fields: Vec::new(),
            folder_id: None,
            sort_field: "created_at".to_owned(),
            ascending: true,
            page: 1,
            page_size: 10,
        }
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Number of pages needed to cover `total_count`.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }
}
