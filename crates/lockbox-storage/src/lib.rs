//! Storage layer for Lockbox.
//!
//! This crate defines the [`VaultStore`] trait — the repository interface
//! for secrets, sharing grants, favorites, tags, folders, the audit log,
//! and organizations. It knows nothing about encryption or permission
//! semantics: payloads arrive with sensitive fields already encrypted, and
//! authorization decisions happen in `lockbox-core` before any call lands
//! here.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`] — in-memory, for tests and local development
//! - [`PostgresStore`] — JSONB-backed PostgreSQL (feature `postgres-backend`)
//!
//! Operations that must not lose updates under concurrent requests — the
//! grant upsert and the favorite toggle — are atomic at the store:
//! last-write-wins per recipient, keyed by arrival order at the store.

mod error;
mod memory;
pub mod models;
#[cfg(feature = "postgres-backend")]
mod postgres;

pub use error::StorageError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres-backend")]
pub use postgres::PostgresStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::{
    AuditFilter, AuditRecord, FolderRecord, GrantRecipient, ListQuery, ListScope, OrgMemberRecord,
    OrgRecord, Page, SecretKind, SecretRecord, StoredGrant, TagRecord,
};

/// The repository interface backing the vault.
///
/// Implementations must be safe to share across async tasks
/// (`Send + Sync`). All methods suspend the calling task while waiting on
/// the backing store — none block a worker thread.
#[async_trait::async_trait]
pub trait VaultStore: Send + Sync + 'static {
    // ── Secrets ──────────────────────────────────────────────────────

    /// Persist a new secret record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn insert_secret(&self, record: SecretRecord) -> Result<SecretRecord, StorageError>;

    /// Fetch a secret by kind and id. Returns `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn fetch_secret(
        &self,
        kind: SecretKind,
        id: Uuid,
    ) -> Result<Option<SecretRecord>, StorageError>;

    /// Replace a secret's payload, bumping `updated_at`.
    ///
    /// The whole payload is swapped in one write — partial application of
    /// an update is impossible at this layer. Returns `Ok(None)` if the
    /// secret does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn update_secret_payload(
        &self,
        kind: SecretKind,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Option<SecretRecord>, StorageError>;

    /// Delete a secret, returning the removed record.
    ///
    /// Grants and audit entries referencing the secret are NOT cascaded —
    /// they remain valid historical facts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the backend fails.
    async fn delete_secret(
        &self,
        kind: SecretKind,
        id: Uuid,
    ) -> Result<Option<SecretRecord>, StorageError>;

    /// List secrets of one kind within a scope, with search, sort, and
    /// 1-indexed pagination.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_secrets(
        &self,
        kind: SecretKind,
        scope: &ListScope,
        query: &ListQuery,
    ) -> Result<Page<SecretRecord>, StorageError>;

    /// Set (or overwrite) the share-link token and expiry on a secret.
    ///
    /// Returns `false` if the secret does not exist. The write is a single
    /// atomic record update — a timed-out request cannot leave a token
    /// without its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn set_share_link(
        &self,
        kind: SecretKind,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Attach a tag to a secret with set semantics.
    ///
    /// Returns `Ok(None)` if the secret does not exist, `Ok(Some(false))`
    /// if the tag was already attached, `Ok(Some(true))` if it was added.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn attach_tag(
        &self,
        kind: SecretKind,
        id: Uuid,
        tag_id: Uuid,
    ) -> Result<Option<bool>, StorageError>;

    // ── Sharing grants ───────────────────────────────────────────────

    /// Merge recipients into the grant for a secret, creating the grant if
    /// absent.
    ///
    /// Per-recipient semantics: an existing recipient's permission triple
    /// is overwritten; new recipients are appended. The merge is atomic
    /// per recipient (last write wins at the store under concurrency).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn upsert_grant(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
        owner_id: Uuid,
        recipients: &[GrantRecipient],
    ) -> Result<StoredGrant, StorageError>;

    /// Remove one recipient from a grant entirely.
    ///
    /// Returns the grant after removal, or `Ok(None)` if no grant exists
    /// for the secret. An empty recipient list is a valid terminal state;
    /// the grant row is never auto-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn remove_grant_recipient(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<StoredGrant>, StorageError>;

    /// Fetch the grant for a secret, if one has ever been created.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn fetch_grant(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
    ) -> Result<Option<StoredGrant>, StorageError>;

    /// All grants of one kind that name a user as recipient.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn grants_for_recipient(
        &self,
        kind: SecretKind,
        recipient_id: Uuid,
    ) -> Result<Vec<StoredGrant>, StorageError>;

    // ── Favorites ────────────────────────────────────────────────────

    /// Toggle each id in a user's favorite set independently.
    ///
    /// Returns `(id, now_member)` pairs. Each toggle is atomic at the
    /// store, so concurrent toggles from the same user cannot lose
    /// updates.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn toggle_favorites(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<(Uuid, bool)>, StorageError>;

    /// The user's current favorite set. No ordering guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn fetch_favorites(&self, user_id: Uuid) -> Result<Vec<Uuid>, StorageError>;

    // ── Tags ─────────────────────────────────────────────────────────

    /// Find a tag by name, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn find_or_create_tag(&self, name: &str) -> Result<TagRecord, StorageError>;

    /// Resolve tag records for a set of ids. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_tags(&self, ids: &[Uuid]) -> Result<Vec<TagRecord>, StorageError>;

    // ── Folders ──────────────────────────────────────────────────────

    /// Persist a new folder.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn insert_folder(&self, record: FolderRecord) -> Result<FolderRecord, StorageError>;

    /// List folders owned by a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_folders(&self, owner_id: Uuid) -> Result<Vec<FolderRecord>, StorageError>;

    // ── Audit log ────────────────────────────────────────────────────

    /// Append an audit entry. Entries are immutable once written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn append_audit(&self, record: AuditRecord) -> Result<(), StorageError>;

    /// Search audit entries, newest first. Every filter is optional and
    /// combines with AND semantics.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn search_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StorageError>;

    // ── Organizations ────────────────────────────────────────────────

    /// Persist a new organization.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn insert_org(&self, record: OrgRecord) -> Result<OrgRecord, StorageError>;

    /// Fetch an organization by id.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn fetch_org(&self, id: Uuid) -> Result<Option<OrgRecord>, StorageError>;

    /// Organizations a user owns or is an accepted member of.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_orgs_for_user(&self, user_id: Uuid) -> Result<Vec<OrgRecord>, StorageError>;

    /// Persist a member row (pending invitation or accepted member).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn insert_member(
        &self,
        record: OrgMemberRecord,
    ) -> Result<OrgMemberRecord, StorageError>;

    /// Accept a pending invitation, binding it to the accepting user.
    ///
    /// Returns `Ok(None)` if the invitation does not exist or was already
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn accept_invitation(
        &self,
        org_id: Uuid,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgMemberRecord>, StorageError>;

    /// List members (including pending invitations) of an organization.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the backend fails.
    async fn list_members(&self, org_id: Uuid) -> Result<Vec<OrgMemberRecord>, StorageError>;
}
