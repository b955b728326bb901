//! The vault service.
//!
//! [`Vault`] owns the master key and the link signing key, and wires the
//! kind descriptors, sharing semantics, and audit vocabulary onto a
//! [`VaultStore`]. All authorization decisions happen here; the store
//! below only persists.
//!
//! # Visibility
//!
//! A caller with no relationship to a secret gets `NotFound` — never
//! `Forbidden` — so probing cannot confirm that a secret exists. Only a
//! grant recipient whose triple lacks the required flag sees `Forbidden`.
//!
//! # Audit
//!
//! Audit writes are fire-and-forget on a background task: a slow or
//! failing audit write never delays or fails the request that caused it.
//! Failures are logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lockbox_storage::models::{
    AuditFilter, AuditRecord, FolderRecord, GrantRecipient, ListQuery, ListScope, OrgMemberRecord,
    OrgRecord, Page, SecretKind, SecretRecord, StoredGrant, TagRecord,
};
use lockbox_storage::VaultStore;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{self, AuditAction, RequestOrigin};
use crate::crypto::{self, EncryptionKey};
use crate::error::VaultError;
use crate::kind;
use crate::notify::Notifier;
use crate::share_link;
use crate::sharing::{self, Access, Capability};

/// Which slice of the visible universe a listing covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFilter {
    /// Everything the caller owns plus everything shared to them with view.
    #[default]
    All,
    /// The visible universe restricted to the caller's favorites.
    Favourites,
    /// Only secrets shared to the caller with view.
    SharedWithMe,
    /// Only secrets the caller owns.
    CreatedByMe,
}

impl std::str::FromStr for ListFilter {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "favourite" => Ok(Self::Favourites),
            "shared_with_me" => Ok(Self::SharedWithMe),
            "created_by_me" => Ok(Self::CreatedByMe),
            other => Err(VaultError::validation(format!("unknown filter: {other}"))),
        }
    }
}

/// Search, sort, pagination, and filter parameters for listings.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub filter: ListFilter,
    pub search: Option<String>,
    pub folder_id: Option<Uuid>,
    pub sort_field: String,
    pub ascending: bool,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: ListFilter::All,
            search: None,
            folder_id: None,
            sort_field: "created_at".to_owned(),
            ascending: true,
            page: 1,
            page_size: 10,
        }
    }
}

/// A freshly issued share link.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IssuedLink {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What an anonymous redemption reveals: the one primary sensitive field
/// of the secret, nothing else.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RedeemedField {
    pub field: &'static str,
    pub value: String,
}

/// The vault service. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Vault {
    store: Arc<dyn VaultStore>,
    master: EncryptionKey,
    link_signing_key: Arc<Vec<u8>>,
    link_base_url: String,
    notifier: Arc<dyn Notifier>,
}

impl Vault {
    /// Assemble a vault over a store.
    #[must_use]
    pub fn new(
        store: Arc<dyn VaultStore>,
        master: EncryptionKey,
        link_signing_key: Vec<u8>,
        link_base_url: String,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            master,
            link_signing_key: Arc::new(link_signing_key),
            link_base_url,
            notifier,
        }
    }

    /// Queue an audit entry on a background task.
    fn record(&self, entry: AuditRecord) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.append_audit(entry).await {
                warn!(error = %e, "audit write failed");
            }
        });
    }

    fn decrypt_record(&self, mut record: SecretRecord) -> Result<SecretRecord, VaultError> {
        let key = crypto::derive_secret_key(&self.master, record.id)?;
        record.payload = kind::decrypt_payload(record.kind, &key, &record.payload)?;
        Ok(record)
    }

    /// Fetch a record or map absence to `NotFound`.
    async fn fetch_or_404(
        &self,
        secret_kind: SecretKind,
        id: Uuid,
    ) -> Result<SecretRecord, VaultError> {
        self.store
            .fetch_secret(secret_kind, id)
            .await?
            .ok_or(VaultError::NotFound)
    }

    /// Check the caller's capability on a record, mapping `Unrelated` to
    /// `NotFound` so existence never leaks.
    async fn authorize(
        &self,
        record: &SecretRecord,
        actor: Uuid,
        capability: Capability,
    ) -> Result<(), VaultError> {
        let grant = self.store.fetch_grant(record.kind, record.id).await?;
        match sharing::resolve(record.owner_id, grant.as_ref(), actor, capability) {
            Access::Owner | Access::Granted => Ok(()),
            Access::Denied => Err(VaultError::Forbidden),
            Access::Unrelated => Err(VaultError::NotFound),
        }
    }

    /// Like [`authorize`](Self::authorize) but for owner-only operations
    /// (sharing and link issuance). Recipients see `Forbidden`, strangers
    /// see `NotFound`.
    async fn authorize_owner(
        &self,
        record: &SecretRecord,
        actor: Uuid,
    ) -> Result<(), VaultError> {
        if record.owner_id == actor {
            return Ok(());
        }
        let grant = self.store.fetch_grant(record.kind, record.id).await?;
        match grant.and_then(|g| g.permissions_for(actor)) {
            Some(_) => Err(VaultError::Forbidden),
            None => Err(VaultError::NotFound),
        }
    }

    // ── Secrets ──────────────────────────────────────────────────────

    /// Create a secret. Sensitive fields are encrypted before the record
    /// is persisted; the returned record carries plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a malformed payload, or
    /// crypto/storage errors.
    pub async fn create_secret(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        payload: Value,
        folder_id: Option<Uuid>,
        origin: &RequestOrigin,
    ) -> Result<SecretRecord, VaultError> {
        kind::validate_create(secret_kind, &payload)?;

        let id = Uuid::new_v4();
        let key = crypto::derive_secret_key(&self.master, id)?;
        let stored_payload = kind::encrypt_payload(secret_kind, &key, &payload)?;
        let now = Utc::now();

        let record = self
            .store
            .insert_secret(SecretRecord {
                id,
                kind: secret_kind,
                owner_id: actor,
                payload: stored_payload,
                folder_id,
                tags: Vec::new(),
                share_token: None,
                share_expires_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Create,
            secret_kind.as_str(),
            Some(id),
            None,
            Some(kind::redact_payload(secret_kind, &record.payload)),
            origin,
        ));

        let mut created = record;
        created.payload = payload;
        Ok(created)
    }

    /// Fetch and decrypt a secret the caller may view.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] for absent or unrelated secrets,
    /// [`VaultError::Forbidden`] for recipients without `view`.
    pub async fn get_secret(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<SecretRecord, VaultError> {
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize(&record, actor, Capability::View).await?;
        let decrypted = self.decrypt_record(record)?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::View,
            secret_kind.as_str(),
            Some(id),
            None,
            None,
            origin,
        ));
        Ok(decrypted)
    }

    /// Apply a partial update to a secret the caller may edit.
    ///
    /// The patch is merged over the decrypted payload and the whole
    /// document is swapped in one write, so concurrent updates interleave
    /// at document granularity — never field by field.
    ///
    /// # Errors
    ///
    /// Validation, authorization, crypto, and storage errors as for the
    /// other secret operations.
    pub async fn update_secret(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        patch: Value,
        origin: &RequestOrigin,
    ) -> Result<SecretRecord, VaultError> {
        kind::validate_update(secret_kind, &patch)?;

        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize(&record, actor, Capability::Edit).await?;

        let old_snapshot = kind::redact_payload(secret_kind, &record.payload);
        let key = crypto::derive_secret_key(&self.master, id)?;
        let mut merged = kind::decrypt_payload(secret_kind, &key, &record.payload)?;
        if let (Some(target), Some(fields)) = (merged.as_object_mut(), patch.as_object()) {
            for (name, value) in fields {
                target.insert(name.clone(), value.clone());
            }
        }
        kind::validate_create(secret_kind, &merged)?;

        let stored_payload = kind::encrypt_payload(secret_kind, &key, &merged)?;
        let updated = self
            .store
            .update_secret_payload(secret_kind, id, stored_payload)
            .await?
            .ok_or(VaultError::NotFound)?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Update,
            secret_kind.as_str(),
            Some(id),
            Some(old_snapshot),
            Some(kind::redact_payload(secret_kind, &updated.payload)),
            origin,
        ));

        let mut result = updated;
        result.payload = merged;
        Ok(result)
    }

    /// Delete a secret the caller may delete.
    ///
    /// Grants and audit entries referencing the secret are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] / [`VaultError::Forbidden`] per
    /// the visibility rules.
    pub async fn delete_secret(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<(), VaultError> {
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize(&record, actor, Capability::Delete).await?;

        let removed = self
            .store
            .delete_secret(secret_kind, id)
            .await?
            .ok_or(VaultError::NotFound)?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Delete,
            secret_kind.as_str(),
            Some(id),
            Some(kind::redact_payload(secret_kind, &removed.payload)),
            None,
            origin,
        ));
        Ok(())
    }

    /// List secrets of one kind visible to the caller.
    ///
    /// Sensitive fields stay encrypted in listings; reading a plaintext
    /// value takes a single-item [`get_secret`](Self::get_secret), which
    /// is where the `view` audit entry is written.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a bad sort field, plus
    /// storage errors.
    pub async fn list_secrets(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        options: &ListOptions,
        origin: &RequestOrigin,
    ) -> Result<Page<SecretRecord>, VaultError> {
        let shared_ids = if matches!(options.filter, ListFilter::CreatedByMe) {
            Vec::new()
        } else {
            self.store
                .grants_for_recipient(secret_kind, actor)
                .await?
                .into_iter()
                .filter(|g| {
                    g.permissions_for(actor)
                        .is_some_and(|p| sharing::allows(p, Capability::View))
                })
                .map(|g| g.secret_id)
                .collect()
        };

        let scope = match options.filter {
            ListFilter::All => ListScope {
                owner_id: Some(actor),
                shared_ids,
                restrict_ids: None,
            },
            ListFilter::Favourites => ListScope {
                owner_id: Some(actor),
                shared_ids,
                restrict_ids: Some(self.store.fetch_favorites(actor).await?),
            },
            ListFilter::SharedWithMe => ListScope {
                owner_id: None,
                shared_ids,
                restrict_ids: None,
            },
            ListFilter::CreatedByMe => ListScope {
                owner_id: Some(actor),
                shared_ids: Vec::new(),
                restrict_ids: None,
            },
        };

        let descriptor = kind::spec(secret_kind);
        let sort_field = options.sort_field.as_str();
        let sortable = matches!(sort_field, "created_at" | "createdAt" | "updated_at" | "updatedAt")
            || descriptor.allowed.contains(&sort_field);
        if !sortable {
            return Err(VaultError::validation(format!(
                "cannot sort by '{sort_field}'"
            )));
        }
        if descriptor.sensitive.contains(&sort_field) {
            // Sorting ciphertext would order by nonce, not by value.
            return Err(VaultError::validation(format!(
                "cannot sort by '{sort_field}'"
            )));
        }

        let query = ListQuery {
            search: options.search.clone(),
            search_fields: descriptor
                .searchable
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            folder_id: options.folder_id,
            sort_field: sort_field.to_owned(),
            ascending: options.ascending,
            page: options.page.max(1),
            page_size: options.page_size.clamp(1, 100),
        };

        let page = self.store.list_secrets(secret_kind, &scope, &query).await?;

        // Collection-level entry, so no entity id.
        self.record(audit::entry(
            Some(actor),
            AuditAction::Search,
            secret_kind.as_str(),
            None,
            None,
            None,
            origin,
        ));

        Ok(page)
    }

    // ── Sharing ──────────────────────────────────────────────────────

    /// Share a secret with one or more users. Owner only.
    ///
    /// Recipients already on the grant get their triple overwritten; new
    /// recipients are appended. Sharing with an empty or all-false triple
    /// is legal and leaves the recipient listed with no access.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for an empty recipient list or
    /// a self-share, [`VaultError::Forbidden`] for non-owner recipients,
    /// [`VaultError::NotFound`] otherwise.
    pub async fn share_secret(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        recipients: Vec<GrantRecipient>,
        origin: &RequestOrigin,
    ) -> Result<StoredGrant, VaultError> {
        if recipients.is_empty() {
            return Err(VaultError::validation("no recipients given"));
        }
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize_owner(&record, actor).await?;
        if recipients.iter().any(|r| r.user_id == record.owner_id) {
            return Err(VaultError::validation("cannot share a secret with its owner"));
        }

        let grant = self
            .store
            .upsert_grant(secret_kind, id, record.owner_id, &recipients)
            .await?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Share,
            secret_kind.as_str(),
            Some(id),
            None,
            serde_json::to_value(&recipients).ok(),
            origin,
        ));
        Ok(grant)
    }

    /// Remove a recipient from a secret's grant entirely. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the secret or grant is absent.
    pub async fn unshare_secret(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        recipient: Uuid,
        origin: &RequestOrigin,
    ) -> Result<StoredGrant, VaultError> {
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize_owner(&record, actor).await?;

        let grant = self
            .store
            .remove_grant_recipient(secret_kind, id, recipient)
            .await?
            .ok_or(VaultError::NotFound)?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Unshare,
            secret_kind.as_str(),
            Some(id),
            None,
            Some(serde_json::json!({ "removed": recipient })),
            origin,
        ));
        Ok(grant)
    }

    // ── Share links ──────────────────────────────────────────────────

    /// Issue a time-boxed anonymous link for a secret. Owner only.
    ///
    /// At most one link is live per secret: issuing overwrites any
    /// previous token, invalidating it immediately.
    ///
    /// # Errors
    ///
    /// Visibility errors as for sharing, plus storage errors.
    pub async fn issue_share_link(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<IssuedLink, VaultError> {
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize_owner(&record, actor).await?;

        let token = share_link::mint_token(&self.link_signing_key, secret_kind, id);
        let expires_at = Utc::now() + share_link::link_ttl();
        if !self
            .store
            .set_share_link(secret_kind, id, &token, expires_at)
            .await?
        {
            return Err(VaultError::NotFound);
        }

        self.record(audit::entry(
            Some(actor),
            AuditAction::IssueLink,
            secret_kind.as_str(),
            Some(id),
            None,
            Some(serde_json::json!({ "expires_at": expires_at })),
            origin,
        ));

        Ok(IssuedLink {
            url: format!(
                "{}/v1/secrets/{}/{id}/share-link/{token}",
                self.link_base_url.trim_end_matches('/'),
                secret_kind.as_str(),
            ),
            token,
            expires_at,
        })
    }

    /// Redeem a share link anonymously, revealing the secret's primary
    /// sensitive field. Redemption does not consume the link; it stays
    /// valid until expiry or reissue.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidLink`] for every failure mode — bad
    /// signature, superseded token, expiry, missing secret. The cause is
    /// logged at debug level only.
    pub async fn redeem_share_link(
        &self,
        secret_kind: SecretKind,
        id: Uuid,
        token: &str,
        origin: &RequestOrigin,
    ) -> Result<RedeemedField, VaultError> {
        let Some(record) = self.store.fetch_secret(secret_kind, id).await? else {
            debug!(%id, "link redemption for missing secret");
            return Err(VaultError::InvalidLink);
        };
        let (Some(stored), Some(expires_at)) = (&record.share_token, record.share_expires_at)
        else {
            debug!(%id, "link redemption but no live link");
            return Err(VaultError::InvalidLink);
        };
        if !share_link::verify_token(
            &self.link_signing_key,
            secret_kind,
            id,
            token,
            stored,
            expires_at,
            Utc::now(),
        ) {
            debug!(%id, "link token failed verification");
            return Err(VaultError::InvalidLink);
        }

        let field = kind::spec(secret_kind).primary_sensitive;
        let key = crypto::derive_secret_key(&self.master, id)?;
        let ciphertext = record
            .payload
            .get(field)
            .and_then(Value::as_str)
            .ok_or(VaultError::InvalidLink)?;
        let value = crypto::decrypt_field(&key, ciphertext)?;

        self.record(audit::entry(
            None,
            AuditAction::Access,
            secret_kind.as_str(),
            Some(id),
            None,
            None,
            origin,
        ));

        Ok(RedeemedField { field, value })
    }

    // ── Favorites & tags ─────────────────────────────────────────────

    /// Toggle membership of each id in the caller's favorite set.
    ///
    /// Ids are independent: already-favorite ids drop out, the rest join.
    /// Unknown ids toggle like any other — favorites are a per-user set
    /// of ids, not a view onto the secrets table.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for an empty id list.
    pub async fn toggle_favorites(
        &self,
        actor: Uuid,
        ids: &[Uuid],
        origin: &RequestOrigin,
    ) -> Result<Vec<(Uuid, bool)>, VaultError> {
        if ids.is_empty() {
            return Err(VaultError::validation("no ids given"));
        }
        let results = self.store.toggle_favorites(actor, ids).await?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::ToggleFavorite,
            "favorite",
            None,
            None,
            serde_json::to_value(&results).ok(),
            origin,
        ));
        Ok(results)
    }

    /// Attach a tag by name to a secret the caller may edit, creating
    /// the tag if it does not exist. Idempotent per (secret, tag).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a blank name, plus the
    /// usual visibility errors.
    pub async fn add_tag(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
        name: &str,
        origin: &RequestOrigin,
    ) -> Result<TagRecord, VaultError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::validation("tag name is empty"));
        }
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize(&record, actor, Capability::Edit).await?;

        let tag = self.store.find_or_create_tag(name).await?;
        let attached = self
            .store
            .attach_tag(secret_kind, id, tag.id)
            .await?
            .ok_or(VaultError::NotFound)?;

        if attached {
            self.record(audit::entry(
                Some(actor),
                AuditAction::AddTag,
                secret_kind.as_str(),
                Some(id),
                None,
                Some(serde_json::json!({ "tag": tag.name })),
                origin,
            ));
        }
        Ok(tag)
    }

    /// Resolve the tags attached to a secret the caller may view.
    ///
    /// # Errors
    ///
    /// The usual visibility errors.
    pub async fn secret_tags(
        &self,
        actor: Uuid,
        secret_kind: SecretKind,
        id: Uuid,
    ) -> Result<Vec<TagRecord>, VaultError> {
        let record = self.fetch_or_404(secret_kind, id).await?;
        self.authorize(&record, actor, Capability::View).await?;
        Ok(self.store.list_tags(&record.tags).await?)
    }

    // ── Folders ──────────────────────────────────────────────────────

    /// Create a folder for the caller.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a blank name.
    pub async fn create_folder(&self, actor: Uuid, name: &str) -> Result<FolderRecord, VaultError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::validation("folder name is empty"));
        }
        Ok(self
            .store
            .insert_folder(FolderRecord {
                id: Uuid::new_v4(),
                owner_id: actor,
                name: name.to_owned(),
                created_at: Utc::now(),
            })
            .await?)
    }

    /// List the caller's folders.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn list_folders(&self, actor: Uuid) -> Result<Vec<FolderRecord>, VaultError> {
        Ok(self.store.list_folders(actor).await?)
    }

    // ── Audit ────────────────────────────────────────────────────────

    /// Search the caller's own audit trail, newest first.
    ///
    /// The actor filter is forced to the caller — no user can read
    /// another user's trail through this path.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn audit_log(
        &self,
        actor: Uuid,
        action: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<AuditRecord>, VaultError> {
        Ok(self
            .store
            .search_audit(&AuditFilter {
                actor_id: Some(actor),
                action,
                start,
                end,
                limit,
            })
            .await?)
    }

    // ── Organizations ────────────────────────────────────────────────

    /// Create an organization owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Validation`] for a blank name.
    pub async fn create_org(
        &self,
        actor: Uuid,
        name: &str,
        origin: &RequestOrigin,
    ) -> Result<OrgRecord, VaultError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::validation("organization name is empty"));
        }
        let org = self
            .store
            .insert_org(OrgRecord {
                id: Uuid::new_v4(),
                name: name.to_owned(),
                owner_id: actor,
                created_at: Utc::now(),
            })
            .await?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Create,
            "org",
            Some(org.id),
            None,
            Some(serde_json::json!({ "name": org.name })),
            origin,
        ));
        Ok(org)
    }

    /// Invite an email address to an organization. Org owner only.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Conflict`] for a duplicate invitation and
    /// [`VaultError::Forbidden`] for non-owners.
    pub async fn invite_member(
        &self,
        actor: Uuid,
        org_id: Uuid,
        email: &str,
        role: &str,
        origin: &RequestOrigin,
    ) -> Result<OrgMemberRecord, VaultError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(VaultError::validation("invalid email address"));
        }
        let org = self
            .store
            .fetch_org(org_id)
            .await?
            .ok_or(VaultError::NotFound)?;
        if org.owner_id != actor {
            return Err(VaultError::Forbidden);
        }

        let member = self
            .store
            .insert_member(OrgMemberRecord {
                id: Uuid::new_v4(),
                org_id,
                user_id: None,
                email: email.to_owned(),
                role: role.to_owned(),
                invited_at: Utc::now(),
                accepted_at: None,
            })
            .await
            .map_err(|e| match e {
                lockbox_storage::StorageError::Conflict { .. } => {
                    VaultError::Conflict("invitation".to_owned())
                }
                other => VaultError::Storage(other),
            })?;

        self.notifier.invitation(email, &org.name, member.id).await;

        self.record(audit::entry(
            Some(actor),
            AuditAction::Invite,
            "org_member",
            Some(member.id),
            None,
            Some(serde_json::json!({ "org": org_id, "role": member.role })),
            origin,
        ));
        Ok(member)
    }

    /// Accept a pending invitation, binding it to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] if the invitation is unknown or
    /// already accepted.
    pub async fn accept_invitation(
        &self,
        actor: Uuid,
        org_id: Uuid,
        invitation_id: Uuid,
        origin: &RequestOrigin,
    ) -> Result<OrgMemberRecord, VaultError> {
        let member = self
            .store
            .accept_invitation(org_id, invitation_id, actor)
            .await?
            .ok_or(VaultError::NotFound)?;

        self.record(audit::entry(
            Some(actor),
            AuditAction::AcceptInvite,
            "org_member",
            Some(member.id),
            None,
            Some(serde_json::json!({ "org": org_id })),
            origin,
        ));
        Ok(member)
    }

    /// Organizations the caller owns or belongs to.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn list_orgs(&self, actor: Uuid) -> Result<Vec<OrgRecord>, VaultError> {
        Ok(self.store.list_orgs_for_user(actor).await?)
    }

    /// Members of an organization the caller owns or belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] for unknown orgs and orgs the
    /// caller has no relationship with.
    pub async fn list_members(
        &self,
        actor: Uuid,
        org_id: Uuid,
    ) -> Result<Vec<OrgMemberRecord>, VaultError> {
        let org = self
            .store
            .fetch_org(org_id)
            .await?
            .ok_or(VaultError::NotFound)?;
        let members = self.store.list_members(org_id).await?;
        let is_member = members
            .iter()
            .any(|m| m.user_id == Some(actor) && m.accepted_at.is_some());
        if org.owner_id != actor && !is_member {
            return Err(VaultError::NotFound);
        }
        Ok(members)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use lockbox_storage::models::PermissionSet;
    use lockbox_storage::MemoryStore;
    use serde_json::json;

    use crate::notify::LogNotifier;

    use super::*;

    fn vault() -> Vault {
        Vault::new(
            Arc::new(MemoryStore::new()),
            EncryptionKey::generate(),
            b"test-link-signing-key".to_vec(),
            "https://lockbox.test".to_owned(),
            Arc::new(LogNotifier),
        )
    }

    fn origin() -> RequestOrigin {
        RequestOrigin {
            ip_address: Some("198.51.100.7".to_owned()),
            user_agent: Some("tests".to_owned()),
        }
    }

    fn password_payload() -> Value {
        json!({
            "name": "GitHub",
            "website": "github.com",
            "username": "octocat",
            "password": "hunter2",
        })
    }

    /// Let fire-and-forget audit tasks run to completion.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn recipient(user: Uuid, permissions: PermissionSet) -> GrantRecipient {
        GrantRecipient {
            user_id: user,
            permissions,
        }
    }

    #[tokio::test]
    async fn create_get_roundtrip_decrypts() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        assert_eq!(created.payload["password"], "hunter2");

        let fetched = v
            .get_secret(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        assert_eq!(fetched.payload, password_payload());
    }

    #[tokio::test]
    async fn stored_payload_is_ciphertext() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        let raw = v
            .store
            .fetch_secret(SecretKind::Password, created.id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(raw.payload["password"], "hunter2");
        assert_eq!(raw.payload["username"], "octocat");
    }

    #[tokio::test]
    async fn stranger_sees_not_found_never_forbidden() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            v.get_secret(stranger, SecretKind::Password, created.id, &origin())
                .await,
            Err(VaultError::NotFound)
        ));
        assert!(matches!(
            v.delete_secret(stranger, SecretKind::Password, created.id, &origin())
                .await,
            Err(VaultError::NotFound)
        ));
    }

    #[tokio::test]
    async fn view_only_recipient_can_read_but_not_write() {
        let v = vault();
        let owner = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        v.share_secret(
            owner,
            SecretKind::Password,
            created.id,
            vec![recipient(reader, PermissionSet::view_only())],
            &origin(),
        )
        .await
        .unwrap();

        let fetched = v
            .get_secret(reader, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        assert_eq!(fetched.payload["password"], "hunter2");

        assert!(matches!(
            v.update_secret(
                reader,
                SecretKind::Password,
                created.id,
                json!({ "name": "hijacked" }),
                &origin(),
            )
            .await,
            Err(VaultError::Forbidden)
        ));
        assert!(matches!(
            v.delete_secret(reader, SecretKind::Password, created.id, &origin())
                .await,
            Err(VaultError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn update_merges_partial_patch() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        let updated = v
            .update_secret(
                owner,
                SecretKind::Password,
                created.id,
                json!({ "password": "correct-horse" }),
                &origin(),
            )
            .await
            .unwrap();
        assert_eq!(updated.payload["password"], "correct-horse");
        assert_eq!(updated.payload["username"], "octocat");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn share_overwrites_existing_triple() {
        let v = vault();
        let owner = Uuid::new_v4();
        let user = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        v.share_secret(
            owner,
            SecretKind::Password,
            created.id,
            vec![recipient(
                user,
                PermissionSet {
                    view: true,
                    edit: true,
                    delete: true,
                },
            )],
            &origin(),
        )
        .await
        .unwrap();

        let grant = v
            .share_secret(
                owner,
                SecretKind::Password,
                created.id,
                vec![recipient(user, PermissionSet::none())],
                &origin(),
            )
            .await
            .unwrap();

        assert_eq!(grant.recipients.len(), 1);
        assert_eq!(grant.permissions_for(user), Some(PermissionSet::none()));
        // Revoked-but-listed recipients get Forbidden, not NotFound.
        assert!(matches!(
            v.get_secret(user, SecretKind::Password, created.id, &origin())
                .await,
            Err(VaultError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn only_owner_may_share() {
        let v = vault();
        let owner = Uuid::new_v4();
        let editor = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        v.share_secret(
            owner,
            SecretKind::Password,
            created.id,
            vec![recipient(
                editor,
                PermissionSet {
                    view: true,
                    edit: true,
                    delete: true,
                },
            )],
            &origin(),
        )
        .await
        .unwrap();

        assert!(matches!(
            v.share_secret(
                editor,
                SecretKind::Password,
                created.id,
                vec![recipient(Uuid::new_v4(), PermissionSet::view_only())],
                &origin(),
            )
            .await,
            Err(VaultError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn unshared_recipient_drops_to_not_found() {
        let v = vault();
        let owner = Uuid::new_v4();
        let user = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        v.share_secret(
            owner,
            SecretKind::Password,
            created.id,
            vec![recipient(user, PermissionSet::view_only())],
            &origin(),
        )
        .await
        .unwrap();

        let grant = v
            .unshare_secret(owner, SecretKind::Password, created.id, user, &origin())
            .await
            .unwrap();
        assert!(grant.recipients.is_empty());

        assert!(matches!(
            v.get_secret(user, SecretKind::Password, created.id, &origin())
                .await,
            Err(VaultError::NotFound)
        ));
    }

    #[tokio::test]
    async fn issue_and_redeem_share_link() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        let link = v
            .issue_share_link(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        assert!(link.url.contains(&link.token));

        let redeemed = v
            .redeem_share_link(SecretKind::Password, created.id, &link.token, &origin())
            .await
            .unwrap();
        assert_eq!(redeemed.field, "password");
        assert_eq!(redeemed.value, "hunter2");

        // Redemption does not consume the link.
        v.redeem_share_link(SecretKind::Password, created.id, &link.token, &origin())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_link() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        let old = v
            .issue_share_link(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        let new = v
            .issue_share_link(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        assert_ne!(old.token, new.token);

        assert!(matches!(
            v.redeem_share_link(SecretKind::Password, created.id, &old.token, &origin())
                .await,
            Err(VaultError::InvalidLink)
        ));
        v.redeem_share_link(SecretKind::Password, created.id, &new.token, &origin())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_link_is_invalid() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        let link = v
            .issue_share_link(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();

        // Backdate the stored expiry.
        v.store
            .set_share_link(
                SecretKind::Password,
                created.id,
                &link.token,
                Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        assert!(matches!(
            v.redeem_share_link(SecretKind::Password, created.id, &link.token, &origin())
                .await,
            Err(VaultError::InvalidLink)
        ));
    }

    #[tokio::test]
    async fn redeem_after_delete_is_invalid() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        let link = v
            .issue_share_link(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        v.delete_secret(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();

        assert!(matches!(
            v.redeem_share_link(SecretKind::Password, created.id, &link.token, &origin())
                .await,
            Err(VaultError::InvalidLink)
        ));
    }

    #[tokio::test]
    async fn list_filters_partition_the_visible_universe() {
        let v = vault();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mine = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        let theirs = v
            .create_secret(
                other,
                SecretKind::Password,
                json!({
                    "name": "Mail",
                    "website": "mail.example",
                    "username": "me",
                    "password": "s3cret",
                }),
                None,
                &origin(),
            )
            .await
            .unwrap();
        v.share_secret(
            other,
            SecretKind::Password,
            theirs.id,
            vec![recipient(owner, PermissionSet::view_only())],
            &origin(),
        )
        .await
        .unwrap();

        let all = v
            .list_secrets(owner, SecretKind::Password, &ListOptions::default(), &origin())
            .await
            .unwrap();
        assert_eq!(all.total_count, 2);

        let created_by_me = v
            .list_secrets(
                owner,
                SecretKind::Password,
                &ListOptions {
                    filter: ListFilter::CreatedByMe,
                    ..ListOptions::default()
                },
                &origin(),
            )
            .await
            .unwrap();
        assert_eq!(created_by_me.total_count, 1);
        assert_eq!(created_by_me.items[0].id, mine.id);

        let shared = v
            .list_secrets(
                owner,
                SecretKind::Password,
                &ListOptions {
                    filter: ListFilter::SharedWithMe,
                    ..ListOptions::default()
                },
                &origin(),
            )
            .await
            .unwrap();
        assert_eq!(shared.total_count, 1);
        assert_eq!(shared.items[0].id, theirs.id);
        // Listings never carry plaintext, even for view-holders.
        assert_ne!(shared.items[0].payload["password"], "s3cret");

        v.toggle_favorites(owner, &[mine.id], &origin()).await.unwrap();
        let favourites = v
            .list_secrets(
                owner,
                SecretKind::Password,
                &ListOptions {
                    filter: ListFilter::Favourites,
                    ..ListOptions::default()
                },
                &origin(),
            )
            .await
            .unwrap();
        assert_eq!(favourites.total_count, 1);
        assert_eq!(favourites.items[0].id, mine.id);
    }

    #[tokio::test]
    async fn list_rejects_sort_by_sensitive_field() {
        let v = vault();
        let owner = Uuid::new_v4();
        let result = v
            .list_secrets(
                owner,
                SecretKind::Password,
                &ListOptions {
                    sort_field: "password".to_owned(),
                    ..ListOptions::default()
                },
                &origin(),
            )
            .await;
        assert!(matches!(result, Err(VaultError::Validation { .. })));
    }

    #[tokio::test]
    async fn list_keeps_sensitive_fields_encrypted() {
        let v = vault();
        let owner = Uuid::new_v4();
        v.create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();

        let page = v
            .list_secrets(owner, SecretKind::Password, &ListOptions::default(), &origin())
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        // Plaintext fields pass through; the sensitive field stays as
        // stored ciphertext.
        assert_eq!(page.items[0].payload["username"], "octocat");
        assert_ne!(page.items[0].payload["password"], "hunter2");
    }

    #[tokio::test]
    async fn rejected_update_leaves_record_unmodified() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(
                owner,
                SecretKind::Card,
                json!({
                    "cardType": "visa",
                    "cardNumber": "4111111111111111",
                    "cardHolderName": "A B",
                    "expiryDate": "12/29",
                    "CVV": "123",
                }),
                None,
                &origin(),
            )
            .await
            .unwrap();

        // One disallowed field poisons the whole request, including the
        // allowed fields sent alongside it.
        let result = v
            .update_secret(
                owner,
                SecretKind::Card,
                created.id,
                json!({ "cardNumber": "5555444433332222", "hacked": "true" }),
                &origin(),
            )
            .await;
        assert!(matches!(result, Err(VaultError::Validation { .. })));

        let fetched = v
            .get_secret(owner, SecretKind::Card, created.id, &origin())
            .await
            .unwrap();
        assert_eq!(fetched.payload["cardNumber"], "4111111111111111");
        assert!(fetched.payload.get("hacked").is_none());
        assert_eq!(fetched.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn toggle_favorites_reports_membership_per_id() {
        let v = vault();
        let actor = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = v.toggle_favorites(actor, &[a, b], &origin()).await.unwrap();
        assert_eq!(first, vec![(a, true), (b, true)]);

        let second = v.toggle_favorites(actor, &[a], &origin()).await.unwrap();
        assert_eq!(second, vec![(a, false)]);
    }

    #[tokio::test]
    async fn add_tag_is_idempotent_and_edit_gated() {
        let v = vault();
        let owner = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        v.share_secret(
            owner,
            SecretKind::Password,
            created.id,
            vec![recipient(reader, PermissionSet::view_only())],
            &origin(),
        )
        .await
        .unwrap();

        let t1 = v
            .add_tag(owner, SecretKind::Password, created.id, "work", &origin())
            .await
            .unwrap();
        let t2 = v
            .add_tag(owner, SecretKind::Password, created.id, "work", &origin())
            .await
            .unwrap();
        assert_eq!(t1.id, t2.id);

        let tags = v
            .secret_tags(owner, SecretKind::Password, created.id)
            .await
            .unwrap();
        assert_eq!(tags.len(), 1);

        assert!(matches!(
            v.add_tag(reader, SecretKind::Password, created.id, "x", &origin())
                .await,
            Err(VaultError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn audit_trail_is_user_scoped_and_newest_first() {
        let v = vault();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let secret = v
            .create_secret(alice, SecretKind::Note, json!({ "title": "t", "content": "c" }), None, &origin())
            .await
            .unwrap();
        v.get_secret(alice, SecretKind::Note, secret.id, &origin())
            .await
            .unwrap();
        v.create_secret(bob, SecretKind::Note, json!({ "title": "b", "content": "c" }), None, &origin())
            .await
            .unwrap();
        settle().await;

        let trail = v.audit_log(alice, None, None, None, None).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.iter().all(|e| e.actor_id == Some(alice)));
        assert_eq!(trail[0].action, "view");
        assert_eq!(trail[1].action, "create");
    }

    #[tokio::test]
    async fn audit_snapshots_are_redacted() {
        let v = vault();
        let owner = Uuid::new_v4();
        v.create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        settle().await;

        let trail = v.audit_log(owner, None, None, None, None).await.unwrap();
        let snapshot = trail[0].new_value.as_ref().unwrap();
        assert_eq!(snapshot["password"], "[REDACTED]");
        assert_eq!(snapshot["username"], "octocat");
    }

    #[tokio::test]
    async fn redeem_writes_anonymous_audit_entry() {
        let v = vault();
        let owner = Uuid::new_v4();
        let created = v
            .create_secret(owner, SecretKind::Password, password_payload(), None, &origin())
            .await
            .unwrap();
        let link = v
            .issue_share_link(owner, SecretKind::Password, created.id, &origin())
            .await
            .unwrap();
        v.redeem_share_link(SecretKind::Password, created.id, &link.token, &origin())
            .await
            .unwrap();
        settle().await;

        let all = v
            .store
            .search_audit(&AuditFilter::default())
            .await
            .unwrap();
        let redeem = all.iter().find(|e| e.action == "access").unwrap();
        assert_eq!(redeem.actor_id, None);
        assert_eq!(redeem.entity_id, Some(created.id));
        assert_eq!(redeem.ip_address.as_deref(), Some("198.51.100.7"));
    }

    #[tokio::test]
    async fn org_invite_accept_flow() {
        let v = vault();
        let owner = Uuid::new_v4();
        let joiner = Uuid::new_v4();

        let org = v.create_org(owner, "Acme", &origin()).await.unwrap();
        let invitation = v
            .invite_member(owner, org.id, "dev@acme.test", "member", &origin())
            .await
            .unwrap();

        // Duplicate invitation conflicts.
        assert!(matches!(
            v.invite_member(owner, org.id, "dev@acme.test", "member", &origin())
                .await,
            Err(VaultError::Conflict(_))
        ));

        // Non-members cannot enumerate members.
        assert!(matches!(
            v.list_members(joiner, org.id).await,
            Err(VaultError::NotFound)
        ));

        let member = v
            .accept_invitation(joiner, org.id, invitation.id, &origin())
            .await
            .unwrap();
        assert_eq!(member.user_id, Some(joiner));

        let orgs = v.list_orgs(joiner).await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(v.list_members(joiner, org.id).await.unwrap().len(), 1);

        // Accepting twice fails.
        assert!(matches!(
            v.accept_invitation(joiner, org.id, invitation.id, &origin())
                .await,
            Err(VaultError::NotFound)
        ));
    }
}
