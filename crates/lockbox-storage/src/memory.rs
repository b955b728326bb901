//! In-memory store for tests and local development.
//!
//! All state lives in one map structure behind a single `RwLock`, which is
//! what makes the grant upsert and favorite toggle atomic here — every
//! mutating call takes the write lock for its whole critical section.
//! Data is lost when the process exits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditRecord, FolderRecord, GrantRecipient, ListQuery, ListScope, OrgMemberRecord,
    OrgRecord, Page, SecretKind, SecretRecord, StoredGrant, TagRecord,
};
use crate::{StorageError, VaultStore};

#[derive(Debug, Default)]
struct Inner {
    secrets: HashMap<(SecretKind, Uuid), SecretRecord>,
    grants: HashMap<(SecretKind, Uuid), StoredGrant>,
    favorites: HashMap<Uuid, HashSet<Uuid>>,
    tags: HashMap<Uuid, TagRecord>,
    folders: HashMap<Uuid, FolderRecord>,
    audit: Vec<AuditRecord>,
    orgs: HashMap<Uuid, OrgRecord>,
    members: HashMap<Uuid, OrgMemberRecord>,
}

/// An in-memory [`VaultStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Case-insensitive substring match over the given payload fields.
fn matches_search(record: &SecretRecord, needle: &str, fields: &[String]) -> bool {
    let needle = needle.to_lowercase();
    fields.iter().any(|field| {
        record
            .payload
            .get(field)
            .and_then(serde_json::Value::as_str)
            .is_some_and(|v| v.to_lowercase().contains(&needle))
    })
}

fn in_scope(record: &SecretRecord, scope: &ListScope) -> bool {
    let owned = scope.owner_id.is_some_and(|o| record.owner_id == o);
    let shared = scope.shared_ids.contains(&record.id);
    if !(owned || shared) {
        return false;
    }
    match &scope.restrict_ids {
        Some(ids) => ids.contains(&record.id),
        None => true,
    }
}

/// Sort key for a record: timestamps sort natively, any other field sorts
/// by its payload value rendered as a lowercase string.
fn sort_key(record: &SecretRecord, field: &str) -> SortKey {
    match field {
        "created_at" | "createdAt" => SortKey::Time(record.created_at),
        "updated_at" | "updatedAt" => SortKey::Time(record.updated_at),
        other => {
            let text = match record.payload.get(other) {
                Some(serde_json::Value::String(s)) => s.to_lowercase(),
                Some(v) => v.to_string(),
                None => String::new(),
            };
            SortKey::Text(text)
        }
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Text(String),
    Time(DateTime<Utc>),
}

#[async_trait::async_trait]
impl VaultStore for MemoryStore {
    async fn insert_secret(&self, record: SecretRecord) -> Result<SecretRecord, StorageError> {
        let mut inner = self.inner.write().await;
        inner
            .secrets
            .insert((record.kind, record.id), record.clone());
        Ok(record)
    }

    async fn fetch_secret(
        &self,
        kind: SecretKind,
        id: Uuid,
    ) -> Result<Option<SecretRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.secrets.get(&(kind, id)).cloned())
    }

    async fn update_secret_payload(
        &self,
        kind: SecretKind,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Option<SecretRecord>, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.secrets.get_mut(&(kind, id)) {
            Some(record) => {
                record.payload = payload;
                record.updated_at = Utc::now();
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_secret(
        &self,
        kind: SecretKind,
        id: Uuid,
    ) -> Result<Option<SecretRecord>, StorageError> {
        let mut inner = self.inner.write().await;
        Ok(inner.secrets.remove(&(kind, id)))
    }

    async fn list_secrets(
        &self,
        kind: SecretKind,
        scope: &ListScope,
        query: &ListQuery,
    ) -> Result<Page<SecretRecord>, StorageError> {
        let inner = self.inner.read().await;

        let mut matched: Vec<SecretRecord> = inner
            .secrets
            .values()
            .filter(|r| r.kind == kind)
            .filter(|r| in_scope(r, scope))
            .filter(|r| match query.folder_id {
                Some(folder) => r.folder_id == Some(folder),
                None => true,
            })
            .filter(|r| match &query.search {
                Some(needle) => matches_search(r, needle, &query.search_fields),
                None => true,
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ord = sort_key(a, &query.sort_field).cmp(&sort_key(b, &query.sort_field));
            if query.ascending { ord } else { ord.reverse() }
        });

        let total_count = matched.len() as u64;
        let page = query.page.max(1);
        let page_size = usize::try_from(query.page_size).unwrap_or(usize::MAX);
        let offset = usize::try_from(page.saturating_sub(1))
            .unwrap_or(0)
            .saturating_mul(page_size);

        let items: Vec<SecretRecord> = matched.into_iter().skip(offset).take(page_size).collect();

        Ok(Page {
            items,
            total_count,
            page,
            page_size: query.page_size,
        })
    }

    async fn set_share_link(
        &self,
        kind: SecretKind,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.secrets.get_mut(&(kind, id)) {
            Some(record) => {
                record.share_token = Some(token.to_owned());
                record.share_expires_at = Some(expires_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn attach_tag(
        &self,
        kind: SecretKind,
        id: Uuid,
        tag_id: Uuid,
    ) -> Result<Option<bool>, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.secrets.get_mut(&(kind, id)) {
            Some(record) => {
                if record.tags.contains(&tag_id) {
                    Ok(Some(false))
                } else {
                    record.tags.push(tag_id);
                    record.updated_at = Utc::now();
                    Ok(Some(true))
                }
            }
            None => Ok(None),
        }
    }

    async fn upsert_grant(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
        owner_id: Uuid,
        recipients: &[GrantRecipient],
    ) -> Result<StoredGrant, StorageError> {
        let mut inner = self.inner.write().await;
        let grant = inner
            .grants
            .entry((kind, secret_id))
            .or_insert_with(|| StoredGrant {
                kind,
                secret_id,
                owner_id,
                recipients: Vec::new(),
            });

        for incoming in recipients {
            match grant
                .recipients
                .iter_mut()
                .find(|r| r.user_id == incoming.user_id)
            {
                Some(existing) => existing.permissions = incoming.permissions,
                None => grant.recipients.push(incoming.clone()),
            }
        }

        Ok(grant.clone())
    }

    async fn remove_grant_recipient(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<StoredGrant>, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.grants.get_mut(&(kind, secret_id)) {
            Some(grant) => {
                grant.recipients.retain(|r| r.user_id != recipient_id);
                Ok(Some(grant.clone()))
            }
            None => Ok(None),
        }
    }

    async fn fetch_grant(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
    ) -> Result<Option<StoredGrant>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.grants.get(&(kind, secret_id)).cloned())
    }

    async fn grants_for_recipient(
        &self,
        kind: SecretKind,
        recipient_id: Uuid,
    ) -> Result<Vec<StoredGrant>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .grants
            .values()
            .filter(|g| g.kind == kind)
            .filter(|g| g.recipients.iter().any(|r| r.user_id == recipient_id))
            .cloned()
            .collect())
    }

    async fn toggle_favorites(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<(Uuid, bool)>, StorageError> {
        let mut inner = self.inner.write().await;
        let set = inner.favorites.entry(user_id).or_default();

        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let now_member = if set.remove(&id) {
                false
            } else {
                set.insert(id);
                true
            };
            results.push((id, now_member));
        }
        Ok(results)
    }

    async fn fetch_favorites(&self, user_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .favorites
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<TagRecord, StorageError> {
        let mut inner = self.inner.write().await;
        if let Some(tag) = inner.tags.values().find(|t| t.name == name) {
            return Ok(tag.clone());
        }
        let tag = TagRecord {
            id: Uuid::new_v4(),
            name: name.to_owned(),
        };
        inner.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self, ids: &[Uuid]) -> Result<Vec<TagRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.tags.get(id).cloned())
            .collect())
    }

    async fn insert_folder(&self, record: FolderRecord) -> Result<FolderRecord, StorageError> {
        let mut inner = self.inner.write().await;
        inner.folders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_folders(&self, owner_id: Uuid) -> Result<Vec<FolderRecord>, StorageError> {
        let inner = self.inner.read().await;
        let mut folders: Vec<FolderRecord> = inner
            .folders
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        folders.sort_by_key(|f| f.created_at);
        Ok(folders)
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.audit.push(record);
        Ok(())
    }

    async fn search_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StorageError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<AuditRecord> = inner
            .audit
            .iter()
            .filter(|e| match filter.actor_id {
                Some(actor) => e.actor_id == Some(actor),
                None => true,
            })
            .filter(|e| match &filter.action {
                Some(action) => &e.action == action,
                None => true,
            })
            .filter(|e| match filter.start {
                Some(start) => e.created_at >= start,
                None => true,
            })
            .filter(|e| match filter.end {
                Some(end) => e.created_at <= end,
                None => true,
            })
            .cloned()
            .collect();

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(entries)
    }

    async fn insert_org(&self, record: OrgRecord) -> Result<OrgRecord, StorageError> {
        let mut inner = self.inner.write().await;
        inner.orgs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn fetch_org(&self, id: Uuid) -> Result<Option<OrgRecord>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.orgs.get(&id).cloned())
    }

    async fn list_orgs_for_user(&self, user_id: Uuid) -> Result<Vec<OrgRecord>, StorageError> {
        let inner = self.inner.read().await;
        let member_orgs: HashSet<Uuid> = inner
            .members
            .values()
            .filter(|m| m.user_id == Some(user_id) && m.accepted_at.is_some())
            .map(|m| m.org_id)
            .collect();

        let mut orgs: Vec<OrgRecord> = inner
            .orgs
            .values()
            .filter(|o| o.owner_id == user_id || member_orgs.contains(&o.id))
            .cloned()
            .collect();
        orgs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orgs)
    }

    async fn insert_member(
        &self,
        record: OrgMemberRecord,
    ) -> Result<OrgMemberRecord, StorageError> {
        let mut inner = self.inner.write().await;
        let duplicate = inner
            .members
            .values()
            .any(|m| m.org_id == record.org_id && m.email == record.email);
        if duplicate {
            return Err(StorageError::Conflict {
                entity: "org member".to_owned(),
            });
        }
        inner.members.insert(record.id, record.clone());
        Ok(record)
    }

    async fn accept_invitation(
        &self,
        org_id: Uuid,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgMemberRecord>, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.members.get_mut(&invitation_id) {
            Some(member) if member.org_id == org_id && member.accepted_at.is_none() => {
                member.user_id = Some(user_id);
                member.accepted_at = Some(Utc::now());
                Ok(Some(member.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_members(&self, org_id: Uuid) -> Result<Vec<OrgMemberRecord>, StorageError> {
        let inner = self.inner.read().await;
        let mut members: Vec<OrgMemberRecord> = inner
            .members
            .values()
            .filter(|m| m.org_id == org_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.invited_at);
        Ok(members)
    }
}
