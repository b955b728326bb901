//! PostgreSQL store.
//!
//! Secrets are stored as JSONB documents; grants as one row per
//! (secret, recipient) so the permission-triple overwrite is a single
//! `ON CONFLICT` upsert — last write wins at the database, never in
//! application memory. The favorite toggle is one statement (delete-else-
//! insert CTE) for the same reason.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::models::{
    AuditFilter, AuditRecord, FolderRecord, GrantRecipient, ListQuery, ListScope, OrgMemberRecord,
    OrgRecord, Page, PermissionSet, SecretKind, SecretRecord, StoredGrant, TagRecord,
};
use crate::{StorageError, VaultStore};

/// Schema applied on connect. Idempotent.
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS secrets (
    id               uuid PRIMARY KEY,
    kind             text NOT NULL,
    owner_id         uuid NOT NULL,
    payload          jsonb NOT NULL,
    folder_id        uuid,
    tags             uuid[] NOT NULL DEFAULT '{}',
    share_token      text,
    share_expires_at timestamptz,
    created_at       timestamptz NOT NULL,
    updated_at       timestamptz NOT NULL
);
CREATE INDEX IF NOT EXISTS secrets_kind_owner_idx ON secrets (kind, owner_id);

CREATE TABLE IF NOT EXISTS shared_grants (
    kind       text NOT NULL,
    secret_id  uuid NOT NULL,
    owner_id   uuid NOT NULL,
    created_at timestamptz NOT NULL DEFAULT now(),
    PRIMARY KEY (kind, secret_id)
);

CREATE TABLE IF NOT EXISTS grant_recipients (
    kind         text NOT NULL,
    secret_id    uuid NOT NULL,
    recipient_id uuid NOT NULL,
    can_view     boolean NOT NULL,
    can_edit     boolean NOT NULL,
    can_delete   boolean NOT NULL,
    updated_at   timestamptz NOT NULL DEFAULT now(),
    PRIMARY KEY (kind, secret_id, recipient_id)
);
CREATE INDEX IF NOT EXISTS grant_recipients_user_idx ON grant_recipients (recipient_id, kind);

CREATE TABLE IF NOT EXISTS favorites (
    user_id   uuid NOT NULL,
    secret_id uuid NOT NULL,
    PRIMARY KEY (user_id, secret_id)
);

CREATE TABLE IF NOT EXISTS tags (
    id   uuid PRIMARY KEY,
    name text NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS folders (
    id         uuid PRIMARY KEY,
    owner_id   uuid NOT NULL,
    name       text NOT NULL,
    created_at timestamptz NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id         uuid PRIMARY KEY,
    actor_id   uuid,
    action     text NOT NULL,
    entity     text NOT NULL,
    entity_id  uuid,
    old_value  jsonb,
    new_value  jsonb,
    ip_address text,
    user_agent text,
    created_at timestamptz NOT NULL
);
CREATE INDEX IF NOT EXISTS audit_log_actor_idx ON audit_log (actor_id, created_at DESC);

CREATE TABLE IF NOT EXISTS orgs (
    id         uuid PRIMARY KEY,
    name       text NOT NULL,
    owner_id   uuid NOT NULL,
    created_at timestamptz NOT NULL
);

CREATE TABLE IF NOT EXISTS org_members (
    id          uuid PRIMARY KEY,
    org_id      uuid NOT NULL,
    user_id     uuid,
    email       text NOT NULL,
    role        text NOT NULL,
    invited_at  timestamptz NOT NULL,
    accepted_at timestamptz,
    UNIQUE (org_id, email)
);
";

/// A [`VaultStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    recipient_id: Uuid,
    can_view: bool,
    can_edit: bool,
    can_delete: bool,
}

impl From<RecipientRow> for GrantRecipient {
    fn from(row: RecipientRow) -> Self {
        Self {
            user_id: row.recipient_id,
            permissions: PermissionSet {
                view: row.can_view,
                edit: row.can_edit,
                delete: row.can_delete,
            },
        }
    }
}

impl PostgresStore {
    /// Connect to PostgreSQL and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or schema
    /// application fails.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await
            .map_err(|e| StorageError::Open {
                reason: e.to_string(),
            })?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StorageError::Open {
                reason: format!("schema: {e}"),
            })?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (schema is assumed applied).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn recipients(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
    ) -> Result<Vec<GrantRecipient>, StorageError> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            r"SELECT recipient_id, can_view, can_edit, can_delete
              FROM grant_recipients
              WHERE kind = $1 AND secret_id = $2
              ORDER BY updated_at",
        )
        .bind(kind)
        .bind(secret_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::read("grant recipients", e))?;

        Ok(rows.into_iter().map(GrantRecipient::from).collect())
    }
}

/// Escape LIKE metacharacters in a user-supplied search needle.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Append the scope/filter WHERE clause shared by the count and page
/// queries of [`PostgresStore::list_secrets`].
fn push_list_filters<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    kind: SecretKind,
    scope: &'a ListScope,
    query: &'a ListQuery,
    pattern: &'a Option<String>,
) {
    qb.push(" WHERE kind = ").push_bind(kind);

    qb.push(" AND (");
    match scope.owner_id {
        Some(owner) => {
            qb.push("owner_id = ").push_bind(owner);
            qb.push(" OR id = ANY(").push_bind(&scope.shared_ids).push(")");
        }
        None => {
            qb.push("id = ANY(").push_bind(&scope.shared_ids).push(")");
        }
    }
    qb.push(")");

    if let Some(restrict) = &scope.restrict_ids {
        qb.push(" AND id = ANY(").push_bind(restrict).push(")");
    }

    if let Some(folder) = query.folder_id {
        qb.push(" AND folder_id = ").push_bind(folder);
    }

    if let Some(pattern) = pattern {
        qb.push(" AND (");
        let mut first = true;
        for field in &query.search_fields {
            if !first {
                qb.push(" OR ");
            }
            first = false;
            qb.push("payload->>").push_bind(field.as_str());
            qb.push(" ILIKE ").push_bind(pattern.as_str());
        }
        if first {
            // No searchable fields for this kind — match nothing.
            qb.push("false");
        }
        qb.push(")");
    }
}

#[async_trait::async_trait]
impl VaultStore for PostgresStore {
    async fn insert_secret(&self, record: SecretRecord) -> Result<SecretRecord, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            r"INSERT INTO secrets (id, kind, owner_id, payload, folder_id, tags, created_at, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
              RETURNING *",
        )
        .bind(record.id)
        .bind(record.kind)
        .bind(record.owner_id)
        .bind(&record.payload)
        .bind(record.folder_id)
        .bind(&record.tags)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::write("secret", e))
    }

    async fn fetch_secret(
        &self,
        kind: SecretKind,
        id: Uuid,
    ) -> Result<Option<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>("SELECT * FROM secrets WHERE kind = $1 AND id = $2")
            .bind(kind)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::read("secret", e))
    }

    async fn update_secret_payload(
        &self,
        kind: SecretKind,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Option<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            r"UPDATE secrets SET payload = $3, updated_at = now()
              WHERE kind = $1 AND id = $2
              RETURNING *",
        )
        .bind(kind)
        .bind(id)
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::write("secret", e))
    }

    async fn delete_secret(
        &self,
        kind: SecretKind,
        id: Uuid,
    ) -> Result<Option<SecretRecord>, StorageError> {
        sqlx::query_as::<_, SecretRecord>(
            "DELETE FROM secrets WHERE kind = $1 AND id = $2 RETURNING *",
        )
        .bind(kind)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::delete("secret", e))
    }

    async fn list_secrets(
        &self,
        kind: SecretKind,
        scope: &ListScope,
        query: &ListQuery,
    ) -> Result<Page<SecretRecord>, StorageError> {
        let pattern = query
            .search
            .as_ref()
            .map(|needle| format!("%{}%", escape_like(needle)));

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM secrets");
        push_list_filters(&mut count_qb, kind, scope, query, &pattern);
        let total_count: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::read("secrets", e))?
            .try_get(0)
            .map_err(|e| StorageError::read("secrets", e))?;

        let mut qb = QueryBuilder::new("SELECT * FROM secrets");
        push_list_filters(&mut qb, kind, scope, query, &pattern);

        qb.push(" ORDER BY ");
        match query.sort_field.as_str() {
            "created_at" | "createdAt" => {
                qb.push("created_at");
            }
            "updated_at" | "updatedAt" => {
                qb.push("updated_at");
            }
            field => {
                qb.push("lower(coalesce(payload->>")
                    .push_bind(field.to_owned())
                    .push(", ''))");
            }
        }
        qb.push(if query.ascending { " ASC" } else { " DESC" });

        let page = query.page.max(1);
        let limit = i64::from(query.page_size);
        let offset = i64::from(page.saturating_sub(1)).saturating_mul(limit);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let items = qb
            .build_query_as::<SecretRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::read("secrets", e))?;

        Ok(Page {
            items,
            total_count: u64::try_from(total_count).unwrap_or(0),
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
        let result = sqlx::query(
            r"UPDATE secrets SET share_token = $3, share_expires_at = $4
              WHERE kind = $1 AND id = $2",
        )
        .bind(kind)
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write("share link", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn attach_tag(
        &self,
        kind: SecretKind,
        id: Uuid,
        tag_id: Uuid,
    ) -> Result<Option<bool>, StorageError> {
        // Single conditional append — set semantics enforced in one write.
        let result = sqlx::query(
            r"UPDATE secrets SET tags = array_append(tags, $3), updated_at = now()
              WHERE kind = $1 AND id = $2 AND NOT (tags @> ARRAY[$3])",
        )
        .bind(kind)
        .bind(id)
        .bind(tag_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write("secret tags", e))?;

        if result.rows_affected() > 0 {
            return Ok(Some(true));
        }

        // Nothing changed: either already attached or no such secret.
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM secrets WHERE kind = $1 AND id = $2)")
                .bind(kind)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::read("secret", e))?;

        Ok(exists.then_some(false))
    }

    async fn upsert_grant(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
        owner_id: Uuid,
        recipients: &[GrantRecipient],
    ) -> Result<StoredGrant, StorageError> {
        sqlx::query(
            r"INSERT INTO shared_grants (kind, secret_id, owner_id)
              VALUES ($1, $2, $3)
              ON CONFLICT (kind, secret_id) DO NOTHING",
        )
        .bind(kind)
        .bind(secret_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write("grant", e))?;

        // One upsert per recipient: overwrite-if-present, append otherwise.
        // Concurrent shares serialize on the row — last write wins.
        for recipient in recipients {
            sqlx::query(
                r"INSERT INTO grant_recipients (kind, secret_id, recipient_id, can_view, can_edit, can_delete)
                  VALUES ($1, $2, $3, $4, $5, $6)
                  ON CONFLICT (kind, secret_id, recipient_id) DO UPDATE SET
                    can_view = EXCLUDED.can_view,
                    can_edit = EXCLUDED.can_edit,
                    can_delete = EXCLUDED.can_delete,
                    updated_at = now()",
            )
            .bind(kind)
            .bind(secret_id)
            .bind(recipient.user_id)
            .bind(recipient.permissions.view)
            .bind(recipient.permissions.edit)
            .bind(recipient.permissions.delete)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::write("grant recipient", e))?;
        }

        Ok(StoredGrant {
            kind,
            secret_id,
            owner_id,
            recipients: self.recipients(kind, secret_id).await?,
        })
    }

    async fn remove_grant_recipient(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<Option<StoredGrant>, StorageError> {
        sqlx::query(
            r"DELETE FROM grant_recipients
              WHERE kind = $1 AND secret_id = $2 AND recipient_id = $3",
        )
        .bind(kind)
        .bind(secret_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::delete("grant recipient", e))?;

        self.fetch_grant(kind, secret_id).await
    }

    async fn fetch_grant(
        &self,
        kind: SecretKind,
        secret_id: Uuid,
    ) -> Result<Option<StoredGrant>, StorageError> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT owner_id FROM shared_grants WHERE kind = $1 AND secret_id = $2",
        )
        .bind(kind)
        .bind(secret_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::read("grant", e))?;

        match owner {
            Some(owner_id) => Ok(Some(StoredGrant {
                kind,
                secret_id,
                owner_id,
                recipients: self.recipients(kind, secret_id).await?,
            })),
            None => Ok(None),
        }
    }

    async fn grants_for_recipient(
        &self,
        kind: SecretKind,
        recipient_id: Uuid,
    ) -> Result<Vec<StoredGrant>, StorageError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            secret_id: Uuid,
            owner_id: Uuid,
            recipient_id: Uuid,
            can_view: bool,
            can_edit: bool,
            can_delete: bool,
        }

        let rows = sqlx::query_as::<_, Row>(
            r"SELECT g.secret_id, g.owner_id, r.recipient_id, r.can_view, r.can_edit, r.can_delete
              FROM shared_grants g
              JOIN grant_recipients r ON r.kind = g.kind AND r.secret_id = g.secret_id
              WHERE g.kind = $1
                AND g.secret_id IN (
                    SELECT secret_id FROM grant_recipients
                    WHERE kind = $1 AND recipient_id = $2
                )",
        )
        .bind(kind)
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::read("grants", e))?;

        let mut grants: Vec<StoredGrant> = Vec::new();
        for row in rows {
            let recipient = GrantRecipient {
                user_id: row.recipient_id,
                permissions: PermissionSet {
                    view: row.can_view,
                    edit: row.can_edit,
                    delete: row.can_delete,
                },
            };
            match grants.iter_mut().find(|g| g.secret_id == row.secret_id) {
                Some(grant) => grant.recipients.push(recipient),
                None => grants.push(StoredGrant {
                    kind,
                    secret_id: row.secret_id,
                    owner_id: row.owner_id,
                    recipients: vec![recipient],
                }),
            }
        }
        Ok(grants)
    }

    async fn toggle_favorites(
        &self,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<(Uuid, bool)>, StorageError> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            // Delete-else-insert in one statement: atomic under concurrent
            // toggles from the same user.
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r"WITH removed AS (
                      DELETE FROM favorites WHERE user_id = $1 AND secret_id = $2
                      RETURNING secret_id
                  )
                  INSERT INTO favorites (user_id, secret_id)
                  SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM removed)
                  RETURNING secret_id",
            )
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::write("favorite", e))?;

            results.push((id, inserted.is_some()));
        }
        Ok(results)
    }

    async fn fetch_favorites(&self, user_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        sqlx::query_scalar("SELECT secret_id FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::read("favorites", e))
    }

    async fn find_or_create_tag(&self, name: &str) -> Result<TagRecord, StorageError> {
        sqlx::query_as::<_, TagRecord>(
            r"INSERT INTO tags (id, name) VALUES ($1, $2)
              ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
              RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::write("tag", e))
    }

    async fn list_tags(&self, ids: &[Uuid]) -> Result<Vec<TagRecord>, StorageError> {
        sqlx::query_as::<_, TagRecord>("SELECT * FROM tags WHERE id = ANY($1) ORDER BY name")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::read("tags", e))
    }

    async fn insert_folder(&self, record: FolderRecord) -> Result<FolderRecord, StorageError> {
        sqlx::query_as::<_, FolderRecord>(
            r"INSERT INTO folders (id, owner_id, name, created_at)
              VALUES ($1, $2, $3, $4)
              RETURNING *",
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.name)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::write("folder", e))
    }

    async fn list_folders(&self, owner_id: Uuid) -> Result<Vec<FolderRecord>, StorageError> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::read("folders", e))
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"INSERT INTO audit_log (id, actor_id, action, entity, entity_id, old_value, new_value, ip_address, user_agent, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.actor_id)
        .bind(&record.action)
        .bind(&record.entity)
        .bind(record.entity_id)
        .bind(&record.old_value)
        .bind(&record.new_value)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::write("audit entry", e))?;

        Ok(())
    }

    async fn search_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StorageError> {
        let mut qb = QueryBuilder::new("SELECT * FROM audit_log WHERE true");

        if let Some(actor) = filter.actor_id {
            qb.push(" AND actor_id = ").push_bind(actor);
        }
        if let Some(action) = &filter.action {
            qb.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(start) = filter.start {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            qb.push(" AND created_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        qb.build_query_as::<AuditRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::read("audit entries", e))
    }

    async fn insert_org(&self, record: OrgRecord) -> Result<OrgRecord, StorageError> {
        sqlx::query_as::<_, OrgRecord>(
            r"INSERT INTO orgs (id, name, owner_id, created_at)
              VALUES ($1, $2, $3, $4)
              RETURNING *",
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(record.owner_id)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::write("org", e))
    }

    async fn fetch_org(&self, id: Uuid) -> Result<Option<OrgRecord>, StorageError> {
        sqlx::query_as::<_, OrgRecord>("SELECT * FROM orgs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::read("org", e))
    }

    async fn list_orgs_for_user(&self, user_id: Uuid) -> Result<Vec<OrgRecord>, StorageError> {
        sqlx::query_as::<_, OrgRecord>(
            r"SELECT o.* FROM orgs o
              WHERE o.owner_id = $1
              UNION
              SELECT o.* FROM orgs o
              JOIN org_members m ON m.org_id = o.id
              WHERE m.user_id = $1 AND m.accepted_at IS NOT NULL
              ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::read("orgs", e))
    }

    async fn insert_member(
        &self,
        record: OrgMemberRecord,
    ) -> Result<OrgMemberRecord, StorageError> {
        sqlx::query_as::<_, OrgMemberRecord>(
            r"INSERT INTO org_members (id, org_id, user_id, email, role, invited_at, accepted_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              RETURNING *",
        )
        .bind(record.id)
        .bind(record.org_id)
        .bind(record.user_id)
        .bind(&record.email)
        .bind(&record.role)
        .bind(record.invited_at)
        .bind(record.accepted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StorageError::Conflict {
                    entity: "org member".to_owned(),
                }
            }
            _ => StorageError::write("org member", e),
        })
    }

    async fn accept_invitation(
        &self,
        org_id: Uuid,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OrgMemberRecord>, StorageError> {
        sqlx::query_as::<_, OrgMemberRecord>(
            r"UPDATE org_members SET user_id = $3, accepted_at = now()
              WHERE id = $2 AND org_id = $1 AND accepted_at IS NULL
              RETURNING *",
        )
        .bind(org_id)
        .bind(invitation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::write("org member", e))
    }

    async fn list_members(&self, org_id: Uuid) -> Result<Vec<OrgMemberRecord>, StorageError> {
        sqlx::query_as::<_, OrgMemberRecord>(
            "SELECT * FROM org_members WHERE org_id = $1 ORDER BY invited_at",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::read("org members", e))
    }
}
