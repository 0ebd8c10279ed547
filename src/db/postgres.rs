// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PostgreSQL store with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profiles, roles, reconciliation key changes)
//! - Training groups (members, program assignment)
//! - Programs (lookups only)

use super::{GroupRepository, RepoError, UserRepository};
use crate::models::{
    normalize_email, GroupDetail, GroupPatch, MemberSummary, NewGroup, NewUser, ProfileUpdate,
    ProgramSummary, Role, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;

const MAX_CONNECTIONS: u32 = 10;

const USER_COLUMNS: &str = "id, email, name, student_name, role, created_at";

const GROUP_SELECT: &str = r#"
    SELECT g.id, g.name, g.description, g.program_id, p.title AS program_title,
           g.created_at, g.updated_at
    FROM training_groups g
    LEFT JOIN programs p ON p.id = g.program_id
"#;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(|e| RepoError::Store(format!("Failed to connect to database: {}", e)))?;

        tracing::info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), RepoError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepoError::Store(format!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, RepoError> {
        self.pool.begin().await.map_err(map_sqlx)
    }

    async fn load_members(
        &self,
        group_ids: &[String],
    ) -> Result<HashMap<String, Vec<MemberSummary>>, RepoError> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT gm.group_id, u.id, u.name, u.student_name, u.email
            FROM group_members gm
            JOIN users u ON u.id = gm.user_id
            WHERE gm.group_id = ANY($1)
            ORDER BY u.name ASC NULLS LAST, u.id ASC
            "#,
        )
        .bind(group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut by_group: HashMap<String, Vec<MemberSummary>> = HashMap::new();
        for row in rows {
            by_group
                .entry(row.group_id.clone())
                .or_default()
                .push(row.into_summary());
        }
        Ok(by_group)
    }

    async fn load_group(&self, id: &str) -> Result<Option<GroupDetail>, RepoError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!("{} WHERE g.id = $1", GROUP_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut members = self.load_members(std::slice::from_ref(&row.id)).await?;
        let group_members = members.remove(&row.id).unwrap_or_default();
        Ok(Some(row.into_detail(group_members)))
    }
}

// ─── User Operations ─────────────────────────────────────────

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE lower(email) = $1",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, name, student_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.id)
        .bind(user.email.as_deref().map(normalize_email))
        .bind(&user.display_name)
        .bind(&user.student_alias)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        UserRecord::try_from(row)
    }

    async fn update_id(&self, old_id: &str, new_id: &str) -> Result<UserRecord, RepoError> {
        // group_members.user_id follows via ON UPDATE CASCADE.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET id = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(old_id)
        .bind(new_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| RepoError::NotFound(format!("user {}", old_id)))?;

        UserRecord::try_from(row)
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| RepoError::NotFound(format!("user {}", id)))?;

        UserRecord::try_from(row)
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<UserRecord, RepoError> {
        let clear_alias = matches!(update.student_alias, Some(None));
        let new_alias = update.student_alias.flatten();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                student_name = CASE WHEN $4 THEN NULL ELSE COALESCE($3, student_name) END,
                role = COALESCE($5, role)
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&update.display_name)
        .bind(&new_alias)
        .bind(clear_alias)
        .bind(update.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| RepoError::NotFound(format!("user {}", id)))?;

        UserRecord::try_from(row)
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepoError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(UserRecord::try_from).collect()
    }
}

// ─── Group Operations ────────────────────────────────────────

#[async_trait]
impl GroupRepository for PgStore {
    async fn list_groups(&self) -> Result<Vec<GroupDetail>, RepoError> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "{} ORDER BY g.created_at DESC, g.id ASC",
            GROUP_SELECT
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut members = self.load_members(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let group_members = members.remove(&row.id).unwrap_or_default();
                row.into_detail(group_members)
            })
            .collect())
    }

    async fn find_group(&self, id: &str) -> Result<Option<GroupDetail>, RepoError> {
        self.load_group(id).await
    }

    async fn create_group(&self, group: NewGroup) -> Result<GroupDetail, RepoError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO training_groups (id, name, description, program_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.program_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        insert_members(&mut tx, &id, &group.member_ids).await?;
        tx.commit().await.map_err(map_sqlx)?;

        tracing::debug!(group_id = %id, members = group.member_ids.len(), "Group created");

        self.load_group(&id)
            .await?
            .ok_or_else(|| RepoError::Store(format!("group {} vanished after insert", id)))
    }

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupDetail, RepoError> {
        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, GroupColumns>(
            "SELECT name, description, program_id FROM training_groups WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| RepoError::NotFound(format!("group {}", id)))?;

        let name = patch.name.unwrap_or(current.name);
        let description = patch.description.unwrap_or(current.description);
        let program_id = patch.program_id.unwrap_or(current.program_id);

        sqlx::query(
            r#"
            UPDATE training_groups
            SET name = $2, description = $3, program_id = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&name)
        .bind(&description)
        .bind(&program_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        if let Some(member_ids) = &patch.member_ids {
            sqlx::query("DELETE FROM group_members WHERE group_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            insert_members(&mut tx, id, member_ids).await?;
        }

        tx.commit().await.map_err(map_sqlx)?;

        self.load_group(id)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("group {}", id)))
    }

    async fn delete_group(&self, id: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM training_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("group {}", id)));
        }
        Ok(())
    }

    async fn find_program(&self, id: &str) -> Result<Option<ProgramSummary>, RepoError> {
        sqlx::query_as::<_, ProgramRow>("SELECT id, title FROM programs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(|r| ProgramSummary { id: r.id, title: r.title }))
            .map_err(map_sqlx)
    }
}

async fn insert_members(
    tx: &mut Transaction<'static, Postgres>,
    group_id: &str,
    member_ids: &[String],
) -> Result<(), RepoError> {
    if member_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id)
        SELECT $1, member_id FROM UNNEST($2::text[]) AS member_id
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(group_id)
    .bind(member_ids)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

/// Translate driver errors into repository errors.
///
/// Unique violations (23505) become `Conflict` so callers can recover from
/// creation races; foreign key violations (23503) become `InvalidReference`.
fn map_sqlx(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepoError::Conflict(db_err.message().to_string());
        }
        if db_err.is_foreign_key_violation() {
            return RepoError::InvalidReference(db_err.message().to_string());
        }
    }
    RepoError::Store(err.to_string())
}

// ─── Row Types ───────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    name: Option<String>,
    student_name: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| RepoError::Store(e.to_string()))?;
        Ok(UserRecord {
            id: row.id,
            email: row.email,
            display_name: row.name,
            student_alias: row.student_name,
            role,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct GroupRow {
    id: String,
    name: String,
    description: Option<String>,
    program_id: Option<String>,
    program_title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_detail(self, members: Vec<MemberSummary>) -> GroupDetail {
        let program = match (&self.program_id, self.program_title) {
            (Some(id), Some(title)) => Some(ProgramSummary {
                id: id.clone(),
                title,
            }),
            _ => None,
        };
        GroupDetail {
            id: self.id,
            name: self.name,
            description: self.description,
            program_id: self.program_id,
            program,
            members,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct GroupColumns {
    name: String,
    description: Option<String>,
    program_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    group_id: String,
    id: String,
    name: Option<String>,
    student_name: Option<String>,
    email: Option<String>,
}

impl MemberRow {
    fn into_summary(self) -> MemberSummary {
        MemberSummary {
            id: self.id,
            name: self.name,
            student_name: self.student_name,
            email: self.email,
        }
    }
}

#[derive(Debug, FromRow)]
struct ProgramRow {
    id: String,
    title: String,
}
