// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store for tests and database-less local runs.
//!
//! Enforces the same keys as the SQL schema: unique user id, unique
//! non-null email (case-insensitive), and existing program/user references
//! for groups.

use super::{GroupRepository, RepoError, UserRepository};
use crate::models::{
    normalize_email, GroupDetail, GroupPatch, MemberSummary, NewGroup, NewUser, ProfileUpdate,
    ProgramSummary, Role, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredGroup {
    id: String,
    name: String,
    description: Option<String>,
    program_id: Option<String>,
    member_ids: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    programs: HashMap<String, ProgramSummary>,
    groups: HashMap<String, StoredGroup>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing timestamps, so creation order is never a tie.
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    /// `email` must already be normalized.
    fn email_owner(&self, email: &str) -> Option<&UserRecord> {
        self.users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
    }

    fn check_references(
        &self,
        program_id: Option<&str>,
        member_ids: &[String],
    ) -> Result<(), RepoError> {
        if let Some(program_id) = program_id {
            if !self.programs.contains_key(program_id) {
                return Err(RepoError::InvalidReference(format!(
                    "program {}",
                    program_id
                )));
            }
        }
        if let Some(missing) = member_ids.iter().find(|id| !self.users.contains_key(*id)) {
            return Err(RepoError::InvalidReference(format!("user {}", missing)));
        }
        Ok(())
    }

    fn detail(&self, group: &StoredGroup) -> GroupDetail {
        let mut members: Vec<MemberSummary> = group
            .member_ids
            .iter()
            .filter_map(|id| self.users.get(id))
            .map(|u| MemberSummary {
                id: u.id.clone(),
                name: u.display_name.clone(),
                student_name: u.student_alias.clone(),
                email: u.email.clone(),
            })
            .collect();
        // Named members first, then by id.
        members.sort_by(|a, b| {
            (a.name.is_none(), &a.name, &a.id).cmp(&(b.name.is_none(), &b.name, &b.id))
        });

        GroupDetail {
            id: group.id.clone(),
            name: group.name.clone(),
            description: group.description.clone(),
            program_id: group.program_id.clone(),
            program: group
                .program_id
                .as_ref()
                .and_then(|id| self.programs.get(id))
                .cloned(),
            members,
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

/// Mutex-guarded maps behind the repository traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RepoError> {
        self.inner
            .lock()
            .map_err(|_| RepoError::Store("memory store lock poisoned".to_string()))
    }

    /// Register a program so groups can reference it.
    pub fn insert_program(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<ProgramSummary, RepoError> {
        let program = ProgramSummary {
            id: id.into(),
            title: title.into(),
        };
        self.lock()?
            .programs
            .insert(program.id.clone(), program.clone());
        Ok(program)
    }

    /// Number of stored users.
    pub fn user_count(&self) -> Result<usize, RepoError> {
        Ok(self.lock()?.users.len())
    }
}

// ─── User Operations ─────────────────────────────────────────

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock()?.users.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.lock()?.email_owner(&normalize_email(email)).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock()?;

        if inner.users.contains_key(&user.id) {
            return Err(RepoError::Conflict(format!("id {} already exists", user.id)));
        }
        let email = user.email.as_deref().map(normalize_email);
        if let Some(email) = email.as_deref() {
            if inner.email_owner(email).is_some() {
                return Err(RepoError::Conflict(format!("email {} already exists", email)));
            }
        }

        let record = UserRecord {
            id: user.id,
            email,
            display_name: user.display_name,
            student_alias: user.student_alias,
            role: user.role,
            created_at: inner.now(),
        };
        inner.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_id(&self, old_id: &str, new_id: &str) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock()?;

        if old_id == new_id {
            return inner
                .users
                .get(old_id)
                .cloned()
                .ok_or_else(|| RepoError::NotFound(format!("user {}", old_id)));
        }
        if inner.users.contains_key(new_id) {
            return Err(RepoError::Conflict(format!("id {} already exists", new_id)));
        }

        let mut record = inner
            .users
            .remove(old_id)
            .ok_or_else(|| RepoError::NotFound(format!("user {}", old_id)))?;
        record.id = new_id.to_string();
        inner.users.insert(record.id.clone(), record.clone());

        // Memberships follow the key change.
        for group in inner.groups.values_mut() {
            for member in group.member_ids.iter_mut().filter(|m| m.as_str() == old_id) {
                *member = new_id.to_string();
            }
        }

        Ok(record)
    }

    async fn update_role(&self, id: &str, role: Role) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock()?;
        let record = inner
            .users
            .get_mut(id)
            .ok_or_else(|| RepoError::NotFound(format!("user {}", id)))?;
        record.role = role;
        Ok(record.clone())
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<UserRecord, RepoError> {
        let mut inner = self.lock()?;
        let record = inner
            .users
            .get_mut(id)
            .ok_or_else(|| RepoError::NotFound(format!("user {}", id)))?;
        if let Some(name) = update.display_name {
            record.display_name = Some(name);
        }
        if let Some(alias) = update.student_alias {
            record.student_alias = alias;
        }
        if let Some(role) = update.role {
            record.role = role;
        }
        Ok(record.clone())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepoError> {
        let mut users: Vec<UserRecord> = self.lock()?.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }
}

// ─── Group Operations ────────────────────────────────────────

#[async_trait]
impl GroupRepository for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<GroupDetail>, RepoError> {
        let inner = self.lock()?;
        let mut groups: Vec<&StoredGroup> = inner.groups.values().collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(groups.into_iter().map(|g| inner.detail(g)).collect())
    }

    async fn find_group(&self, id: &str) -> Result<Option<GroupDetail>, RepoError> {
        let inner = self.lock()?;
        Ok(inner.groups.get(id).map(|g| inner.detail(g)))
    }

    async fn create_group(&self, group: NewGroup) -> Result<GroupDetail, RepoError> {
        let mut inner = self.lock()?;
        inner.check_references(group.program_id.as_deref(), &group.member_ids)?;

        let now = inner.now();
        let stored = StoredGroup {
            id: uuid::Uuid::new_v4().to_string(),
            name: group.name,
            description: group.description,
            program_id: group.program_id,
            member_ids: group.member_ids,
            created_at: now,
            updated_at: now,
        };
        let detail = inner.detail(&stored);
        inner.groups.insert(stored.id.clone(), stored);
        Ok(detail)
    }

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupDetail, RepoError> {
        let mut inner = self.lock()?;

        let mut group = inner
            .groups
            .get(id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("group {}", id)))?;

        if let Some(name) = patch.name {
            group.name = name;
        }
        if let Some(description) = patch.description {
            group.description = description;
        }
        if let Some(program_id) = patch.program_id {
            group.program_id = program_id;
        }
        if let Some(member_ids) = patch.member_ids {
            group.member_ids = member_ids;
        }
        inner.check_references(group.program_id.as_deref(), &group.member_ids)?;
        group.updated_at = inner.now();

        let detail = inner.detail(&group);
        inner.groups.insert(group.id.clone(), group);
        Ok(detail)
    }

    async fn delete_group(&self, id: &str) -> Result<(), RepoError> {
        self.lock()?
            .groups
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepoError::NotFound(format!("group {}", id)))
    }

    async fn find_program(&self, id: &str) -> Result<Option<ProgramSummary>, RepoError> {
        Ok(self.lock()?.programs.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(id: &str, email: Option<&str>) -> NewUser {
        NewUser {
            id: id.to_string(),
            email: email.map(str::to_string),
            display_name: Some(format!("User {}", id)),
            student_alias: None,
            role: Role::Member,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let store = MemoryStore::new();
        store.create(new_user("a", Some("a@x.com"))).await.unwrap();

        let err = store.create(new_user("b", Some("a@x.com"))).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_email_keys_ignore_case() {
        let store = MemoryStore::new();
        let created = store.create(new_user("old1", Some(" A@X.com"))).await.unwrap();
        assert_eq!(created.email.as_deref(), Some("a@x.com"));

        let found = store.find_by_email("a@X.COM").await.unwrap().unwrap();
        assert_eq!(found.id, "old1");

        let err = store.create(new_user("abc", Some("a@x.com"))).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_profile_applies_role_with_fields() {
        let store = MemoryStore::new();
        store.create(new_user("a", None)).await.unwrap();

        let updated = store
            .update_profile(
                "a",
                ProfileUpdate {
                    display_name: Some("Ana".to_string()),
                    role: Some(Role::Coach),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Ana"));
        assert_eq!(updated.role, Role::Coach);
    }

    #[tokio::test]
    async fn test_users_without_email_do_not_collide() {
        let store = MemoryStore::new();
        store.create(new_user("a", None)).await.unwrap();
        store.create(new_user("b", None)).await.unwrap();
        assert_eq!(store.user_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_id_moves_group_membership() {
        let store = MemoryStore::new();
        store.create(new_user("old1", Some("a@x.com"))).await.unwrap();
        let group = store
            .create_group(NewGroup {
                name: "Juniors".to_string(),
                description: None,
                program_id: None,
                member_ids: vec!["old1".to_string()],
            })
            .await
            .unwrap();

        store.update_id("old1", "abc").await.unwrap();

        let group = store.find_group(&group.id).await.unwrap().unwrap();
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].id, "abc");
        assert!(store.find_by_id("old1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_id_conflict_leaves_record_untouched() {
        let store = MemoryStore::new();
        store.create(new_user("old1", Some("a@x.com"))).await.unwrap();
        store.create(new_user("abc", None)).await.unwrap();

        let err = store.update_id("old1", "abc").await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
        assert!(store.find_by_id("old1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_group_requires_existing_program() {
        let store = MemoryStore::new();
        let err = store
            .create_group(NewGroup {
                name: "Seniors".to_string(),
                description: None,
                program_id: Some("missing".to_string()),
                member_ids: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_update_group_clears_program() {
        let store = MemoryStore::new();
        store.insert_program("p1", "Opening repertoire").unwrap();
        let group = store
            .create_group(NewGroup {
                name: "Club".to_string(),
                description: Some("Saturday".to_string()),
                program_id: Some("p1".to_string()),
                member_ids: vec![],
            })
            .await
            .unwrap();
        assert_eq!(group.program.as_ref().unwrap().title, "Opening repertoire");

        let updated = store
            .update_group(
                &group.id,
                GroupPatch {
                    program_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.program.is_none());
        assert_eq!(updated.description.as_deref(), Some("Saturday"));
    }
}
