// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Handlers and services talk to storage through the [`UserRepository`] and
//! [`GroupRepository`] traits. [`PgStore`] is the production backend;
//! [`MemoryStore`] keeps the same uniqueness rules in process for tests and
//! local runs without a database.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    GroupDetail, GroupPatch, NewGroup, NewUser, ProfileUpdate, ProgramSummary, Role, UserRecord,
};
use async_trait::async_trait;

/// Repository failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepoError {
    /// A unique key (id or email) is already taken.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// A referenced program or user does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Store error: {0}")]
    Store(String),
}

/// Persistent user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    /// Insert a record. Fails with `Conflict` on a duplicate id or email.
    async fn create(&self, user: NewUser) -> Result<UserRecord, RepoError>;

    /// Change a primary key in one statement, keeping every other column.
    /// Fails with `Conflict` when `new_id` is taken.
    async fn update_id(&self, old_id: &str, new_id: &str) -> Result<UserRecord, RepoError>;

    async fn update_role(&self, id: &str, role: Role) -> Result<UserRecord, RepoError>;

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<UserRecord, RepoError>;

    /// All users, newest first.
    async fn list(&self) -> Result<Vec<UserRecord>, RepoError>;
}

/// Training groups, their members and program assignment.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// All groups, newest first.
    async fn list_groups(&self) -> Result<Vec<GroupDetail>, RepoError>;

    async fn find_group(&self, id: &str) -> Result<Option<GroupDetail>, RepoError>;

    async fn create_group(&self, group: NewGroup) -> Result<GroupDetail, RepoError>;

    async fn update_group(&self, id: &str, patch: GroupPatch) -> Result<GroupDetail, RepoError>;

    /// Delete a group; memberships go with it.
    async fn delete_group(&self, id: &str) -> Result<(), RepoError>;

    async fn find_program(&self, id: &str) -> Result<Option<ProgramSummary>, RepoError>;
}
