// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity reconciliation between user records and provider identities.
//!
//! Two operations:
//! - [`ReconciliationService::resolve_self`] finds (or adopts, or creates)
//!   the caller's own user record, migrating a staff-created record's key to
//!   the provider id on first sign-in.
//! - [`ReconciliationService::set_role_and_sync`] writes a role change to the
//!   database and then mirrors it into provider metadata.
//!
//! The database is authoritative for roles. The provider mirror only shapes
//! claims of freshly issued sessions, so its failures are reported as a
//! [`SyncStatus`] and never undo the database write.

use crate::db::{RepoError, UserRepository};
use crate::models::{NewUser, Principal, ProfileUpdate, Role, UserRecord};
use crate::services::identity::{merge_metadata, IdentityError, IdentityProvider};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Reconciliation failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(RepoError),
}

impl From<RepoError> for ReconcileError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => ReconcileError::NotFound(what),
            other => ReconcileError::Store(other),
        }
    }
}

/// Outcome of mirroring a role into provider metadata.
///
/// Every variant follows a committed database write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SyncStatus {
    /// Metadata written to the identity with the same id.
    Synced,
    /// Metadata written to an identity found by email whose id differs
    /// from the record id.
    IdMismatchSynced,
    /// No identity by id or email; nothing written.
    IdentityNotFound,
    /// Provider lookup or write failed.
    SyncError,
    /// No provider admin credentials configured.
    NotConfigured,
}

impl SyncStatus {
    /// Advisory message for callers, `None` when fully synced.
    pub fn warning(&self) -> Option<&'static str> {
        match self {
            SyncStatus::Synced => None,
            SyncStatus::IdMismatchSynced => Some(
                "Identity found by email under a different id; metadata updated there",
            ),
            SyncStatus::IdentityNotFound => Some(
                "User has no identity provider account yet; metadata not updated until first sign-in",
            ),
            SyncStatus::SyncError => {
                Some("Role saved, but identity provider metadata could not be updated")
            }
            SyncStatus::NotConfigured => {
                Some("Identity provider admin access not configured; metadata not updated")
            }
        }
    }
}

/// Result of a role change.
#[derive(Debug, Clone)]
pub struct RoleUpdate {
    /// Record as committed, always carrying the new role.
    pub user: UserRecord,
    pub sync: SyncStatus,
}

impl RoleUpdate {
    pub fn warning(&self) -> Option<&'static str> {
        self.sync.warning()
    }
}

/// Aligns user records with provider identities.
#[derive(Clone)]
pub struct ReconciliationService {
    users: Arc<dyn UserRepository>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl ReconciliationService {
    /// `identity` is `None` when the provider admin API is not configured;
    /// role changes then report [`SyncStatus::NotConfigured`].
    pub fn new(
        users: Arc<dyn UserRepository>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self { users, identity }
    }

    /// Return the caller's own record, reconciling it on first sight.
    ///
    /// Order: lookup by id, then by the principal's email (migrating the
    /// found record's key to `requested_id`), then creation as MEMBER. At
    /// most one write happens. A principal may only resolve itself.
    pub async fn resolve_self(
        &self,
        requested_id: &str,
        principal: &Principal,
    ) -> Result<UserRecord, ReconcileError> {
        if principal.provider_id.is_empty() {
            return Err(ReconcileError::Unauthenticated);
        }
        if requested_id != principal.provider_id {
            return Err(ReconcileError::Forbidden(format!(
                "{} cannot reconcile {}",
                principal.provider_id, requested_id
            )));
        }

        if let Some(user) = self.users.find_by_id(requested_id).await? {
            return Ok(user);
        }

        let Some(email) = principal.email.as_deref() else {
            tracing::debug!(user_id = %requested_id, "No record and no email to reconcile by");
            return Err(ReconcileError::NotFound(requested_id.to_string()));
        };

        if let Some(existing) = self.users.find_by_email(email).await? {
            if existing.id == requested_id {
                return Ok(existing);
            }
            return self.migrate_id(existing, requested_id).await;
        }

        self.create_member(requested_id, email, principal).await
    }

    /// Move a pre-existing record onto the provider id.
    async fn migrate_id(
        &self,
        existing: UserRecord,
        requested_id: &str,
    ) -> Result<UserRecord, ReconcileError> {
        match self.users.update_id(&existing.id, requested_id).await {
            Ok(migrated) => {
                tracing::info!(
                    old_id = %existing.id,
                    new_id = %requested_id,
                    "Migrated user record to identity provider id"
                );
                Ok(migrated)
            }
            Err(RepoError::Conflict(reason)) => {
                // Another record owns the provider id; serve the unmigrated one.
                tracing::warn!(
                    old_id = %existing.id,
                    new_id = %requested_id,
                    reason = %reason,
                    "User id migration conflicted, returning existing record"
                );
                Ok(existing)
            }
            Err(RepoError::NotFound(_)) => {
                // A concurrent request migrated it first.
                Ok(self
                    .users
                    .find_by_id(requested_id)
                    .await?
                    .unwrap_or(existing))
            }
            Err(err) => Err(ReconcileError::Store(err)),
        }
    }

    async fn create_member(
        &self,
        requested_id: &str,
        email: &str,
        principal: &Principal,
    ) -> Result<UserRecord, ReconcileError> {
        let new_user = NewUser {
            id: requested_id.to_string(),
            email: Some(email.to_string()),
            display_name: principal.name.clone(),
            student_alias: None,
            role: Role::Member,
        };

        match self.users.create(new_user).await {
            Ok(created) => {
                tracing::info!(user_id = %created.id, "Created user record on first sign-in");
                Ok(created)
            }
            Err(RepoError::Conflict(reason)) => {
                // Lost a creation race; the winner's row is what we want.
                tracing::debug!(user_id = %requested_id, reason = %reason, "Creation raced, re-reading");
                if let Some(user) = self.users.find_by_id(requested_id).await? {
                    return Ok(user);
                }
                if let Some(user) = self.users.find_by_email(email).await? {
                    return Ok(user);
                }
                Err(ReconcileError::Store(RepoError::Conflict(reason)))
            }
            Err(err) => Err(ReconcileError::Store(err)),
        }
    }

    /// Change a user's role, then mirror it to the identity provider.
    ///
    /// The database write must succeed; everything after it is best-effort
    /// and only affects the returned [`SyncStatus`].
    pub async fn set_role_and_sync(
        &self,
        target_id: &str,
        new_role: Role,
        actor: &Principal,
    ) -> Result<RoleUpdate, ReconcileError> {
        let user = self.users.update_role(target_id, new_role).await?;
        self.after_role_write(user, actor).await
    }

    /// Like [`Self::set_role_and_sync`], but commits profile fields and the
    /// role in a single repository write before mirroring.
    pub async fn update_profile_and_sync(
        &self,
        target_id: &str,
        update: ProfileUpdate,
        new_role: Role,
        actor: &Principal,
    ) -> Result<RoleUpdate, ReconcileError> {
        let update = ProfileUpdate {
            role: Some(new_role),
            ..update
        };
        let user = self.users.update_profile(target_id, update).await?;
        self.after_role_write(user, actor).await
    }

    async fn after_role_write(
        &self,
        user: UserRecord,
        actor: &Principal,
    ) -> Result<RoleUpdate, ReconcileError> {
        tracing::info!(
            user_id = %user.id,
            role = %user.role,
            actor = %actor.provider_id,
            "User role updated"
        );

        let sync = self.mirror_role(&user).await;
        Ok(RoleUpdate { user, sync })
    }

    async fn mirror_role(&self, user: &UserRecord) -> SyncStatus {
        let Some(provider) = self.identity.as_deref() else {
            tracing::warn!(
                user_id = %user.id,
                "Identity provider admin access not configured, skipping metadata sync"
            );
            return SyncStatus::NotConfigured;
        };

        match push_role_metadata(provider, user).await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(
                    user_id = %user.id,
                    error = %err,
                    "Failed to update identity provider metadata"
                );
                SyncStatus::SyncError
            }
        }
    }
}

/// Resolve the identity for `user` and write the merged metadata.
async fn push_role_metadata(
    provider: &dyn IdentityProvider,
    user: &UserRecord,
) -> Result<SyncStatus, IdentityError> {
    let (identity, status) = match provider.get_by_id(&user.id).await {
        Ok(identity) => (identity, SyncStatus::Synced),
        Err(IdentityError::NotFound(_)) => {
            let found = match user.email.as_deref() {
                Some(email) => provider.find_by_email(email).await?,
                None => None,
            };
            match found {
                Some(identity) => {
                    tracing::warn!(
                        user_id = %user.id,
                        provider_id = %identity.provider_id,
                        "Identity found by email under a different id"
                    );
                    (identity, SyncStatus::IdMismatchSynced)
                }
                None => {
                    tracing::warn!(
                        user_id = %user.id,
                        email = ?user.email,
                        "No identity provider account for user, role saved in database only"
                    );
                    return Ok(SyncStatus::IdentityNotFound);
                }
            }
        }
        Err(err) => return Err(err),
    };

    let merged = merge_metadata(&identity.metadata, user.role, user.display_name.as_deref());
    provider
        .update_metadata(&identity.provider_id, merged)
        .await?;

    tracing::info!(
        user_id = %user.id,
        provider_id = %identity.provider_id,
        role = %user.role,
        previous_role = ?identity.metadata_role(),
        "Identity provider metadata updated"
    );
    Ok(status)
}
