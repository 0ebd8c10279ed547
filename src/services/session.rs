// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session user resolution for the signed-in caller.

use super::reconcile::ReconciliationService;
use crate::models::{Principal, Role, UserRecord};
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where the session role came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum SessionSource {
    Database,
    Metadata,
}

/// The caller as the frontend sees it.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub source: SessionSource,
}

impl SessionUser {
    fn from_record(principal: &Principal, record: UserRecord) -> Self {
        Self {
            id: principal.provider_id.clone(),
            email: principal.email.clone().unwrap_or_default(),
            name: record.display_name.or_else(|| principal.name.clone()),
            role: record.role,
            source: SessionSource::Database,
        }
    }

    fn from_metadata(principal: &Principal) -> Self {
        Self {
            id: principal.provider_id.clone(),
            email: principal.email.clone().unwrap_or_default(),
            name: principal.name.clone(),
            role: principal.metadata_role.unwrap_or_default(),
            source: SessionSource::Metadata,
        }
    }
}

/// Resolve the caller's session user.
///
/// Never fails: when the record cannot be resolved, the token's metadata
/// stands in for it.
pub async fn session_user(
    reconciler: &ReconciliationService,
    principal: &Principal,
) -> SessionUser {
    match reconciler
        .resolve_self(&principal.provider_id, principal)
        .await
    {
        Ok(record) => SessionUser::from_record(principal, record),
        Err(err) => {
            tracing::warn!(
                user_id = %principal.provider_id,
                error = %err,
                "Falling back to token metadata for session user"
            );
            SessionUser::from_metadata(principal)
        }
    }
}
