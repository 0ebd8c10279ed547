// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User administration routes.

use super::deserialize_some;
use crate::error::{AppError, Result};
use crate::middleware::require_role;
use crate::models::{NewUser, Principal, ProfileUpdate, Role, UserRecord};
use crate::services::SyncStatus;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const STAFF: &[Role] = &[Role::Admin, Role::Coach];

/// User routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/students", get(list_student_names))
        .route("/api/users/{id}", get(get_user).put(update_user))
}

// ─── Listing ─────────────────────────────────────────────────

/// All users, newest first.
async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<UserRecord>>> {
    require_role(&state, &principal, STAFF).await?;
    Ok(Json(state.users.list().await?))
}

/// Sorted, de-duplicated names usable as student labels.
async fn list_student_names(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<String>>> {
    require_role(&state, &principal, STAFF).await?;

    let names: BTreeSet<String> = state
        .users
        .list()
        .await?
        .into_iter()
        .flat_map(|u| [u.student_alias, u.display_name])
        .flatten()
        .filter(|name| !name.is_empty())
        .collect();

    Ok(Json(names.into_iter().collect()))
}

// ─── Creation ────────────────────────────────────────────────

/// Staff-created user, not yet linked to a provider identity.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    #[validate(email(message = "A valid email address is required"))]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CreateUserResponse {
    pub message: String,
    pub user: UserRecord,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>)> {
    let actor = require_role(&state, &principal, STAFF).await?;
    request.validate()?;

    let new_user = NewUser::with_generated_id(
        request.name,
        request.student_name.filter(|s| !s.is_empty()),
        request.email,
        request.role,
    );
    let user = state.users.create(new_user).await.map_err(|e| match e {
        crate::db::RepoError::Conflict(_) => {
            AppError::Conflict("Email address is already in use".to_string())
        }
        other => other.into(),
    })?;

    tracing::info!(user_id = %user.id, role = %user.role, actor = %actor.id, "User created");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            message: "User created".to_string(),
            user,
        }),
    ))
}

// ─── Single User ─────────────────────────────────────────────

/// Fetch one user. Callers reading their own id go through
/// reconciliation, so the first request after sign-in links the record.
async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<UserRecord>> {
    if id == principal.provider_id {
        let user = state.reconciler.resolve_self(&id, &principal).await?;
        return Ok(Json(user));
    }

    require_role(&state, &principal, &[Role::Admin]).await?;

    let user = state
        .users
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
    Ok(Json(user))
}

/// Partial update. Absent fields are untouched; `studentName: null` clears.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub student_name: Option<Option<String>>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpdateUserResponse {
    pub message: String,
    pub user: UserRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>> {
    require_role(&state, &principal, &[Role::Admin]).await?;
    request.validate()?;

    let profile = ProfileUpdate {
        display_name: request.name,
        student_alias: request.student_name,
        role: None,
    };

    let Some(role) = request.role else {
        let user = if profile.is_empty() {
            state
                .users
                .find_by_id(&id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?
        } else {
            state.users.update_profile(&id, profile).await?
        };

        return Ok(Json(UpdateUserResponse {
            message: "User updated".to_string(),
            user,
            sync: None,
            warning: None,
        }));
    };

    // Profile fields and role commit together.
    let update = state
        .reconciler
        .update_profile_and_sync(&id, profile, role, &principal)
        .await?;
    let warning = update.warning().map(str::to_string);
    let message = if warning.is_some() {
        "User updated (database only)"
    } else {
        "User updated"
    };

    Ok(Json(UpdateUserResponse {
        message: message.to_string(),
        user: update.user,
        sync: Some(update.sync),
        warning,
    }))
}
