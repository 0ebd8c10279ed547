// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training group routes.

use super::deserialize_some;
use crate::error::{AppError, Result};
use crate::middleware::require_role;
use crate::models::{GroupDetail, GroupPatch, NewGroup, Principal, Role};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

/// Group routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/groups", get(list_groups).post(create_group))
        .route(
            "/api/groups/{id}",
            get(get_group).put(update_group).delete(delete_group),
        )
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, message = "Group name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Program id must not be empty"))]
    pub program_id: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

/// Partial update. `programId: null` detaches the program and `memberIds`
/// replaces the whole membership.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Group name is required"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub program_id: Option<Option<String>>,
    #[serde(default)]
    pub member_ids: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct DeleteGroupResponse {
    pub message: String,
}

/// Drop repeated ids, keeping first occurrences in order.
fn unique_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

async fn ensure_program_exists(state: &AppState, program_id: &str) -> Result<()> {
    if program_id.is_empty() {
        return Err(AppError::BadRequest(
            "Program id must not be empty".to_string(),
        ));
    }
    state
        .groups
        .find_program(program_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Program {} not found", program_id)))?;
    Ok(())
}

async fn list_groups(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<GroupDetail>>> {
    // Coaches read groups when planning lessons.
    require_role(&state, &principal, &[Role::Admin, Role::Coach]).await?;
    Ok(Json(state.groups.list_groups().await?))
}

async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupDetail>)> {
    let actor = require_role(&state, &principal, &[Role::Admin]).await?;
    request.validate()?;

    if let Some(program_id) = request.program_id.as_deref() {
        ensure_program_exists(&state, program_id).await?;
    }

    let group = state
        .groups
        .create_group(NewGroup {
            name: request.name,
            description: request.description.filter(|d| !d.is_empty()),
            program_id: request.program_id,
            member_ids: unique_ids(request.member_ids),
        })
        .await?;

    tracing::info!(
        group_id = %group.id,
        members = group.members.len(),
        actor = %actor.id,
        "Group created"
    );

    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<GroupDetail>> {
    require_role(&state, &principal, &[Role::Admin]).await?;

    let group = state
        .groups
        .find_group(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))?;
    Ok(Json(group))
}

async fn update_group(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(request): Json<UpdateGroupRequest>,
) -> Result<Json<GroupDetail>> {
    let actor = require_role(&state, &principal, &[Role::Admin]).await?;
    request.validate()?;

    if state.groups.find_group(&id).await?.is_none() {
        return Err(AppError::NotFound(format!("Group {} not found", id)));
    }
    if let Some(Some(program_id)) = request.program_id.as_ref() {
        ensure_program_exists(&state, program_id).await?;
    }

    let patch = GroupPatch {
        name: request.name,
        description: request.description,
        program_id: request.program_id,
        member_ids: request.member_ids.map(unique_ids),
    };
    let group = state.groups.update_group(&id, patch).await?;

    tracing::info!(group_id = %group.id, actor = %actor.id, "Group updated");
    Ok(Json(group))
}

async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<DeleteGroupResponse>> {
    let actor = require_role(&state, &principal, &[Role::Admin]).await?;

    state.groups.delete_group(&id).await?;

    tracing::info!(group_id = %id, actor = %actor.id, "Group deleted");
    Ok(Json(DeleteGroupResponse {
        message: "Group deleted".to_string(),
    }))
}
