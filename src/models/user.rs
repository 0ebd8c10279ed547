// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Academy role. Only administrators change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Role {
    Admin,
    Coach,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Coach => "COACH",
            Role::Member => "MEMBER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "COACH" => Ok(Role::Coach),
            "MEMBER" => Ok(Role::Member),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// User row in the relational store.
///
/// `id` normally equals the identity provider's id for the same person.
/// Records created by staff before the person ever signed in carry a
/// locally generated id until reconciliation migrates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserRecord {
    pub id: String,
    /// Unique when present
    pub email: Option<String>,
    #[serde(rename = "name")]
    pub display_name: Option<String>,
    /// Secondary name used on lesson rosters
    #[serde(rename = "studentName")]
    pub student_alias: Option<String>,
    pub role: Role,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

/// Fields for a new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub student_alias: Option<String>,
    pub role: Role,
}

impl NewUser {
    /// Staff-created record with a generated id (no provider identity yet).
    pub fn with_generated_id(
        display_name: String,
        student_alias: Option<String>,
        email: Option<String>,
        role: Role,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            display_name: Some(display_name),
            student_alias,
            role,
        }
    }
}

/// Partial profile update, applied in one write. `None` leaves a field
/// untouched; `student_alias: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub student_alias: Option<Option<String>>,
    pub role: Option<Role>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.student_alias.is_none() && self.role.is_none()
    }
}

/// Canonical form of an email address as stored and looked up.
///
/// Provider accounts match emails case-insensitively, so records must too.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
