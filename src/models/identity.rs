// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider records and verified callers.

use crate::models::Role;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the mirrored academy role.
pub const METADATA_ROLE: &str = "role";
/// Metadata key holding the display name.
pub const METADATA_NAME: &str = "name";

/// Identity owned by the external provider (admin API shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    /// Provider-assigned id, immutable
    #[serde(rename = "id")]
    pub provider_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "user_metadata", default)]
    pub metadata: Map<String, Value>,
}

impl ExternalIdentity {
    pub fn metadata_role(&self) -> Option<Role> {
        role_from_metadata(&self.metadata)
    }
}

/// Verified caller for the current request, decoded from the provider's
/// session token.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub provider_id: String,
    pub email: Option<String>,
    /// Profile name from token metadata
    pub name: Option<String>,
    /// Role mirrored into token metadata. Advisory only: it can lag the
    /// database after a role change.
    pub metadata_role: Option<Role>,
}

impl Principal {
    pub fn new(provider_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            email,
            name: None,
            metadata_role: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Read the `role` key of a metadata object, ignoring unknown values.
pub fn role_from_metadata(metadata: &Map<String, Value>) -> Option<Role> {
    metadata
        .get(METADATA_ROLE)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Read the `name` key of a metadata object.
pub fn name_from_metadata(metadata: &Map<String, Value>) -> Option<String> {
    metadata
        .get(METADATA_NAME)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
