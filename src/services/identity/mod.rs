// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External identity provider access.
//!
//! The provider owns sign-in and per-identity metadata. This service only
//! reads identities and mirrors the academy role into their metadata.

pub mod gotrue;
pub mod memory;

pub use gotrue::GoTrueAdminClient;
pub use memory::MemoryIdentityProvider;

use crate::models::identity::{METADATA_NAME, METADATA_ROLE};
use crate::models::{ExternalIdentity, Role};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Page size used when scanning the directory for an email.
pub const DIRECTORY_PAGE_SIZE: u32 = 50;
/// Upper bound on pages scanned by the default email lookup.
const MAX_DIRECTORY_PAGES: u32 = 200;

/// Identity provider failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    /// The provider answered and has no such identity.
    #[error("Identity not found: {0}")]
    NotFound(String),

    /// The request never produced a usable answer.
    #[error("Identity provider transport error: {0}")]
    Transport(String),

    /// The provider rejected the request.
    #[error("Identity provider API error: {0}")]
    Api(String),
}

/// Administrative view of the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch one identity. A missing identity is `IdentityError::NotFound`.
    async fn get_by_id(&self, provider_id: &str) -> Result<ExternalIdentity, IdentityError>;

    /// One page of the directory, 1-indexed.
    async fn list_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ExternalIdentity>, IdentityError>;

    /// Find the identity registered under `email`.
    ///
    /// The default pages through [`IdentityProvider::list_page`] and stops
    /// at the first match or a short page. Providers with an indexed email
    /// lookup should override it.
    async fn find_by_email(&self, email: &str) -> Result<Option<ExternalIdentity>, IdentityError> {
        for page in 1..=MAX_DIRECTORY_PAGES {
            let batch = self.list_page(page, DIRECTORY_PAGE_SIZE).await?;
            let short_page = batch.len() < DIRECTORY_PAGE_SIZE as usize;

            if let Some(found) = batch.into_iter().find(|identity| {
                identity
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            }) {
                return Ok(Some(found));
            }
            if short_page {
                return Ok(None);
            }
        }

        tracing::warn!(
            pages = MAX_DIRECTORY_PAGES,
            "Directory scan hit page limit without finding email"
        );
        Ok(None)
    }

    /// Replace an identity's metadata object.
    async fn update_metadata(
        &self,
        provider_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<ExternalIdentity, IdentityError>;
}

/// Build the metadata to write back after a role change.
///
/// Starts from the metadata just read, keeps unrelated keys, sets `role`,
/// and sets `name` from the user record. Without a record name the existing
/// `name` stays as it was.
pub fn merge_metadata(
    existing: &Map<String, Value>,
    role: Role,
    display_name: Option<&str>,
) -> Map<String, Value> {
    let mut merged = existing.clone();
    merged.insert(
        METADATA_ROLE.to_string(),
        Value::String(role.as_str().to_string()),
    );
    if let Some(name) = display_name {
        merged.insert(METADATA_NAME.to_string(), Value::String(name.to_string()));
    }
    merged
}
