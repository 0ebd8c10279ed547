// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process identity directory for tests and local runs.

use super::{IdentityError, IdentityProvider};
use crate::models::ExternalIdentity;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Identity directory held in memory, with failure injection.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    identities: DashMap<String, ExternalIdentity>,
    unavailable: AtomicBool,
    metadata_writes: AtomicUsize,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an identity.
    pub fn insert(&self, identity: ExternalIdentity) {
        self.identities
            .insert(identity.provider_id.clone(), identity);
    }

    /// Register an identity with empty metadata.
    pub fn register(&self, provider_id: &str, email: Option<&str>) {
        self.insert(ExternalIdentity {
            provider_id: provider_id.to_string(),
            email: email.map(str::to_string),
            metadata: Map::new(),
        });
    }

    pub fn get(&self, provider_id: &str) -> Option<ExternalIdentity> {
        self.identities.get(provider_id).map(|e| e.value().clone())
    }

    /// Make every call fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Successful metadata writes so far.
    pub fn metadata_writes(&self) -> usize {
        self.metadata_writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Transport(
                "identity provider unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn get_by_id(&self, provider_id: &str) -> Result<ExternalIdentity, IdentityError> {
        self.check_available()?;
        self.get(provider_id)
            .ok_or_else(|| IdentityError::NotFound(provider_id.to_string()))
    }

    async fn list_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ExternalIdentity>, IdentityError> {
        self.check_available()?;

        let mut all: Vec<ExternalIdentity> =
            self.identities.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));

        let start = (page.saturating_sub(1) as usize).saturating_mul(per_page as usize);
        Ok(all
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect())
    }

    async fn update_metadata(
        &self,
        provider_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<ExternalIdentity, IdentityError> {
        self.check_available()?;

        let mut entry = self
            .identities
            .get_mut(provider_id)
            .ok_or_else(|| IdentityError::NotFound(provider_id.to_string()))?;
        entry.metadata = metadata;
        let updated = entry.value().clone();
        drop(entry);

        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}
