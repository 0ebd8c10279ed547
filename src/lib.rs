// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Academy API: administrative backend for a training academy.
//!
//! Manages users, roles and training groups, and keeps each user record
//! aligned with the external identity provider that handles sign-in.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::{GroupRepository, UserRepository};
use services::{IdentityProvider, ReconciliationService};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub reconciler: ReconciliationService,
}

impl AppState {
    /// Wire the state from its stores and optional provider admin client.
    pub fn new(
        config: Config,
        users: Arc<dyn UserRepository>,
        groups: Arc<dyn GroupRepository>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let reconciler = ReconciliationService::new(users.clone(), identity);
        Self {
            config,
            users,
            groups,
            reconciler,
        }
    }
}
