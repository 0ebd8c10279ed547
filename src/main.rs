// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Academy API Server
//!
//! Administrative backend for users, roles and training groups, with
//! sign-in delegated to an external identity provider.

use academy_api::{
    config::Config,
    db::{GroupRepository, MemoryStore, PgStore, UserRepository},
    services::{GoTrueAdminClient, IdentityProvider},
    AppState,
};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(port = config.port, "Starting Academy API");

    let (users, groups): (Arc<dyn UserRepository>, Arc<dyn GroupRepository>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let store = PgStore::connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                store.migrate().await.context("Failed to run migrations")?;
                tracing::info!("PostgreSQL store ready");
                let store = Arc::new(store);
                (store.clone() as Arc<dyn UserRepository>, store as Arc<dyn GroupRepository>)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn UserRepository>, store as Arc<dyn GroupRepository>)
            }
        };

    let identity: Option<Arc<dyn IdentityProvider>> = match config.identity_admin() {
        Some((auth_url, key)) => {
            let client = GoTrueAdminClient::new(auth_url, key)?;
            tracing::info!(auth_url = %auth_url, "Identity provider admin client initialized");
            Some(Arc::new(client) as Arc<dyn IdentityProvider>)
        }
        None => {
            tracing::warn!("Identity provider admin access not configured, role sync disabled");
            None
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), users, groups, identity));

    // Build router
    let app = academy_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("academy_api=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
