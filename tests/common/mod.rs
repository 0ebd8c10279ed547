// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use academy_api::config::Config;
use academy_api::db::{MemoryStore, PgStore, UserRepository};
use academy_api::models::{NewUser, Role, UserRecord};
use academy_api::routes::create_router;
use academy_api::services::{IdentityProvider, MemoryIdentityProvider};
use academy_api::AppState;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

/// PostgreSQL URL for integration tests, if one is configured.
#[allow(dead_code)]
pub fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

/// Skip test with message if no database is configured.
#[macro_export]
macro_rules! require_database {
    () => {
        if crate::common::database_url().is_none() {
            eprintln!("⚠️  Skipping: DATABASE_URL not set");
            return;
        }
    };
}

/// Connect to the test database and apply migrations.
#[allow(dead_code)]
pub async fn test_pg_store() -> PgStore {
    let url = database_url().expect("DATABASE_URL not set");
    let store = PgStore::connect(&url)
        .await
        .expect("Failed to connect to test database");
    store.migrate().await.expect("Failed to run migrations");
    store
}

/// Router plus handles on its in-memory backends.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub provider: Arc<MemoryIdentityProvider>,
}

/// Create a test app with an in-memory store and identity provider.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    build_app(true)
}

/// Create a test app without identity provider admin access.
#[allow(dead_code)]
pub fn create_test_app_without_provider() -> TestApp {
    build_app(false)
}

fn build_app(with_provider: bool) -> TestApp {
    let config = Config::test_default();
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(MemoryIdentityProvider::new());
    let identity: Option<Arc<dyn IdentityProvider>> = if with_provider {
        Some(provider.clone() as Arc<dyn IdentityProvider>)
    } else {
        None
    };

    let state = Arc::new(AppState::new(config, store.clone(), store.clone(), identity));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        provider,
    }
}

/// Create a session token the way the identity provider would.
#[allow(dead_code)]
pub fn create_test_jwt(sub: &str, email: Option<&str>, metadata: Value) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let mut claims = serde_json::json!({
        "sub": sub,
        "aud": "authenticated",
        "iat": now,
        "exp": now + 3600,
        "user_metadata": metadata,
    });
    if let Some(email) = email {
        claims["email"] = Value::String(email.to_string());
    }

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&Config::test_default().jwt_secret),
    )
    .unwrap()
}

/// Token with an email and empty metadata.
#[allow(dead_code)]
pub fn token_for(sub: &str, email: &str) -> String {
    create_test_jwt(sub, Some(email), serde_json::json!({}))
}

/// Insert a user record directly.
#[allow(dead_code)]
pub async fn seed_user(store: &MemoryStore, id: &str, email: Option<&str>, role: Role) -> UserRecord {
    store
        .create(NewUser {
            id: id.to_string(),
            email: email.map(str::to_string),
            display_name: Some(format!("User {}", id)),
            student_alias: None,
            role,
        })
        .await
        .unwrap()
}

/// Send one request with a bearer token and optional JSON body.
#[allow(dead_code)]
pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));

    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
