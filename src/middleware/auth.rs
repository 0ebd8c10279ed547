// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware and role gates.
//!
//! Session tokens are issued by the identity provider and verified here with
//! its shared HS256 secret. The verified caller is inserted into request
//! extensions as a [`Principal`].

use crate::error::{AppError, Result};
use crate::models::identity::{name_from_metadata, role_from_metadata};
use crate::models::{Principal, Role, UserRecord};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Cookie carrying the provider session token.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// JWT claims issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (provider identity id)
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl Claims {
    fn into_principal(self) -> Principal {
        let email = self.email.filter(|e| !e.is_empty());
        Principal {
            name: name_from_metadata(&self.user_metadata),
            metadata_role: role_from_metadata(&self.user_metadata),
            provider_id: self.sub,
            email,
        }
    }
}

/// Verify a session token and return the caller.
pub fn verify_token(token: &str, secret: &[u8], audience: &str) -> Result<Principal> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        AppError::InvalidToken
    })?;

    if token_data.claims.sub.is_empty() {
        return Err(AppError::InvalidToken);
    }

    Ok(token_data.claims.into_principal())
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.trim().to_string(),
            None => return Err(AppError::Unauthorized),
        }
    };

    let principal = verify_token(
        &token,
        &state.config.jwt_secret,
        &state.config.jwt_audience,
    )?;
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Load the caller's record and require one of `allowed` roles.
///
/// The role is always read from the database, never from token metadata,
/// which may lag a recent role change.
pub async fn require_role(
    state: &AppState,
    principal: &Principal,
    allowed: &[Role],
) -> Result<UserRecord> {
    let actor = state
        .users
        .find_by_id(&principal.provider_id)
        .await?
        .ok_or_else(|| AppError::Forbidden(format!("{} has no user record", principal.provider_id)))?;

    if !allowed.contains(&actor.role) {
        return Err(AppError::Forbidden(format!(
            "{} has role {}",
            actor.id, actor.role
        )));
    }

    Ok(actor)
}
