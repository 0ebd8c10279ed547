// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Only the token secret is required. Without `DATABASE_URL` the server runs
//! on the in-memory store, and without the auth admin credentials role
//! changes are saved but not mirrored to the identity provider.

use std::env;

const DEFAULT_AUDIENCE: &str = "authenticated";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_PORT: u16 = 8080;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend origin allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Expected `aud` claim of session tokens
    pub jwt_audience: String,
    /// Identity provider base URL (e.g. `https://xyz.supabase.co`)
    pub auth_url: Option<String>,

    // --- Secrets ---
    /// HS256 secret the identity provider signs session tokens with
    pub jwt_secret: Vec<u8>,
    /// Service-role key for the provider admin API
    pub service_role_key: Option<String>,
    /// PostgreSQL connection string
    pub database_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port = match optional_var("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid("PORT", raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            frontend_url: optional_var("FRONTEND_URL")
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            port,
            jwt_audience: optional_var("AUTH_JWT_AUDIENCE")
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            auth_url: optional_var("AUTH_URL"),
            jwt_secret: optional_var("AUTH_JWT_SECRET")
                .ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?
                .into_bytes(),
            service_role_key: optional_var("AUTH_SERVICE_ROLE_KEY"),
            database_url: optional_var("DATABASE_URL"),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            port: DEFAULT_PORT,
            jwt_audience: DEFAULT_AUDIENCE.to_string(),
            auth_url: None,
            jwt_secret: b"test_jwt_secret_32_bytes_minimum!!".to_vec(),
            service_role_key: None,
            database_url: None,
        }
    }

    /// Provider admin endpoint and key, when both are configured.
    pub fn identity_admin(&self) -> Option<(&str, &str)> {
        match (&self.auth_url, &self.service_role_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Trimmed value of a variable, treating empty as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
