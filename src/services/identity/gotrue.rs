// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin API client for a GoTrue-compatible auth server.
//!
//! Handles:
//! - Identity lookup by id (`GET /admin/users/{id}`)
//! - Paginated directory listing (`GET /admin/users`)
//! - Metadata writes (`PUT /admin/users/{id}`)
//!
//! Every call authenticates with the service-role key.

use super::{IdentityError, IdentityProvider};
use crate::models::ExternalIdentity;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_NOT_FOUND_CODE: &str = "user_not_found";

/// GoTrue admin API client.
#[derive(Clone)]
pub struct GoTrueAdminClient {
    http: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

impl GoTrueAdminClient {
    /// Create a client for the project at `auth_url` (e.g.
    /// `https://xyz.supabase.co`).
    pub fn new(auth_url: &str, service_role_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building identity provider HTTP client")?;

        Ok(Self {
            http,
            base_url: format!("{}/auth/v1", auth_url.trim_end_matches('/')),
            service_role_key: service_role_key.into(),
        })
    }

    fn user_url(&self, provider_id: &str) -> String {
        format!(
            "{}/admin/users/{}",
            self.base_url,
            urlencoding::encode(provider_id)
        )
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        subject: &str,
    ) -> Result<T, IdentityError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body, subject));
        }

        response
            .json()
            .await
            .map_err(|e| IdentityError::Transport(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueAdminClient {
    async fn get_by_id(&self, provider_id: &str) -> Result<ExternalIdentity, IdentityError> {
        let response = self
            .authorized(self.http.get(self.user_url(provider_id)))
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        self.check_response_json(response, provider_id).await
    }

    async fn list_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ExternalIdentity>, IdentityError> {
        let url = format!("{}/admin/users", self.base_url);

        let response = self
            .authorized(self.http.get(&url))
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let listing: UserListing = self.check_response_json(response, "directory").await?;
        tracing::debug!(page, count = listing.users.len(), "Fetched identity directory page");
        Ok(listing.users)
    }

    async fn update_metadata(
        &self,
        provider_id: &str,
        metadata: Map<String, Value>,
    ) -> Result<ExternalIdentity, IdentityError> {
        let body = serde_json::json!({ "user_metadata": metadata });

        let response = self
            .authorized(self.http.put(self.user_url(provider_id)))
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        self.check_response_json(response, provider_id).await
    }
}

/// Directory listing envelope.
#[derive(Debug, Deserialize)]
struct UserListing {
    #[serde(default)]
    users: Vec<ExternalIdentity>,
}

/// Error body returned by the admin API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a failed response to an error, keeping "no such identity" apart
/// from every other failure.
fn classify_error(status: StatusCode, body: &str, subject: &str) -> IdentityError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    if status == StatusCode::NOT_FOUND
        || parsed.error_code.as_deref() == Some(USER_NOT_FOUND_CODE)
    {
        return IdentityError::NotFound(subject.to_string());
    }

    let detail = parsed
        .msg
        .or(parsed.message)
        .unwrap_or_else(|| body.to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(%status, "Identity provider unavailable");
        return IdentityError::Transport(format!("HTTP {}: {}", status, detail));
    }

    IdentityError::Api(format!("HTTP {}: {}", status, detail))
}
