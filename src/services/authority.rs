//! HTTP client for the tax authority's submission and OAuth2 token
//! endpoints.
//!
//! The client never interprets response bodies: success and rejection bodies
//! travel back verbatim so the submission workflow can persist exactly what
//! the authority said. Call errors use a client-local enum; the workflow
//! layer maps them onto crate errors with submission context attached.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::settings::AuthoritySettings;
use crate::errors::{self, Error};

/// Version pin sent with every authority request.
const ACCEPT_HEADER: &str = "application/vnd.tax-authority.1.0+json";
/// Fraud-prevention header required on submission calls.
const CONNECTION_METHOD: (&str, &str) = ("Gov-Client-Connection-Method", "WEB_APP_VIA_SERVER");

/// Token endpoint response for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds from the moment of issue.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
}

/// An accepted (2xx) authority reply, body untouched.
#[derive(Debug, Clone)]
pub struct AuthorityResponse {
    pub status: u16,
    pub body: String,
}

/// Failure modes of a single authority call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorityCallError {
    /// The authority answered with a non-2xx status. The body is verbatim.
    #[error("authority rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    /// The authority could not be reached or timed out.
    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

/// Outbound seam to the authority, mockable in tests.
#[async_trait]
pub trait AuthorityApi: Send + Sync {
    /// Sends an already-serialized submission payload.
    async fn submit(
        &self,
        payload_json: &str,
        access_token: &str,
    ) -> Result<AuthorityResponse, AuthorityCallError>;

    /// Exchanges a consent-callback authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthorityCallError>;

    /// Exchanges a refresh token for a fresh grant.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthorityCallError>;
}

/// Reqwest-backed [`AuthorityApi`] implementation.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http_client: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl AuthorityClient {
    pub fn new(settings: &AuthoritySettings) -> errors::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build authority HTTP client: {e}"),
            })?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
        })
    }

    async fn request_grant(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, AuthorityCallError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthorityCallError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "token grant rejected");
            return Err(AuthorityCallError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<TokenGrant>().await.map_err(|e| {
            AuthorityCallError::Unavailable(format!("malformed token response: {e}"))
        })
    }
}

#[async_trait]
impl AuthorityApi for AuthorityClient {
    async fn submit(
        &self,
        payload_json: &str,
        access_token: &str,
    ) -> Result<AuthorityResponse, AuthorityCallError> {
        let url = format!("{}/organisations/self-assessment/submit", self.base_url);
        tracing::debug!(url = %url, "submitting to authority");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(CONNECTION_METHOD.0, CONNECTION_METHOD.1)
            .body(payload_json.to_string())
            .send()
            .await
            .map_err(|e| AuthorityCallError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = %status, "authority replied");

        if status.is_success() {
            Ok(AuthorityResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(AuthorityCallError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthorityCallError> {
        self.request_grant(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthorityCallError> {
        self.request_grant(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
