//! Runtime settings for the two external services the crate talks to.
//!
//! Settings can be loaded either from a TOML file (`[authority]` and
//! `[classifier]` tables) or from environment variables, with `.env` support
//! via `dotenvy`. Credentials have no defaults; endpoints for the tax
//! authority have no defaults either because the crate is not tied to one
//! authority's hostnames.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

fn default_timeout_secs() -> u64 {
    30
}

fn default_classifier_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Top-level settings structure, mirroring the TOML file layout.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Tax authority API and OAuth2 endpoints
    pub authority: AuthoritySettings,
    /// Chat-completion classifier endpoint
    pub classifier: ClassifierSettings,
}

/// Connection details for the tax authority.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthoritySettings {
    /// Base URL for submission endpoints
    pub base_url: String,
    /// OAuth2 token endpoint URL
    pub token_url: String,
    /// OAuth2 client id issued by the authority
    pub client_id: String,
    /// OAuth2 client secret issued by the authority
    pub client_secret: String,
    /// Redirect URI registered for the authorization-code flow
    pub redirect_uri: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Connection details for the transaction classifier.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    /// Base URL of an OpenAI-compatible chat completion API
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    /// API key sent as a bearer credential
    pub api_key: String,
    /// Model name to request
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read settings file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings file: {e}"),
    })
}

/// Loads settings from environment variables, reading `.env` first if present.
///
/// Required: `AUTHORITY_BASE_URL`, `AUTHORITY_TOKEN_URL`, `AUTHORITY_CLIENT_ID`,
/// `AUTHORITY_CLIENT_SECRET`, `AUTHORITY_REDIRECT_URI`, `CLASSIFIER_API_KEY`.
/// Optional: `CLASSIFIER_BASE_URL`, `CLASSIFIER_MODEL`, `AUTHORITY_TIMEOUT_SECS`,
/// `CLASSIFIER_TIMEOUT_SECS`.
///
/// # Errors
/// Returns an error if a required variable is missing or a timeout is not an
/// integer.
pub fn from_env() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Ok(Settings {
        authority: AuthoritySettings {
            base_url: required_var("AUTHORITY_BASE_URL")?,
            token_url: required_var("AUTHORITY_TOKEN_URL")?,
            client_id: required_var("AUTHORITY_CLIENT_ID")?,
            client_secret: required_var("AUTHORITY_CLIENT_SECRET")?,
            redirect_uri: required_var("AUTHORITY_REDIRECT_URI")?,
            timeout_secs: timeout_var("AUTHORITY_TIMEOUT_SECS")?,
        },
        classifier: ClassifierSettings {
            base_url: std::env::var("CLASSIFIER_BASE_URL")
                .unwrap_or_else(|_| default_classifier_base_url()),
            api_key: required_var("CLASSIFIER_API_KEY")?,
            model: std::env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| default_classifier_model()),
            timeout_secs: timeout_var("CLASSIFIER_TIMEOUT_SECS")?,
        },
    })
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config {
        message: format!("{name} is not set"),
    })
}

fn timeout_var(name: &str) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| Error::Config {
            message: format!("{name} is not an integer: {raw}"),
        }),
        Err(_) => Ok(default_timeout_secs()),
    }
}
