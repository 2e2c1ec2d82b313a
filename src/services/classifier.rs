//! Chat-completion classifier client.
//!
//! The classifier is a black box behind the [`Classifier`] trait: it receives
//! canonical rows and returns raw model text. All contract enforcement
//! (array shape, row count, vocabulary) lives in [`crate::core::categorize`];
//! this module only moves bytes and reports transport problems.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::settings::ClassifierSettings;
use crate::core::categories::TaxContext;
use crate::core::normalize::CanonicalRow;
use crate::errors::{Error, Result};

const TEMPERATURE: f32 = 0.2;

/// Suggests a category for every row of a batch, in one call.
///
/// Implementations return the model's raw text; they must not attempt to
/// parse or repair it.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, rows: &[CanonicalRow], context: TaxContext) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Builds the instruction prompt for one batch.
///
/// The allowed category list comes from the context's vocabulary, so the
/// model never sees categories it is not permitted to use.
pub fn build_prompt(rows: &[CanonicalRow], context: TaxContext) -> Result<String> {
    let rows_json = serde_json::to_string_pretty(rows)?;
    let allowed = context.vocabulary().join(", ");

    Ok(format!(
        "You will be given a list of transactions as JSON.\n\
         For each transaction, output a JSON object with these fields:\n\
         - date (YYYY-MM-DD or null)\n\
         - description (string)\n\
         - amount (number, 2 decimal places)\n\
         - direction (\"income\" or \"expense\")\n\
         - category (one of: {allowed})\n\n\
         Strictly use only the allowed values for category.\n\
         Output a valid JSON array with exactly one object per input \
         transaction, in input order. No explanations, no markdown.\n\n\
         Transactions:\n{rows_json}"
    ))
}

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpClassifier {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpClassifier {
    pub fn new(settings: &ClassifierSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Config {
                message: format!("could not build classifier HTTP client: {e}"),
            })?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, rows: &[CanonicalRow], context: TaxContext) -> Result<String> {
        let prompt = build_prompt(rows, context)?;
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a helpful assistant for tax categorization.",
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: TEMPERATURE,
        };

        tracing::debug!(
            rows = rows.len(),
            context = context.as_str(),
            model = %self.model,
            "requesting classification"
        );

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ClassifierUnavailable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::ClassifierUnavailable {
                reason: format!("HTTP {status}: {error_text}"),
            });
        }

        let completion: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| Error::ClassifierUnavailable {
                    reason: format!("malformed completion response: {e}"),
                })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::ClassifierUnavailable {
                reason: "completion had no choices".to_string(),
            })?;

        tracing::debug!(chars = content.len(), "classification response received");
        Ok(content)
    }
}
