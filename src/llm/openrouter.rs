//! OpenRouter LLM integration.
//!
//! OpenAI-compatible chat completions behind a single API key. A request
//! that fails on the primary model for any reason other than rate
//! limiting is repeated once on the fallback model. Rate limits are
//! surfaced unchanged so the caller's backoff can handle them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::TextGenerator;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const DEFAULT_PRIMARY_MODEL: &str = "google/gemini-2.5-flash";
const DEFAULT_MAX_TOKENS: u32 = 1024;

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

/// Failure of one model call.
enum CallError {
    RateLimited(anyhow::Error),
    Other(anyhow::Error),
}

impl CallError {
    fn into_inner(self) -> anyhow::Error {
        match self {
            CallError::RateLimited(e) | CallError::Other(e) => e,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterClient {
    http: Client,
    api_key: SecretString,
    primary_model: String,
    fallback_model: Option<String>,
    max_tokens: u32,
}

impl OpenRouterClient {
    pub fn new(
        api_key: SecretString,
        primary_model: Option<String>,
        fallback_model: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            primary_model: primary_model.unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
            fallback_model,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    async fn call_model(&self, model: &str, prompt: &str) -> Result<String, CallError> {
        let request = ChatRequest {
            model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(OPENROUTER_API_URL)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("X-Title", "SmartAcca")
            .json(&request)
            .send()
            .await
            .context("OpenRouter request failed")
            .map_err(CallError::Other)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = anyhow::anyhow!("OpenRouter API error {status} (model={model}): {body}");
            return Err(if status.as_u16() == 429 {
                CallError::RateLimited(err)
            } else {
                CallError::Other(err)
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenRouter response")
            .map_err(CallError::Other)?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(CallError::Other(anyhow::anyhow!(
                "OpenRouter returned an empty response (model={model})"
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.primary_model, "OpenRouter request");

        match self.call_model(&self.primary_model, prompt).await {
            Ok(text) => Ok(text),
            Err(CallError::RateLimited(e)) => Err(e),
            Err(CallError::Other(primary_err)) => {
                let Some(fallback) = self.fallback_model.as_deref() else {
                    return Err(primary_err);
                };
                warn!(
                    primary = %self.primary_model,
                    fallback,
                    error = %primary_err,
                    "Primary model failed, falling back"
                );
                self.call_model(fallback, prompt)
                    .await
                    .map_err(CallError::into_inner)
                    .with_context(|| {
                        format!(
                            "Both primary ({}) and fallback ({fallback}) models failed. Primary error: {primary_err}",
                            self.primary_model
                        )
                    })
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.primary_model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
