//! Generative-AI boundary.
//!
//! Analysis and post-mortems treat the model as an opaque text-in /
//! text-out call. Retry policy, response parsing and fallbacks live in
//! `engine::analyst`; clients here make exactly one request per call and
//! surface failures with the provider's status and body text so that
//! rate-limit signals and suggested delays can be read from the error.

pub mod gemini;
pub mod openrouter;
pub mod prompts;

use anyhow::Result;
use async_trait::async_trait;

/// A single-shot text generation call.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}
