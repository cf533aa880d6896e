//! AI match analysis with bounded retries.
//!
//! `RetryPolicy::next_step` is the pure retry state machine: given the
//! attempt that just failed and its error text it decides between
//! sleeping and giving up. `RetryExecutor` drives a `TextGenerator`
//! through it, and `MatchAnalyst` turns the reply into a `MatchAnalysis`,
//! degrading to fixed fallbacks instead of failing.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::llm::prompts;
use crate::llm::TextGenerator;
use crate::types::{Fixture, MatchAnalysis, MatchRecord, RiskLevel, NO_BET};

/// Characters of raw reply kept as rationale when the reply is not JSON.
const RAW_RATIONALE_CHARS: usize = 200;

static RETRY_DELAY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)retry in (\d+(?:\.\d+)?)s",
        r#"(?i)retryDelay['"]:\s*['"](\d+(?:\.\d+)?)s?['"]"#,
        r"(?i)Please retry in (\d+(?:\.\d+)?)s",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// ---------------------------------------------------------------------------
// Retry state machine
// ---------------------------------------------------------------------------

/// Whether an error looks like rate limiting or quota exhaustion.
pub fn is_rate_limited(error_text: &str) -> bool {
    error_text.contains("429")
        || error_text.contains("RESOURCE_EXHAUSTED")
        || error_text.to_lowercase().contains("quota")
}

/// Server-suggested wait in seconds, if the error text carries one.
pub fn suggested_delay(error_text: &str) -> Option<f64> {
    RETRY_DELAY_PATTERNS.iter().find_map(|re| {
        re.captures(error_text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStep {
    /// Sleep for this long, then try again.
    Retry(Duration),
    /// Stop; the string explains why.
    GiveUp(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Added to a server-suggested delay.
    pub suggested_buffer: Duration,
    /// Upper bound on backoff jitter.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            suggested_buffer: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry number `retry` (1-based):
    /// `base * 2^retry` plus `jitter_unit` (in [0, 1)) of a jitter window
    /// that is 10% of the delay, capped at `max_jitter`.
    pub fn backoff(&self, retry: u32, jitter_unit: f64) -> Duration {
        let delay = self.base_delay.as_secs_f64() * 2f64.powi(retry as i32);
        let window = (delay * 0.1).min(self.max_jitter.as_secs_f64());
        Duration::from_secs_f64(delay + window * jitter_unit.clamp(0.0, 1.0))
    }

    /// Decide what follows the failure of `attempt` (0-based).
    pub fn next_step(&self, attempt: u32, error_text: &str, jitter_unit: f64) -> RetryStep {
        if !is_rate_limited(error_text) {
            return RetryStep::GiveUp(format!("Analysis error: {error_text}"));
        }
        if attempt >= self.max_retries {
            return RetryStep::GiveUp(format!(
                "Rate limit exceeded after {} retries",
                self.max_retries
            ));
        }
        // A delay too large for a Duration is treated as absent.
        let suggested = suggested_delay(error_text)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .and_then(|delay| delay.checked_add(self.suggested_buffer));
        RetryStep::Retry(suggested.unwrap_or_else(|| self.backoff(attempt + 1, jitter_unit)))
    }
}

/// Injectable sleep, so retry timing can be observed in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs a generator call under a `RetryPolicy`.
pub struct RetryExecutor {
    generator: Arc<dyn TextGenerator>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(generator: Arc<dyn TextGenerator>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            sleeper,
            policy,
        }
    }

    /// Reply text, or the give-up reason as the error.
    pub async fn run(&self, prompt: &str, label: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.generator.generate(prompt).await {
                Ok(text) => {
                    info!(label, attempt = attempt + 1, "AI call succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    let text = format!("{e:#}");
                    let jitter_unit: f64 = rand::random();
                    match self.policy.next_step(attempt, &text, jitter_unit) {
                        RetryStep::Retry(delay) => {
                            warn!(
                                label,
                                attempt = attempt + 1,
                                of = self.policy.max_retries + 1,
                                delay_secs = format!("{:.1}", delay.as_secs_f64()),
                                "Rate limited, retrying"
                            );
                            self.sleeper.sleep(delay).await;
                            attempt += 1;
                        }
                        RetryStep::GiveUp(reason) => {
                            error!(label, error = %text, "AI call abandoned");
                            anyhow::bail!(reason);
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// The AI's assessment of one match, before it is attached to a fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub confidence: f64,
    pub risk: RiskLevel,
    pub suggested_bet: String,
    pub rationale: String,
}

impl Assessment {
    /// Reply was received but could not be read as JSON.
    pub fn neutral(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            confidence: 5.0,
            risk: RiskLevel::Medium,
            suggested_bet: NO_BET.to_string(),
            rationale: if raw.is_empty() {
                "Unable to parse analysis.".to_string()
            } else {
                raw.chars().take(RAW_RATIONALE_CHARS).collect()
            },
        }
    }

    /// No usable reply at all.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            confidence: 0.0,
            risk: RiskLevel::High,
            suggested_bet: NO_BET.to_string(),
            rationale: format!("Analysis unavailable: {reason}"),
        }
    }

    pub fn into_analysis(self, fixture: &Fixture) -> MatchAnalysis {
        MatchAnalysis {
            fixture: fixture.clone(),
            confidence: self.confidence,
            risk: self.risk,
            suggested_bet: self.suggested_bet,
            rationale: self.rationale,
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let cleaned = strip_fences(text);
    if let Ok(Value::Object(map)) = serde_json::from_str(cleaned) {
        return Some(map);
    }
    // Prose around the object (common with search grounding).
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        warn!("Confidence score is NaN, using 0.0");
        return 0.0;
    }
    if !(0.0..=10.0).contains(&raw) {
        warn!(raw, "Confidence score out of range, clamping");
    }
    raw.clamp(0.0, 10.0)
}

/// Read an AI reply into an `Assessment`. Never fails.
pub fn parse_assessment(text: &str) -> Assessment {
    let Some(map) = json_object(text) else {
        warn!("AI reply is not a JSON object, using neutral assessment");
        return Assessment::neutral(text);
    };

    let confidence = map
        .get("confidence_score")
        .and_then(|v| v.as_f64().or_else(|| v.as_str()?.trim().parse().ok()))
        .unwrap_or(0.0);

    let risk = map
        .get("risk_level")
        .and_then(Value::as_str)
        .map(RiskLevel::from_label)
        .unwrap_or(RiskLevel::High);

    let suggested_bet = map
        .get("suggested_bet")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_BET)
        .to_string();

    let rationale = map
        .get("rationale")
        .and_then(Value::as_str)
        .unwrap_or("No rationale provided.")
        .to_string();

    Assessment {
        confidence: clamp_confidence(confidence),
        risk,
        suggested_bet,
        rationale,
    }
}

// ---------------------------------------------------------------------------
// Analyst
// ---------------------------------------------------------------------------

pub struct MatchAnalyst {
    executor: RetryExecutor,
}

impl MatchAnalyst {
    pub fn new(executor: RetryExecutor) -> Self {
        Self { executor }
    }

    /// Score one fixture. AI failures degrade to a fallback assessment.
    pub async fn analyze(&self, fixture: &Fixture, stats: &str) -> MatchAnalysis {
        let label = format!("{} vs {}", fixture.home_team, fixture.away_team);
        let prompt = prompts::analysis_prompt(fixture, stats);

        let assessment = match self.executor.run(&prompt, &label).await {
            Ok(text) => parse_assessment(&text),
            Err(reason) => Assessment::unavailable(&reason.to_string()),
        };

        info!(
            fixture_id = fixture.fixture_id,
            confidence = assessment.confidence,
            risk = %assessment.risk,
            bet = %assessment.suggested_bet,
            "Match analysed"
        );
        assessment.into_analysis(fixture)
    }

    /// Explanatory note for a settled record; `None` if the AI is unavailable.
    pub async fn post_mortem(&self, record: &MatchRecord) -> Option<String> {
        let label = format!("post-mortem #{}", record.id);
        let prompt = prompts::post_mortem_prompt(record);
        match self.executor.run(&prompt, &label).await {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                warn!(record_id = record.id, error = %e, "Post-mortem unavailable");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
