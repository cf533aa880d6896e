//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime into `SecretString`s. Every section has defaults,
//! so a partial file (or an empty one) still loads.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use crate::engine::accumulator::DEFAULT_ACCA_SIZE;
use crate::engine::analyst::RetryPolicy;
use crate::engine::jobs::JobSettings;
use crate::engine::matcher::DEFAULT_THRESHOLD;
use crate::engine::scheduler::ScheduleSettings;
use crate::types::AccaError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub analysis: AnalysisConfig,
    pub football_api: FootballApiConfig,
    pub football_data: FootballDataConfig,
    pub results: ResultsConfig,
    pub scheduler: SchedulerConfig,
    /// Tracked league name to API-Football league id.
    pub leagues: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub database_url: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "SmartAcca".into(),
            database_url: "sqlite://smartacca.db".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    OpenRouter,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Provider default when absent.
    pub model: Option<String>,
    /// OpenRouter only: model tried once when the primary fails.
    pub fallback_model: Option<String>,
    pub api_key_env: String,
    /// Gemini only: enable search grounding.
    pub grounding: bool,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: None,
            fallback_model: None,
            api_key_env: "GEMINI_API_KEY".into(),
            grounding: false,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub suggested_buffer_secs: f64,
    pub max_jitter_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 1.0,
            suggested_buffer_secs: 1.0,
            max_jitter_secs: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub acca_size: usize,
    pub pacing_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            acca_size: DEFAULT_ACCA_SIZE,
            pacing_secs: 4.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FootballApiConfig {
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FootballApiConfig {
    fn default() -> Self {
        Self {
            api_key_env: "FOOTBALL_API_KEY".into(),
            base_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FootballDataConfig {
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FootballDataConfig {
    fn default() -> Self {
        Self {
            api_key_env: "FOOTBALL_DATA_API_KEY".into(),
            base_url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    Espn,
    FootballData,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResultsConfig {
    /// Fallback scoreboards, tried in order after API-Football.
    pub sources: Vec<FallbackSource>,
    pub espn_base_url: Option<String>,
    pub pacing_secs: f64,
    pub default_days_back: i64,
    pub match_threshold: f64,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            sources: vec![FallbackSource::Espn, FallbackSource::FootballData],
            espn_base_url: None,
            pacing_secs: 1.0,
            default_days_back: 1,
            match_threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Local time, `HH:MM`.
    pub daily_at: String,
    pub results_interval_mins: u64,
    pub poll_secs: u64,
    pub reset_on_daily: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_at: "07:00".into(),
            results_interval_mins: 60,
            poll_secs: 60,
            reset_on_daily: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AccaError> {
        if self.analysis.acca_size == 0 {
            return Err(AccaError::Config("analysis.acca_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.results.match_threshold) {
            return Err(AccaError::Config(format!(
                "results.match_threshold must be within 0..=1, got {}",
                self.results.match_threshold
            )));
        }
        self.daily_time()?;
        Ok(())
    }

    /// Resolve an environment variable name to a secret. Unset or empty
    /// variables give `None`.
    pub fn resolve_env(env_name: &str) -> Option<SecretString> {
        std::env::var(env_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
    }

    pub fn tracked_leagues(&self) -> Vec<i64> {
        self.leagues.values().copied().collect()
    }

    pub fn daily_time(&self) -> Result<NaiveTime, AccaError> {
        NaiveTime::parse_from_str(&self.scheduler.daily_at, "%H:%M").map_err(|_| {
            AccaError::Config(format!(
                "scheduler.daily_at must be HH:MM, got {:?}",
                self.scheduler.daily_at
            ))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: secs(self.retry.base_delay_secs),
            suggested_buffer: secs(self.retry.suggested_buffer_secs),
            max_jitter: secs(self.retry.max_jitter_secs),
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            acca_size: self.analysis.acca_size,
            analysis_pacing: secs(self.analysis.pacing_secs),
            results_pacing: secs(self.results.pacing_secs),
        }
    }

    pub fn schedule_settings(&self) -> Result<ScheduleSettings, AccaError> {
        Ok(ScheduleSettings {
            daily_at: self.daily_time()?,
            results_every: Duration::from_secs(self.scheduler.results_interval_mins * 60),
            poll: Duration::from_secs(self.scheduler.poll_secs.max(1)),
            reset_on_daily: self.scheduler.reset_on_daily,
            days_back: self.results.default_days_back,
        })
    }
}

/// Negative or NaN becomes zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
