//! API-Football client.
//!
//! API: `https://v3.football.api-sports.io/`
//! Auth: `x-apisports-key` header. Free tier: 100 req/day, which is why
//! quota exhaustion is detected explicitly and handed to the fallback
//! sources instead of being treated as a generic failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{FixtureSource, ResultSource};
use crate::types::{AccaError, Fixture, MatchResult, MatchStatus};

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";
const SOURCE_NAME: &str = "API-Football";

/// Maximum injuries reported per side.
const MAX_INJURIES: usize = 5;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    /// `[]` when fine, otherwise an object or array describing the error.
    #[serde(default)]
    errors: Value,
    #[serde(default)]
    response: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FixtureItem {
    fixture: FixtureInfo,
    league: LeagueInfo,
    teams: TeamsInfo,
    #[serde(default)]
    goals: Goals,
}

#[derive(Debug, Deserialize)]
struct FixtureInfo {
    id: i64,
    date: String,
    #[serde(default)]
    venue: Option<VenueInfo>,
    #[serde(default)]
    status: Option<StatusInfo>,
}

#[derive(Debug, Deserialize)]
struct VenueInfo {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    #[serde(default)]
    short: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeagueInfo {
    id: i64,
    name: String,
    #[serde(default)]
    season: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TeamsInfo {
    home: TeamInfo,
    away: TeamInfo,
}

#[derive(Debug, Deserialize)]
struct TeamInfo {
    #[serde(default)]
    id: Option<i64>,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Goals {
    #[serde(default)]
    home: Option<u32>,
    #[serde(default)]
    away: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct InjuryItem {
    #[serde(default)]
    player: Option<InjuredPlayer>,
    #[serde(default)]
    team: Option<TeamInfo>,
}

#[derive(Debug, Deserialize)]
struct InjuredPlayer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Response interpretation
// ---------------------------------------------------------------------------

/// The error payload, if it actually carries an error.
fn error_text(errors: &Value) -> Option<String> {
    match errors {
        Value::Null => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Daily quota ("request limit") or per-minute throttle ("rateLimit").
fn is_quota_error(text: &str) -> bool {
    let t = text.to_lowercase();
    t.contains("request limit") || t.contains("ratelimit") || t.contains("rate limit")
}

fn to_fixture(item: FixtureItem, tracked: &[i64]) -> Option<Fixture> {
    if !tracked.contains(&item.league.id) {
        return None;
    }
    let kickoff = DateTime::parse_from_rfc3339(&item.fixture.date)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| warn!(fixture_id = item.fixture.id, error = %e, "Unparseable kickoff"))
        .ok()?;
    let venue = item
        .fixture
        .venue
        .and_then(|v| v.name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "TBD".to_string());

    Some(Fixture {
        fixture_id: item.fixture.id,
        home_team: item.teams.home.name,
        away_team: item.teams.away.name,
        home_team_id: item.teams.home.id,
        away_team_id: item.teams.away.id,
        league_id: item.league.id,
        league_name: item.league.name,
        season: item.league.season,
        kickoff,
        venue,
    })
}

fn to_result(item: &FixtureItem) -> Option<MatchResult> {
    let (home_score, away_score) = (item.goals.home?, item.goals.away?);
    let status = item
        .fixture
        .status
        .as_ref()
        .and_then(|s| s.short.as_deref())
        .map(MatchStatus::from_code)
        .unwrap_or(MatchStatus::FullTime);
    Some(MatchResult {
        home_score,
        away_score,
        status,
        source: SOURCE_NAME.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct ApiFootballClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    /// Tracked league ids; fixtures from other leagues are dropped.
    tracked_leagues: Vec<i64>,
}

impl ApiFootballClient {
    pub fn new(
        api_key: SecretString,
        base_url: Option<String>,
        tracked_leagues: Vec<i64>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("SmartAcca/0.1.0")
            .build()
            .context("Failed to build API-Football HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            tracked_leagues,
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url = %url, ?query, "API-Football request");

        let response = self
            .http
            .get(&url)
            .header("x-apisports-key", self.api_key.expose_secret())
            .query(query)
            .send()
            .await
            .with_context(|| format!("API-Football request to /{path} failed"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AccaError::Http {
                source_name: SOURCE_NAME.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse API-Football /{path} response"))?;

        if let Some(text) = error_text(&envelope.errors) {
            if is_quota_error(&text) {
                return Err(AccaError::QuotaExhausted {
                    source_name: SOURCE_NAME.to_string(),
                    message: text,
                }
                .into());
            }
            anyhow::bail!("API-Football /{path} error: {text}");
        }

        Ok(envelope)
    }

    /// Injuries reported for one side of a fixture, at most five.
    /// Needs both the fixture id and the team id; callers substitute a
    /// placeholder when either is missing.
    pub async fn injuries(&self, fixture_id: i64, team_id: i64) -> Result<Vec<String>> {
        let envelope: Envelope<InjuryItem> = self
            .get("injuries", &[("fixture", fixture_id.to_string())])
            .await?;

        let injuries: Vec<String> = envelope
            .response
            .into_iter()
            .filter(|i| i.team.as_ref().and_then(|t| t.id) == Some(team_id))
            .filter_map(|i| i.player)
            .map(|p| {
                format!(
                    "{} ({})",
                    p.name.unwrap_or_else(|| "Unknown".into()),
                    p.reason.unwrap_or_else(|| "Unknown injury".into())
                )
            })
            .take(MAX_INJURIES)
            .collect();

        Ok(injuries)
    }
}

#[async_trait]
impl FixtureSource for ApiFootballClient {
    async fn fixtures_for(&self, day: NaiveDate) -> Result<Vec<Fixture>> {
        let envelope: Envelope<FixtureItem> = self
            .get("fixtures", &[("date", day.format("%Y-%m-%d").to_string())])
            .await?;

        let total = envelope.response.len();
        let fixtures: Vec<Fixture> = envelope
            .response
            .into_iter()
            .filter_map(|item| to_fixture(item, &self.tracked_leagues))
            .collect();

        info!(%day, total, tracked = fixtures.len(), "Fixtures fetched");
        Ok(fixtures)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

#[async_trait]
impl ResultSource for ApiFootballClient {
    async fn try_resolve(&self, fixture: &Fixture) -> Result<Option<MatchResult>> {
        let envelope: Envelope<FixtureItem> = self
            .get("fixtures", &[("id", fixture.fixture_id.to_string())])
            .await?;

        Ok(envelope.response.first().and_then(to_result))
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
