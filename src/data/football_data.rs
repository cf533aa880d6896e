//! football-data.org v4 client.
//!
//! Used as a fallback result source (scoreboard by competition and day)
//! and for league standings and recent form during enrichment.
//! Auth: `X-Auth-Token` header. The free tier covers a handful of top
//! competitions only, mapped here from API-Football league ids.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ScoreLine, Scoreboard};
use crate::engine::matcher::TeamNameMatcher;
use crate::types::{AccaError, MatchStatus};

pub const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";
const SOURCE_NAME: &str = "football-data.org";
const FORM_MATCHES: usize = 5;
const FORM_WINDOW_DAYS: i64 = 90;

/// API-Football league id → football-data.org competition code.
const COMPETITION_CODES: &[(i64, &str)] = &[
    (39, "PL"),
    (40, "ELC"),
    (140, "PD"),
    (135, "SA"),
    (78, "BL1"),
    (61, "FL1"),
    (88, "DED"),
    (94, "PPL"),
    (2, "CL"),
];

pub fn competition_code(league_id: i64) -> Option<&'static str> {
    COMPETITION_CODES
        .iter()
        .find(|(id, _)| *id == league_id)
        .map(|(_, code)| *code)
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<FdMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FdMatch {
    utc_date: DateTime<Utc>,
    status: String,
    home_team: FdTeam,
    away_team: FdTeam,
    #[serde(default)]
    score: FdScore,
}

#[derive(Debug, Deserialize)]
struct FdTeam {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FdScore {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    full_time: FdGoals,
}

#[derive(Debug, Default, Deserialize)]
struct FdGoals {
    home: Option<u32>,
    away: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StandingsResponse {
    #[serde(default)]
    standings: Vec<StandingGroup>,
}

#[derive(Debug, Deserialize)]
struct StandingGroup {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    table: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableRow {
    position: u32,
    team: FdTeam,
    #[serde(default)]
    played_games: u32,
    #[serde(default)]
    won: u32,
    #[serde(default)]
    draw: u32,
    #[serde(default)]
    lost: u32,
    #[serde(default)]
    points: u32,
    #[serde(default)]
    goals_for: u32,
    #[serde(default)]
    goals_against: u32,
}

/// A team's row in the league table.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub team_id: Option<i64>,
    pub team_name: String,
    pub position: u32,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub points: u32,
    pub goals_for: u32,
    pub goals_against: u32,
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

fn map_status(m: &FdMatch) -> MatchStatus {
    match m.status.as_str() {
        "FINISHED" => match m.score.duration.as_deref() {
            Some("PENALTY_SHOOTOUT") => MatchStatus::Penalties,
            Some("EXTRA_TIME") => MatchStatus::AfterExtraTime,
            _ => MatchStatus::FullTime,
        },
        "IN_PLAY" | "LIVE" => MatchStatus::Live,
        "PAUSED" => MatchStatus::HalfTime,
        "SCHEDULED" | "TIMED" => MatchStatus::NotStarted,
        "POSTPONED" => MatchStatus::Postponed,
        "CANCELLED" => MatchStatus::Cancelled,
        "AWARDED" => MatchStatus::Walkover,
        other => MatchStatus::Other(other.to_string()),
    }
}

fn to_line(m: FdMatch) -> ScoreLine {
    let status = map_status(&m);
    ScoreLine {
        home_team: m.home_team.name.unwrap_or_default(),
        away_team: m.away_team.name.unwrap_or_default(),
        home_score: m.score.full_time.home,
        away_score: m.score.full_time.away,
        status,
    }
}

fn to_standings(body: StandingsResponse) -> Vec<Standing> {
    body.standings
        .into_iter()
        .find(|g| g.kind == "TOTAL")
        .map(|g| {
            g.table
                .into_iter()
                .map(|r| Standing {
                    team_id: r.team.id,
                    team_name: r.team.name.unwrap_or_default(),
                    position: r.position,
                    played: r.played_games,
                    won: r.won,
                    drawn: r.draw,
                    lost: r.lost,
                    points: r.points,
                    goals_for: r.goals_for,
                    goals_against: r.goals_against,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// W/D/L string for `team_id` over its most recent finished matches,
/// newest first.
fn form_string(team_id: i64, mut matches: Vec<FdMatch>) -> String {
    matches.retain(|m| m.status == "FINISHED");
    matches.sort_by(|a, b| b.utc_date.cmp(&a.utc_date));

    matches
        .iter()
        .filter_map(|m| {
            let (h, a) = (m.score.full_time.home?, m.score.full_time.away?);
            let (ours, theirs) = if m.home_team.id == Some(team_id) {
                (h, a)
            } else if m.away_team.id == Some(team_id) {
                (a, h)
            } else {
                return None;
            };
            Some(match ours.cmp(&theirs) {
                std::cmp::Ordering::Greater => 'W',
                std::cmp::Ordering::Equal => 'D',
                std::cmp::Ordering::Less => 'L',
            })
        })
        .take(FORM_MATCHES)
        .collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct FootballDataClient {
    http: Client,
    api_key: Option<SecretString>,
    base_url: String,
    matcher: TeamNameMatcher,
}

impl FootballDataClient {
    pub fn new(
        api_key: Option<SecretString>,
        base_url: Option<String>,
        matcher: TeamNameMatcher,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("SmartAcca/0.1.0")
            .build()
            .context("Failed to build football-data.org HTTP client")?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            matcher,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-Auth-Token", key.expose_secret());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("football-data.org request to /{path} failed"))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AccaError::QuotaExhausted {
                source_name: SOURCE_NAME.to_string(),
                message: "HTTP 429".to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(AccaError::Http {
                source_name: SOURCE_NAME.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse football-data.org /{path} response"))
    }

    /// Current league table for an API-Football league id. Uncovered
    /// leagues yield an empty table.
    pub async fn standings(&self, league_id: i64) -> Result<Vec<Standing>> {
        let Some(code) = competition_code(league_id) else {
            return Ok(Vec::new());
        };
        let body: StandingsResponse = self
            .get(&format!("competitions/{code}/standings"), &[])
            .await?;
        Ok(to_standings(body))
    }

    /// Table row for `team_name`, matched by fuzzy name.
    pub async fn team_standing(&self, team_name: &str, league_id: i64) -> Result<Option<Standing>> {
        let table = self.standings(league_id).await?;
        Ok(table
            .into_iter()
            .find(|row| self.matcher.matches(&row.team_name, team_name)))
    }

    /// Recent form ("WWDLW", newest first) for a football-data.org team id.
    pub async fn recent_form(&self, team_id: i64, today: NaiveDate) -> Result<String> {
        let from = today - ChronoDuration::days(FORM_WINDOW_DAYS);
        let body: MatchesResponse = self
            .get(
                &format!("teams/{team_id}/matches"),
                &[
                    ("status", "FINISHED".to_string()),
                    ("dateFrom", from.format("%Y-%m-%d").to_string()),
                    ("dateTo", today.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;
        Ok(form_string(team_id, body.matches))
    }
}

#[async_trait]
impl Scoreboard for FootballDataClient {
    async fn scoreboard(&self, league_id: i64, day: NaiveDate) -> Result<Vec<ScoreLine>> {
        let Some(code) = competition_code(league_id) else {
            debug!(league_id, "League not covered by football-data.org");
            return Ok(Vec::new());
        };
        let date = day.format("%Y-%m-%d").to_string();
        let body: MatchesResponse = self
            .get(
                &format!("competitions/{code}/matches"),
                &[("dateFrom", date.clone()), ("dateTo", date)],
            )
            .await?;
        Ok(body.matches.into_iter().map(to_line).collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
