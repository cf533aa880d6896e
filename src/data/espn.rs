//! ESPN public scoreboard (fallback result source).
//!
//! API: `https://site.api.espn.com/apis/site/v2/sports/soccer/{slug}/scoreboard?dates=YYYYMMDD`
//! No auth. Returns every event of a league on a day, which the resolver
//! then matches by team name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ScoreLine, Scoreboard};
use crate::types::{AccaError, MatchStatus};

pub const DEFAULT_BASE_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/soccer";
const SOURCE_NAME: &str = "ESPN";

/// API-Football league id → ESPN league slug.
const LEAGUE_SLUGS: &[(i64, &str)] = &[
    (39, "eng.1"),
    (40, "eng.2"),
    (41, "eng.3"),
    (42, "eng.4"),
    (140, "esp.1"),
    (135, "ita.1"),
    (78, "ger.1"),
    (61, "fra.1"),
    (88, "ned.1"),
    (94, "por.1"),
    (179, "sco.1"),
    (144, "bel.1"),
    (203, "tur.1"),
    (253, "usa.1"),
    (262, "mex.1"),
    (71, "bra.1"),
    (128, "arg.1"),
    (2, "uefa.champions"),
    (3, "uefa.europa"),
];

pub fn league_slug(league_id: i64) -> Option<&'static str> {
    LEAGUE_SLUGS
        .iter()
        .find(|(id, _)| *id == league_id)
        .map(|(_, slug)| *slug)
}

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ScoreboardResponse {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    competitions: Vec<Competition>,
    #[serde(default)]
    status: Option<EventStatus>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    #[serde(default)]
    competitors: Vec<Competitor>,
}

#[derive(Debug, Deserialize)]
struct Competitor {
    #[serde(rename = "homeAway")]
    home_away: String,
    #[serde(default)]
    score: Option<String>,
    team: CompetitorTeam,
}

#[derive(Debug, Deserialize)]
struct CompetitorTeam {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct EventStatus {
    #[serde(rename = "type")]
    status_type: StatusType,
}

#[derive(Debug, Deserialize)]
struct StatusType {
    /// "STATUS_FULL_TIME", "STATUS_POSTPONED", ...
    #[serde(default)]
    name: String,
    /// "pre" | "in" | "post"
    #[serde(default)]
    state: String,
    #[serde(default)]
    completed: bool,
    #[serde(default, rename = "shortDetail")]
    short_detail: String,
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

fn map_status(t: &StatusType) -> MatchStatus {
    let name = t.name.to_uppercase();
    let detail = t.short_detail.to_uppercase();

    if name.contains("POSTPONED") {
        return MatchStatus::Postponed;
    }
    if name.contains("CANCELED") || name.contains("CANCELLED") {
        return MatchStatus::Cancelled;
    }
    if name.contains("ABANDONED") {
        return MatchStatus::Abandoned;
    }
    match t.state.as_str() {
        "post" if t.completed => {
            if detail.contains("PEN") {
                MatchStatus::Penalties
            } else if detail.contains("AET") {
                MatchStatus::AfterExtraTime
            } else {
                MatchStatus::FullTime
            }
        }
        "in" if detail.contains("HT") || name.contains("HALFTIME") => MatchStatus::HalfTime,
        "in" => MatchStatus::Live,
        "pre" => MatchStatus::NotStarted,
        _ => MatchStatus::Other(detail),
    }
}

fn to_lines(body: ScoreboardResponse) -> Vec<ScoreLine> {
    body.events
        .into_iter()
        .filter_map(|event| {
            let status = event
                .status
                .as_ref()
                .map(|s| map_status(&s.status_type))
                .unwrap_or(MatchStatus::Other(String::new()));
            let competition = event.competitions.into_iter().next()?;
            let side = |which: &str| competition.competitors.iter().find(|c| c.home_away == which);
            let (home, away) = (side("home")?, side("away")?);

            // Scores on not-yet-started events are "0" placeholders.
            let scored = !matches!(status, MatchStatus::NotStarted | MatchStatus::Postponed);
            let score = |c: &Competitor| {
                c.score
                    .as_deref()
                    .filter(|_| scored)
                    .and_then(|s| s.trim().parse::<u32>().ok())
            };

            Some(ScoreLine {
                home_team: home.team.display_name.clone(),
                away_team: away.team.display_name.clone(),
                home_score: score(home),
                away_score: score(away),
                status,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct EspnScoreboard {
    http: Client,
    base_url: String,
}

impl EspnScoreboard {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("SmartAcca/0.1.0")
            .build()
            .context("Failed to build ESPN HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl Scoreboard for EspnScoreboard {
    async fn scoreboard(&self, league_id: i64, day: NaiveDate) -> Result<Vec<ScoreLine>> {
        let Some(slug) = league_slug(league_id) else {
            debug!(league_id, "League not covered by ESPN");
            return Ok(Vec::new());
        };

        let url = format!("{}/{slug}/scoreboard", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("dates", day.format("%Y%m%d").to_string())])
            .send()
            .await
            .context("ESPN scoreboard request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(AccaError::Http {
                source_name: SOURCE_NAME.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body: ScoreboardResponse = response
            .json()
            .await
            .context("Failed to parse ESPN scoreboard")?;
        let lines = to_lines(body);
        debug!(slug, %day, events = lines.len(), "ESPN scoreboard fetched");
        Ok(lines)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
