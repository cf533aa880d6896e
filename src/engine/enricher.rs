//! Match statistics enrichment.
//!
//! Gathers injuries (API-Football), league position and recent form
//! (football-data.org) for both sides of a fixture. Every lookup is
//! optional: a missing key, identifier or uncovered league yields a
//! "data unavailable" placeholder in the rendered summary instead of an
//! error. League tables are cached per league so one daily run costs a
//! single standings call per competition.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::data::api_football::ApiFootballClient;
use crate::data::football_data::{FootballDataClient, Standing};
use crate::engine::matcher::TeamNameMatcher;
use crate::types::Fixture;

/// League tables barely move within a match day.
const STANDINGS_TTL_MINS: i64 = 360;

const NO_INJURIES: &str = "No major injuries reported";

/// Produces the statistics block handed to the analyst.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn gather(&self, fixture: &Fixture) -> MatchStats;
}

// ---------------------------------------------------------------------------
// Stats types
// ---------------------------------------------------------------------------

/// A looked-up value, or the reason it is missing.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Unavailable(String),
}

impl<T> Lookup<T> {
    fn unavailable(reason: &str) -> Self {
        Lookup::Unavailable(format!("Data unavailable - {reason}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamStats {
    pub name: String,
    pub injuries: Lookup<Vec<String>>,
    pub standing: Lookup<Standing>,
    pub form: Lookup<String>,
}

impl TeamStats {
    pub fn unavailable(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            injuries: Lookup::unavailable(reason),
            standing: Lookup::unavailable(reason),
            form: Lookup::unavailable(reason),
        }
    }

    fn render(&self, side: &str, out: &mut String) {
        let _ = writeln!(out, "{side} ({}):", self.name);

        match &self.injuries {
            Lookup::Found(list) if list.is_empty() => {
                let _ = writeln!(out, "- Injuries: {NO_INJURIES}");
            }
            Lookup::Found(list) => {
                let _ = writeln!(out, "- Injuries: {}", list.join(", "));
            }
            Lookup::Unavailable(why) => {
                let _ = writeln!(out, "- Injuries: {why}");
            }
        }

        match &self.standing {
            Lookup::Found(s) => {
                let _ = writeln!(
                    out,
                    "- League position: {} with {} points ({}W-{}D-{}L, GF {} GA {})",
                    s.position, s.points, s.won, s.drawn, s.lost, s.goals_for, s.goals_against
                );
            }
            Lookup::Unavailable(why) => {
                let _ = writeln!(out, "- League position: {why}");
            }
        }

        match &self.form {
            Lookup::Found(f) => {
                let _ = writeln!(out, "- Recent form: {f} (most recent first)");
            }
            Lookup::Unavailable(why) => {
                let _ = writeln!(out, "- Recent form: {why}");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchStats {
    pub home: TeamStats,
    pub away: TeamStats,
}

impl MatchStats {
    /// Both sides unavailable for the same reason.
    pub fn unavailable(fixture: &Fixture, reason: &str) -> Self {
        Self {
            home: TeamStats::unavailable(&fixture.home_team, reason),
            away: TeamStats::unavailable(&fixture.away_team, reason),
        }
    }

    /// Plain-text block for the analysis prompt.
    pub fn summary(&self) -> String {
        let mut out = String::with_capacity(512);
        self.home.render("Home", &mut out);
        self.away.render("Away", &mut out);
        out
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    table: Vec<Standing>,
    inserted_at: DateTime<Utc>,
}

/// In-memory TTL cache of league tables keyed by league id.
struct StandingsCache {
    entries: HashMap<i64, CacheEntry>,
    ttl: Duration,
}

impl StandingsCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    fn get(&self, league_id: i64) -> Option<Vec<Standing>> {
        self.entries.get(&league_id).and_then(|entry| {
            (Utc::now() - entry.inserted_at < self.ttl).then(|| entry.table.clone())
        })
    }

    fn insert(&mut self, league_id: i64, table: Vec<Standing>) {
        self.entries.insert(
            league_id,
            CacheEntry {
                table,
                inserted_at: Utc::now(),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

pub struct Enricher {
    api_football: Option<Arc<ApiFootballClient>>,
    football_data: Option<Arc<FootballDataClient>>,
    matcher: TeamNameMatcher,
    cache: Mutex<StandingsCache>,
}

impl Enricher {
    pub fn new(
        api_football: Option<Arc<ApiFootballClient>>,
        football_data: Option<Arc<FootballDataClient>>,
        matcher: TeamNameMatcher,
    ) -> Self {
        Self {
            api_football,
            football_data,
            matcher,
            cache: Mutex::new(StandingsCache::new(Duration::minutes(STANDINGS_TTL_MINS))),
        }
    }

    async fn injuries(&self, fixture: &Fixture, team_id: Option<i64>) -> Lookup<Vec<String>> {
        let Some(client) = &self.api_football else {
            return Lookup::unavailable("no API-Football key");
        };
        let Some(team_id) = team_id else {
            return Lookup::unavailable("missing team ID");
        };
        match client.injuries(fixture.fixture_id, team_id).await {
            Ok(list) => Lookup::Found(list),
            Err(e) => {
                warn!(fixture_id = fixture.fixture_id, team_id, error = %e, "Injury lookup failed");
                Lookup::unavailable("injury lookup failed")
            }
        }
    }

    async fn table(&self, client: &FootballDataClient, league_id: i64) -> Option<Vec<Standing>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(table) = cache.get(league_id) {
                debug!(league_id, "Standings cache hit");
                return Some(table);
            }
        }

        match client.standings(league_id).await {
            Ok(table) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(league_id, table.clone());
                }
                Some(table)
            }
            Err(e) => {
                warn!(league_id, error = %e, "Standings lookup failed");
                None
            }
        }
    }

    async fn team_context(
        &self,
        fixture: &Fixture,
        team: &str,
        table: Option<&[Standing]>,
    ) -> (Lookup<Standing>, Lookup<String>) {
        let Some(client) = &self.football_data else {
            return (
                Lookup::unavailable("no football-data.org key"),
                Lookup::unavailable("no football-data.org key"),
            );
        };
        let Some(table) = table.filter(|t| !t.is_empty()) else {
            return (
                Lookup::unavailable("league not covered"),
                Lookup::unavailable("league not covered"),
            );
        };
        let Some(row) = table.iter().find(|r| self.matcher.matches(&r.team_name, team)) else {
            return (
                Lookup::unavailable("team not in table"),
                Lookup::unavailable("team not in table"),
            );
        };

        let form = match row.team_id {
            Some(id) => match client.recent_form(id, fixture.kickoff.date_naive()).await {
                Ok(f) if !f.is_empty() => Lookup::Found(f),
                Ok(_) => Lookup::unavailable("no recent matches"),
                Err(e) => {
                    warn!(team, error = %e, "Form lookup failed");
                    Lookup::unavailable("form lookup failed")
                }
            },
            None => Lookup::unavailable("missing team ID"),
        };

        (Lookup::Found(row.clone()), form)
    }
}

#[async_trait]
impl StatsProvider for Enricher {
    async fn gather(&self, fixture: &Fixture) -> MatchStats {
        let home_injuries = self.injuries(fixture, fixture.home_team_id).await;
        let away_injuries = self.injuries(fixture, fixture.away_team_id).await;

        let table = match &self.football_data {
            Some(client) => self.table(client, fixture.league_id).await,
            None => None,
        };
        let (home_standing, home_form) = self
            .team_context(fixture, &fixture.home_team, table.as_deref())
            .await;
        let (away_standing, away_form) = self
            .team_context(fixture, &fixture.away_team, table.as_deref())
            .await;

        MatchStats {
            home: TeamStats {
                name: fixture.home_team.clone(),
                injuries: home_injuries,
                standing: home_standing,
                form: home_form,
            },
            away: TeamStats {
                name: fixture.away_team.clone(),
                injuries: away_injuries,
                standing: away_standing,
                form: away_form,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
