//! External football data sources.
//!
//! Defines the traits the engine depends on (`FixtureSource`,
//! `ResultSource`, `Scoreboard`) and the HTTP clients implementing them:
//! API-Football (authoritative fixtures, results and injuries), ESPN's
//! public scoreboard and football-data.org (fallback results, standings).

pub mod api_football;
pub mod espn;
pub mod football_data;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::types::{Fixture, MatchResult, MatchStatus};

/// Produces the day's fixtures for the tracked leagues.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    async fn fixtures_for(&self, day: NaiveDate) -> Result<Vec<Fixture>>;

    fn name(&self) -> &str;
}

/// Resolves the final (or current) score of a fixture.
///
/// `Ok(None)` means "not available from this source"; errors mean the
/// source itself failed (transport, HTTP status, quota). Either way the
/// caller moves on to the next source.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn try_resolve(&self, fixture: &Fixture) -> Result<Option<MatchResult>>;

    fn name(&self) -> &str;
}

/// One match on a league's scoreboard for a given day.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreLine {
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub status: MatchStatus,
}

/// A source that lists every match of a league on a given day.
/// Wrapped by `engine::resolver::ScoreboardSource` to act as a
/// `ResultSource` via team-name matching.
#[async_trait]
pub trait Scoreboard: Send + Sync {
    /// Scoreboard for an API-Football league id. Leagues the source does
    /// not cover yield an empty list.
    async fn scoreboard(&self, league_id: i64, day: NaiveDate) -> Result<Vec<ScoreLine>>;

    fn name(&self) -> &str;
}

// Shared clients (also used by the enricher) plug into the chain as-is.

#[async_trait]
impl<T: ResultSource + ?Sized> ResultSource for Arc<T> {
    async fn try_resolve(&self, fixture: &Fixture) -> Result<Option<MatchResult>> {
        (**self).try_resolve(fixture).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: Scoreboard + ?Sized> Scoreboard for Arc<T> {
    async fn scoreboard(&self, league_id: i64, day: NaiveDate) -> Result<Vec<ScoreLine>> {
        (**self).scoreboard(league_id, day).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
