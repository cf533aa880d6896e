//! In-memory stand-ins for the external services.
//!
//! Fixtures, results, scoreboards, the AI backend and the sleeper are
//! all deterministic and fully controllable from test code, so the
//! pipeline runs end to end against an in-memory SQLite store.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smartacca::data::{FixtureSource, ResultSource, ScoreLine, Scoreboard};
use smartacca::engine::analyst::{MatchAnalyst, RetryExecutor, RetryPolicy, Sleeper};
use smartacca::engine::enricher::{MatchStats, StatsProvider};
use smartacca::engine::jobs::{JobSettings, Pipeline};
use smartacca::engine::matcher::TeamNameMatcher;
use smartacca::engine::resolver::{ResultSourceChain, ScoreboardSource};
use smartacca::llm::TextGenerator;
use smartacca::storage::MatchStore;
use smartacca::types::{AccaError, Fixture, MatchResult, MatchStatus};

/// The match day every harness fixture belongs to.
pub fn match_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

pub fn kickoff(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, hour, 0, 0).unwrap()
}

pub fn fixture(fixture_id: i64, home: &str, away: &str, kickoff: DateTime<Utc>) -> Fixture {
    Fixture {
        fixture_id,
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_team_id: Some(fixture_id * 10),
        away_team_id: Some(fixture_id * 10 + 1),
        league_id: 39,
        league_name: "Premier League".to_string(),
        season: Some(2026),
        kickoff,
        venue: "TBD".to_string(),
    }
}

/// A well-formed analysis reply.
pub fn analysis_reply(confidence: f64, risk: &str, bet: &str) -> String {
    format!(
        r#"```json
{{"confidence_score": {confidence}, "risk_level": "{risk}", "suggested_bet": "{bet}", "rationale": "Form and injuries favour it."}}
```"#
    )
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct StubFixtures {
    fixtures: Vec<Fixture>,
    pub calls: AtomicU32,
}

impl StubFixtures {
    pub fn new(fixtures: Vec<Fixture>) -> Self {
        Self {
            fixtures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl FixtureSource for StubFixtures {
    async fn fixtures_for(&self, _day: NaiveDate) -> Result<Vec<Fixture>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.fixtures.clone())
    }

    fn name(&self) -> &str {
        "stub-fixtures"
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Primary source keyed by fixture id; can be switched into quota
/// exhaustion.
pub struct StubResults {
    results: Mutex<HashMap<i64, MatchResult>>,
    quota_exhausted: AtomicBool,
    pub calls: AtomicU32,
}

impl StubResults {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            quota_exhausted: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set(&self, fixture_id: i64, home: u32, away: u32, status: MatchStatus) {
        self.results.lock().unwrap().insert(
            fixture_id,
            MatchResult {
                home_score: home,
                away_score: away,
                status,
                source: self.name().to_string(),
            },
        );
    }

    pub fn exhaust_quota(&self) {
        self.quota_exhausted.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResultSource for StubResults {
    async fn try_resolve(&self, fixture: &Fixture) -> Result<Option<MatchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.quota_exhausted.load(Ordering::SeqCst) {
            return Err(AccaError::QuotaExhausted {
                source_name: self.name().to_string(),
                message: "You have reached the request limit for the day".into(),
            }
            .into());
        }
        Ok(self.results.lock().unwrap().get(&fixture.fixture_id).cloned())
    }

    fn name(&self) -> &str {
        "primary"
    }
}

/// Fallback scoreboard with differently spelled team names.
pub struct StubBoard {
    lines: Mutex<Vec<ScoreLine>>,
    pub calls: AtomicU32,
}

impl StubBoard {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn push(&self, home: &str, away: &str, score: (u32, u32), status: MatchStatus) {
        self.lines.lock().unwrap().push(ScoreLine {
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_score: Some(score.0),
            away_score: Some(score.1),
            status,
        });
    }
}

#[async_trait]
impl Scoreboard for StubBoard {
    async fn scoreboard(&self, _league_id: i64, _day: NaiveDate) -> Result<Vec<ScoreLine>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lines.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "board"
    }
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

/// Answers analysis prompts from a per-home-team script and every other
/// prompt with a canned post-mortem. Can be told to rate-limit the next
/// N calls.
pub struct ScriptedAi {
    replies: Mutex<HashMap<String, String>>,
    rate_limit_next: AtomicU32,
    pub analysis_calls: AtomicU32,
    pub post_mortem_calls: AtomicU32,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            rate_limit_next: AtomicU32::new(0),
            analysis_calls: AtomicU32::new(0),
            post_mortem_calls: AtomicU32::new(0),
        }
    }

    pub fn script(&self, home_team: &str, reply: String) {
        self.replies.lock().unwrap().insert(home_team.to_string(), reply);
    }

    pub fn rate_limit(&self, calls: u32) {
        self.rate_limit_next.store(calls, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerator for ScriptedAi {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let limited = self
            .rate_limit_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(anyhow!("429 RESOURCE_EXHAUSTED: quota exceeded. Please retry in 2s."));
        }

        if prompt.contains("confidence_score") {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            let replies = self.replies.lock().unwrap();
            return replies
                .iter()
                .find(|(home, _)| prompt.contains(&format!("MATCH: {home} vs")))
                .map(|(_, reply)| reply.clone())
                .ok_or_else(|| anyhow!("500 upstream model error"));
        }

        self.post_mortem_calls.fetch_add(1, Ordering::SeqCst);
        Ok("  The home side controlled midfield as expected.  ".to_string())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Sleeper & stats
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn take(&self) -> Vec<Duration> {
        std::mem::take(&mut *self.slept.lock().unwrap())
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub struct OfflineStats;

#[async_trait]
impl StatsProvider for OfflineStats {
    async fn gather(&self, fixture: &Fixture) -> MatchStats {
        MatchStats::unavailable(fixture, "offline")
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Pipeline,
    pub fixtures: Arc<StubFixtures>,
    pub ai: Arc<ScriptedAi>,
    pub primary: Arc<StubResults>,
    pub board: Arc<StubBoard>,
    pub sleeper: Arc<RecordingSleeper>,
}

pub fn settings() -> JobSettings {
    JobSettings {
        acca_size: 3,
        analysis_pacing: Duration::from_secs(4),
        results_pacing: Duration::from_secs(1),
    }
}

impl Harness {
    pub async fn new(fixtures: Vec<Fixture>) -> Self {
        Self::with_store(fixtures, MatchStore::in_memory().await.unwrap()).await
    }

    pub async fn with_store(fixtures: Vec<Fixture>, store: MatchStore) -> Self {
        let fixtures = Arc::new(StubFixtures::new(fixtures));
        let ai = Arc::new(ScriptedAi::new());
        let primary = Arc::new(StubResults::new());
        let board = Arc::new(StubBoard::new());
        let sleeper = Arc::new(RecordingSleeper::default());

        let mut sources: Vec<Box<dyn ResultSource>> = Vec::new();
        sources.push(Box::new(primary.clone()));
        sources.push(Box::new(ScoreboardSource::new(
            board.clone(),
            TeamNameMatcher::default(),
        )));

        let analyst = MatchAnalyst::new(RetryExecutor::new(
            ai.clone(),
            sleeper.clone(),
            RetryPolicy::default(),
        ));

        let pipeline = Pipeline::new(
            store,
            fixtures.clone(),
            Arc::new(OfflineStats),
            analyst,
            ResultSourceChain::new(sources),
            sleeper.clone(),
            settings(),
        );

        Self {
            pipeline,
            fixtures,
            ai,
            primary,
            board,
            sleeper,
        }
    }

    /// Id of the stored record for a fixture.
    pub async fn record_id(&self, fixture_id: i64) -> i64 {
        self.pipeline
            .store()
            .by_fixture(fixture_id)
            .await
            .unwrap()
            .expect("fixture was persisted")
            .id
    }
}
