//! Shared types for SmartAcca.
//!
//! Fixtures arrive from the fixture source, become `MatchAnalysis`
//! values after the AI step, and are persisted as `MatchRecord`s that
//! later pick up results, outcomes and post-mortems.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored when no bet could be suggested.
pub const NO_BET: &str = "N/A";

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A scheduled match as reported by the fixture source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// External (API-Football) fixture id, the upsert key downstream.
    pub fixture_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub league_id: i64,
    pub league_name: String,
    pub season: Option<i32>,
    pub kickoff: DateTime<Utc>,
    pub venue: String,
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs {} ({}, {})",
            self.home_team,
            self.away_team,
            self.league_name,
            self.kickoff.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

impl Fixture {
    /// Helper to build a test fixture with sensible defaults.
    #[cfg(test)]
    pub fn sample(fixture_id: i64, home: &str, away: &str) -> Self {
        use chrono::TimeZone;
        Fixture {
            fixture_id,
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_team_id: Some(fixture_id * 10),
            away_team_id: Some(fixture_id * 10 + 1),
            league_id: 39,
            league_name: "Premier League".to_string(),
            season: Some(2026),
            kickoff: Utc.with_ymd_and_hms(2026, 10, 18, 15, 0, 0).unwrap(),
            venue: "TBD".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Coarse confidence bucket assigned alongside the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    NotAnalyzed,
}

impl RiskLevel {
    /// Parse the label produced by the AI ("Low Risk", "low", ...).
    /// Anything unrecognised maps to `NotAnalyzed`.
    pub fn from_label(label: &str) -> Self {
        let l = label.trim().to_lowercase();
        let l = l.strip_suffix("risk").unwrap_or(&l).trim();
        match l {
            "low" => RiskLevel::Low,
            "medium" | "moderate" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            _ => RiskLevel::NotAnalyzed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low Risk",
            RiskLevel::Medium => "Medium Risk",
            RiskLevel::High => "High Risk",
            RiskLevel::NotAnalyzed => "Not Analyzed",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The AI verdict on a single fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAnalysis {
    pub fixture: Fixture,
    /// 0.0–10.0
    pub confidence: f64,
    pub risk: RiskLevel,
    /// Free text, or `NO_BET`.
    pub suggested_bet: String,
    pub rationale: String,
}

impl fmt::Display for MatchAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {:.1}/10 | {} | {}",
            self.fixture, self.confidence, self.risk, self.suggested_bet
        )
    }
}

/// A bet string counts as real unless it is empty or the `N/A` sentinel.
pub fn is_real_bet(bet: &str) -> bool {
    let b = bet.trim();
    !b.is_empty() && !b.eq_ignore_ascii_case(NO_BET)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Match status codes as reported by the result sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    NotStarted,
    Live,
    HalfTime,
    FullTime,
    AfterExtraTime,
    Penalties,
    Postponed,
    Cancelled,
    Abandoned,
    Walkover,
    Other(String),
}

impl MatchStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "NS" | "TBD" => MatchStatus::NotStarted,
            "LIVE" | "1H" | "2H" | "ET" | "BT" | "P" => MatchStatus::Live,
            "HT" => MatchStatus::HalfTime,
            "FT" => MatchStatus::FullTime,
            "AET" => MatchStatus::AfterExtraTime,
            "PEN" => MatchStatus::Penalties,
            "PST" => MatchStatus::Postponed,
            "CANC" => MatchStatus::Cancelled,
            "ABD" => MatchStatus::Abandoned,
            "WO" => MatchStatus::Walkover,
            other => MatchStatus::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            MatchStatus::NotStarted => "NS",
            MatchStatus::Live => "LIVE",
            MatchStatus::HalfTime => "HT",
            MatchStatus::FullTime => "FT",
            MatchStatus::AfterExtraTime => "AET",
            MatchStatus::Penalties => "PEN",
            MatchStatus::Postponed => "PST",
            MatchStatus::Cancelled => "CANC",
            MatchStatus::Abandoned => "ABD",
            MatchStatus::Walkover => "WO",
            MatchStatus::Other(code) => code,
        }
    }

    /// Played to completion: the score is final and bets can be settled.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            MatchStatus::FullTime
                | MatchStatus::AfterExtraTime
                | MatchStatus::Penalties
                | MatchStatus::Walkover
        )
    }

    /// No further result changes are expected.
    pub fn is_terminal(&self) -> bool {
        self.is_finished()
            || matches!(
                self,
                MatchStatus::Postponed | MatchStatus::Cancelled | MatchStatus::Abandoned
            )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A score reported by one of the result sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub home_score: u32,
    pub away_score: u32,
    pub status: MatchStatus,
    /// Which source produced the result ("API-Football", "ESPN", ...).
    pub source: String,
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} ({}) via {}",
            self.home_score, self.away_score, self.status, self.source
        )
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Unknown => "UNKNOWN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "WIN" => Some(Outcome::Win),
            "LOSS" => Some(Outcome::Loss),
            "UNKNOWN" => Some(Outcome::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of judging a bet string against a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// `None` when the bet format was not recognised.
    pub correct: Option<bool>,
    pub outcome: Outcome,
}

impl Verdict {
    pub fn decided(correct: bool) -> Self {
        Verdict {
            correct: Some(correct),
            outcome: if correct { Outcome::Win } else { Outcome::Loss },
        }
    }

    pub fn unknown() -> Self {
        Verdict {
            correct: None,
            outcome: Outcome::Unknown,
        }
    }

    pub fn is_win(&self) -> bool {
        self.outcome == Outcome::Win
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// A fixture with its analysis, result and outcome, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Store-assigned id.
    pub id: i64,
    pub fixture: Fixture,
    /// The selection day this record was analysed for.
    pub match_day: NaiveDate,
    pub confidence: f64,
    pub risk: RiskLevel,
    pub suggested_bet: Option<String>,
    pub rationale: Option<String>,
    pub in_accumulator: bool,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    pub status: Option<MatchStatus>,
    pub result_fetched: bool,
    pub result_fetched_at: Option<DateTime<Utc>>,
    pub result_source: Option<String>,
    pub prediction_correct: Option<bool>,
    pub outcome: Option<Outcome>,
    pub post_mortem: Option<String>,
    pub post_mortem_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchRecord {
    /// The bet to settle, if a real one was suggested.
    pub fn bet(&self) -> Option<&str> {
        self.suggested_bet.as_deref().filter(|b| is_real_bet(b))
    }

    /// Whether the stored status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().map(MatchStatus::is_terminal).unwrap_or(false)
    }

    /// Final score, when both sides are known.
    pub fn score(&self) -> Option<(u32, u32)> {
        Some((self.home_score?, self.away_score?))
    }

    /// A settled accumulator member: Arsenal 2-1 Chelsea, "Home Win" won.
    #[cfg(test)]
    pub fn sample(id: i64) -> Self {
        let fixture = Fixture::sample(id, "Arsenal", "Chelsea");
        let at = fixture.kickoff;
        MatchRecord {
            id,
            match_day: at.date_naive(),
            fixture,
            confidence: 7.5,
            risk: RiskLevel::Low,
            suggested_bet: Some("Home Win".to_string()),
            rationale: Some("Strong at home.".to_string()),
            in_accumulator: true,
            home_score: Some(2),
            away_score: Some(1),
            status: Some(MatchStatus::FullTime),
            result_fetched: true,
            result_fetched_at: Some(at),
            result_source: Some("API-Football".to_string()),
            prediction_correct: Some(true),
            outcome: Some(Outcome::Win),
            post_mortem: None,
            post_mortem_at: None,
            created_at: at,
            updated_at: at,
        }
    }
}

impl fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.score() {
            Some((h, a)) => write!(
                f,
                "#{} {} {h}-{a} {} ({})",
                self.id,
                self.fixture.home_team,
                self.fixture.away_team,
                self.status.as_ref().map(MatchStatus::code).unwrap_or("?"),
            ),
            None => write!(
                f,
                "#{} {} vs {}",
                self.id, self.fixture.home_team, self.fixture.away_team
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific errors callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum AccaError {
    #[error("Request quota exhausted ({source_name}): {message}")]
    QuotaExhausted { source_name: String, message: String },

    #[error("HTTP {status} from {source_name}")]
    Http { source_name: String, status: u16 },

    #[error("Match record not found: {0}")]
    RecordNotFound(i64),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Parse a `YYYY-MM-DD` date argument.
pub fn parse_day(s: &str) -> Result<NaiveDate, AccaError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| AccaError::InvalidDate(s.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
