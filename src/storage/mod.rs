//! Persistence layer.
//!
//! One SQLite table of `MatchRecord`s keyed by the external fixture id.
//! Every write is an upsert or a keyed update, so an interrupted job can
//! simply be rerun. Timestamps are stored as RFC 3339 UTC text, which
//! also makes them sort correctly as strings.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{
    AccaError, Fixture, MatchAnalysis, MatchRecord, MatchResult, MatchStatus, Outcome, RiskLevel,
    Verdict,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    fixture_id         INTEGER NOT NULL UNIQUE,
    home_team          TEXT    NOT NULL,
    away_team          TEXT    NOT NULL,
    home_team_id       INTEGER,
    away_team_id       INTEGER,
    league_id          INTEGER NOT NULL,
    league_name        TEXT    NOT NULL,
    season             INTEGER,
    kickoff            TEXT    NOT NULL,
    venue              TEXT    NOT NULL,
    match_day          TEXT    NOT NULL,
    confidence         REAL    NOT NULL DEFAULT 0,
    risk               TEXT    NOT NULL,
    suggested_bet      TEXT,
    rationale          TEXT,
    in_accumulator     INTEGER NOT NULL DEFAULT 0,
    home_score         INTEGER,
    away_score         INTEGER,
    status             TEXT,
    result_fetched     INTEGER NOT NULL DEFAULT 0,
    result_fetched_at  TEXT,
    result_source      TEXT,
    prediction_correct INTEGER,
    outcome            TEXT,
    post_mortem        TEXT,
    post_mortem_at     TEXT,
    created_at         TEXT    NOT NULL,
    updated_at         TEXT    NOT NULL
)
"#;

const INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_matches_day ON matches (match_day)";

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Bad timestamp in database: {s}"))?
        .with_timezone(&Utc))
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn score(row: &SqliteRow, column: &str) -> Result<Option<u32>> {
    let v: Option<i64> = row.try_get(column)?;
    Ok(v.and_then(|n| u32::try_from(n).ok()))
}

fn to_record(row: &SqliteRow) -> Result<MatchRecord> {
    let opt_ts = |column: &str| -> Result<Option<DateTime<Utc>>> {
        row.try_get::<Option<String>, _>(column)?
            .as_deref()
            .map(parse_ts)
            .transpose()
    };
    let match_day: String = row.try_get("match_day")?;
    let risk: String = row.try_get("risk")?;

    Ok(MatchRecord {
        id: row.try_get("id")?,
        fixture: Fixture {
            fixture_id: row.try_get("fixture_id")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
            home_team_id: row.try_get("home_team_id")?,
            away_team_id: row.try_get("away_team_id")?,
            league_id: row.try_get("league_id")?,
            league_name: row.try_get("league_name")?,
            season: row.try_get("season")?,
            kickoff: parse_ts(&row.try_get::<String, _>("kickoff")?)?,
            venue: row.try_get("venue")?,
        },
        match_day: NaiveDate::parse_from_str(&match_day, "%Y-%m-%d")
            .with_context(|| format!("Bad match_day in database: {match_day}"))?,
        confidence: row.try_get("confidence")?,
        risk: RiskLevel::from_label(&risk),
        suggested_bet: row.try_get("suggested_bet")?,
        rationale: row.try_get("rationale")?,
        in_accumulator: row.try_get("in_accumulator")?,
        home_score: score(row, "home_score")?,
        away_score: score(row, "away_score")?,
        status: row
            .try_get::<Option<String>, _>("status")?
            .map(|s| MatchStatus::from_code(&s)),
        result_fetched: row.try_get("result_fetched")?,
        result_fetched_at: opt_ts("result_fetched_at")?,
        result_source: row.try_get("result_source")?,
        prediction_correct: row.try_get("prediction_correct")?,
        outcome: row
            .try_get::<Option<String>, _>("outcome")?
            .and_then(|s| Outcome::from_code(&s)),
        post_mortem: row.try_get("post_mortem")?,
        post_mortem_at: opt_ts("post_mortem_at")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

/// SQLite-backed store of match records.
#[derive(Clone)]
pub struct MatchStore {
    pool: SqlitePool,
}

impl MatchStore {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite://smartacca.db`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {url}"))?;

        let store = Self { pool };
        store.init().await?;
        info!(url, "Match store ready");
        Ok(store)
    }

    /// Private in-memory database. A single long-lived connection keeps
    /// the data alive for the life of the pool.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to create matches table")?;
        sqlx::query(INDEX)
            .execute(&self.pool)
            .await
            .context("Failed to create match_day index")?;
        Ok(())
    }

    // -- Daily analysis ----------------------------------------------------

    /// Insert or refresh the analysis for a fixture, returning the record
    /// id. Result, outcome and membership fields are left untouched.
    pub async fn upsert_analysis(&self, analysis: &MatchAnalysis, day: NaiveDate) -> Result<i64> {
        let f = &analysis.fixture;
        let now = ts(Utc::now());

        let row = sqlx::query(
            r#"
            INSERT INTO matches (
                fixture_id, home_team, away_team, home_team_id, away_team_id,
                league_id, league_name, season, kickoff, venue, match_day,
                confidence, risk, suggested_bet, rationale, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(fixture_id) DO UPDATE SET
                home_team     = excluded.home_team,
                away_team     = excluded.away_team,
                home_team_id  = excluded.home_team_id,
                away_team_id  = excluded.away_team_id,
                league_id     = excluded.league_id,
                league_name   = excluded.league_name,
                season        = excluded.season,
                kickoff       = excluded.kickoff,
                venue         = excluded.venue,
                match_day     = excluded.match_day,
                confidence    = excluded.confidence,
                risk          = excluded.risk,
                suggested_bet = excluded.suggested_bet,
                rationale     = excluded.rationale,
                updated_at    = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(f.fixture_id)
        .bind(&f.home_team)
        .bind(&f.away_team)
        .bind(f.home_team_id)
        .bind(f.away_team_id)
        .bind(f.league_id)
        .bind(&f.league_name)
        .bind(f.season)
        .bind(ts(f.kickoff))
        .bind(&f.venue)
        .bind(day_key(day))
        .bind(analysis.confidence)
        .bind(analysis.risk.as_str())
        .bind(&analysis.suggested_bet)
        .bind(&analysis.rationale)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert fixture {}", f.fixture_id))?;

        Ok(row.try_get("id")?)
    }

    /// Replace the day's accumulator with `fixture_ids`, atomically.
    pub async fn set_accumulator(&self, day: NaiveDate, fixture_ids: &[i64]) -> Result<()> {
        let now = ts(Utc::now());
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let cleared = sqlx::query(
            "UPDATE matches SET in_accumulator = 0, updated_at = ? \
             WHERE match_day = ? AND in_accumulator = 1",
        )
        .bind(&now)
        .bind(day_key(day))
        .execute(&mut *tx)
        .await
        .context("Failed to clear accumulator")?
        .rows_affected();

        for id in fixture_ids {
            sqlx::query("UPDATE matches SET in_accumulator = 1, updated_at = ? WHERE fixture_id = ?")
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to flag fixture {id}"))?;
        }

        tx.commit().await.context("Failed to commit accumulator")?;
        debug!(%day, cleared, selected = fixture_ids.len(), "Accumulator stored");
        Ok(())
    }

    /// Clear accumulator membership on every record.
    pub async fn reset_all_accumulators(&self) -> Result<u64> {
        let done = sqlx::query("UPDATE matches SET in_accumulator = 0, updated_at = ? WHERE in_accumulator = 1")
            .bind(ts(Utc::now()))
            .execute(&self.pool)
            .await
            .context("Failed to reset accumulator flags")?;
        Ok(done.rows_affected())
    }

    // -- Queries -----------------------------------------------------------

    pub async fn get(&self, id: i64) -> Result<Option<MatchRecord>> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load record {id}"))?;
        row.as_ref().map(to_record).transpose()
    }

    /// Like `get`, but a missing record is an `AccaError::RecordNotFound`.
    pub async fn require(&self, id: i64) -> Result<MatchRecord> {
        self.get(id).await?.ok_or_else(|| AccaError::RecordNotFound(id).into())
    }

    pub async fn by_fixture(&self, fixture_id: i64) -> Result<Option<MatchRecord>> {
        let row = sqlx::query("SELECT * FROM matches WHERE fixture_id = ?")
            .bind(fixture_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load fixture {fixture_id}"))?;
        row.as_ref().map(to_record).transpose()
    }

    async fn select(&self, sql: &str, binds: &[String]) -> Result<Vec<MatchRecord>> {
        let mut query = sqlx::query(sql);
        for b in binds {
            query = query.bind(b);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("Failed to query matches")?;
        rows.iter().map(to_record).collect()
    }

    /// Every record for a match day, by kickoff.
    pub async fn by_day(&self, day: NaiveDate) -> Result<Vec<MatchRecord>> {
        self.select(
            "SELECT * FROM matches WHERE match_day = ? ORDER BY kickoff, id",
            &[day_key(day)],
        )
        .await
    }

    /// The day's accumulator members, by confidence.
    pub async fn accumulator_for_day(&self, day: NaiveDate) -> Result<Vec<MatchRecord>> {
        self.select(
            "SELECT * FROM matches WHERE match_day = ? AND in_accumulator = 1 \
             ORDER BY confidence DESC, id",
            &[day_key(day)],
        )
        .await
    }

    /// Every accumulator member ever selected.
    pub async fn accumulator_members(&self) -> Result<Vec<MatchRecord>> {
        self.select(
            "SELECT * FROM matches WHERE in_accumulator = 1 ORDER BY match_day, id",
            &[],
        )
        .await
    }

    /// Records still awaiting a final result whose kickoff falls within
    /// `[since, until]`.
    pub async fn pending_results(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>> {
        self.select(
            "SELECT * FROM matches WHERE result_fetched = 0 AND kickoff >= ? AND kickoff <= ? \
             ORDER BY kickoff, id",
            &[ts(since), ts(until)],
        )
        .await
    }

    // -- Result updates ----------------------------------------------------

    /// Store a score. `result_fetched` is only set once the status is
    /// terminal, so live scores keep being refreshed.
    pub async fn record_result(&self, id: i64, result: &MatchResult) -> Result<()> {
        let now = Utc::now();
        let terminal = result.status.is_terminal();

        sqlx::query(
            r#"
            UPDATE matches SET
                home_score = ?, away_score = ?, status = ?, result_source = ?,
                result_fetched = ?, result_fetched_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(result.home_score))
        .bind(i64::from(result.away_score))
        .bind(result.status.code())
        .bind(&result.source)
        .bind(terminal)
        .bind(terminal.then(|| ts(now)))
        .bind(ts(now))
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store result for record {id}"))?;
        Ok(())
    }

    pub async fn record_outcome(&self, id: i64, verdict: Verdict) -> Result<()> {
        sqlx::query(
            "UPDATE matches SET prediction_correct = ?, outcome = ?, updated_at = ? WHERE id = ?",
        )
        .bind(verdict.correct)
        .bind(verdict.outcome.as_str())
        .bind(ts(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store outcome for record {id}"))?;
        Ok(())
    }

    pub async fn record_post_mortem(&self, id: i64, text: &str) -> Result<()> {
        let now = ts(Utc::now());
        sqlx::query("UPDATE matches SET post_mortem = ?, post_mortem_at = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to store post-mortem for record {id}"))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
