//! Batch jobs: daily accumulator generation, result fetching and manual
//! result entry.
//!
//! Jobs run one match at a time with a pacing sleep between external
//! calls. A failure on one match is logged and counted; it never aborts
//! the rest of the batch.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::bet;
use crate::data::FixtureSource;
use crate::engine::accumulator::{select_accumulator, AccuracyStats, DEFAULT_ACCA_SIZE};
use crate::engine::analyst::{MatchAnalyst, Sleeper};
use crate::engine::enricher::StatsProvider;
use crate::engine::resolver::ResultSourceChain;
use crate::storage::MatchStore;
use crate::types::{MatchAnalysis, MatchRecord, MatchResult, MatchStatus};

/// Source label for scores entered by hand.
pub const MANUAL_SOURCE: &str = "manual";

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub acca_size: usize,
    /// Sleep between AI analysis calls.
    pub analysis_pacing: Duration,
    /// Sleep between result lookups.
    pub results_pacing: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            acca_size: DEFAULT_ACCA_SIZE,
            analysis_pacing: Duration::from_secs(4),
            results_pacing: Duration::from_secs(1),
        }
    }
}

/// Which records a result fetch covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchScope {
    /// One record by id, whatever its state.
    Record(i64),
    /// Every record of a match day.
    Day(NaiveDate),
    /// Unfetched records that kicked off within the last `n` days.
    LookBack(i64),
}

#[derive(Debug, Clone)]
pub struct DailyReport {
    pub day: NaiveDate,
    pub fixtures: usize,
    pub persisted: usize,
    pub failed: usize,
    /// Accumulator picks, best first.
    pub selected: Vec<MatchAnalysis>,
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub considered: usize,
    pub successful: usize,
    pub failed: usize,
    pub accuracy: AccuracyStats,
}

pub struct Pipeline {
    store: MatchStore,
    fixtures: Arc<dyn FixtureSource>,
    stats: Arc<dyn StatsProvider>,
    analyst: MatchAnalyst,
    resolver: ResultSourceChain,
    sleeper: Arc<dyn Sleeper>,
    settings: JobSettings,
}

impl Pipeline {
    pub fn new(
        store: MatchStore,
        fixtures: Arc<dyn FixtureSource>,
        stats: Arc<dyn StatsProvider>,
        analyst: MatchAnalyst,
        resolver: ResultSourceChain,
        sleeper: Arc<dyn Sleeper>,
        settings: JobSettings,
    ) -> Self {
        Self {
            store,
            fixtures,
            stats,
            analyst,
            resolver,
            sleeper,
            settings,
        }
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    // -- Daily generation --------------------------------------------------

    /// Analyse the day's fixtures, persist every analysis and flag the
    /// accumulator. Rerunning for the same day replaces its membership;
    /// `reset` additionally clears membership on every other day.
    pub async fn generate_daily(&self, day: NaiveDate, reset: bool) -> Result<DailyReport> {
        if reset {
            let cleared = self.store.reset_all_accumulators().await?;
            info!(cleared, "Previous accumulator selections cleared");
        }

        let fixtures = self
            .fixtures
            .fixtures_for(day)
            .await
            .with_context(|| format!("Failed to fetch fixtures from {}", self.fixtures.name()))?;
        info!(%day, count = fixtures.len(), "Fixtures to analyse");

        let mut report = DailyReport {
            day,
            fixtures: fixtures.len(),
            persisted: 0,
            failed: 0,
            selected: Vec::new(),
        };

        let mut analyses = Vec::with_capacity(fixtures.len());
        for (i, fixture) in fixtures.iter().enumerate() {
            if i > 0 && !self.settings.analysis_pacing.is_zero() {
                self.sleeper.sleep(self.settings.analysis_pacing).await;
            }
            info!(n = i + 1, of = fixtures.len(), fixture = %fixture, "Analysing");

            let stats = self.stats.gather(fixture).await;
            let analysis = self.analyst.analyze(fixture, &stats.summary()).await;

            match self.store.upsert_analysis(&analysis, day).await {
                Ok(_) => {
                    report.persisted += 1;
                    analyses.push(analysis);
                }
                Err(e) => {
                    error!(fixture_id = fixture.fixture_id, error = %e, "Failed to save analysis");
                    report.failed += 1;
                }
            }
        }

        let picked = select_accumulator(&analyses, self.settings.acca_size);
        if picked.len() < self.settings.acca_size {
            warn!(
                picked = picked.len(),
                wanted = self.settings.acca_size,
                "Not enough eligible matches for a full accumulator"
            );
        }
        let ids: Vec<i64> = picked
            .iter()
            .map(|&i| analyses[i].fixture.fixture_id)
            .collect();
        self.store.set_accumulator(day, &ids).await?;

        report.selected = picked.into_iter().map(|i| analyses[i].clone()).collect();
        info!(
            %day,
            persisted = report.persisted,
            failed = report.failed,
            selected = report.selected.len(),
            "Daily accumulator generated"
        );
        Ok(report)
    }

    // -- Result fetching ---------------------------------------------------

    async fn records_for(&self, scope: FetchScope) -> Result<Vec<MatchRecord>> {
        match scope {
            FetchScope::Record(id) => Ok(vec![self.store.require(id).await?]),
            FetchScope::Day(day) => self.store.by_day(day).await,
            FetchScope::LookBack(days) => {
                let now = Utc::now();
                self.store
                    .pending_results(now - ChronoDuration::days(days), now)
                    .await
            }
        }
    }

    /// Resolve results for the scope, settle bets and write post-mortems.
    pub async fn fetch_results(&self, scope: FetchScope) -> Result<FetchReport> {
        let records = self.records_for(scope).await?;
        let mut report = FetchReport {
            considered: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            info!(?scope, "No matches to process");
            report.accuracy = self.accuracy().await?;
            return Ok(report);
        }
        info!(?scope, count = records.len(), "Fetching results");

        for (i, record) in records.iter().enumerate() {
            if i > 0 && !self.settings.results_pacing.is_zero() {
                self.sleeper.sleep(self.settings.results_pacing).await;
            }

            match self.process_record(record).await {
                Ok(true) => report.successful += 1,
                Ok(false) => {
                    warn!(record = %record, "Result not available yet");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(record_id = record.id, error = %e, "Failed to process record");
                    report.failed += 1;
                }
            }
        }

        report.accuracy = self.accuracy().await?;
        info!(
            successful = report.successful,
            failed = report.failed,
            accuracy = %report.accuracy,
            "Result fetch complete"
        );
        Ok(report)
    }

    async fn process_record(&self, record: &MatchRecord) -> Result<bool> {
        let Some(result) = self.resolver.resolve(&record.fixture).await else {
            return Ok(false);
        };
        self.store.record_result(record.id, &result).await?;

        let updated = with_result(record, &result);
        info!(record = %updated, source = %result.source, "Result stored");

        if updated.outcome.is_none() {
            self.settle(updated).await?;
        }
        Ok(true)
    }

    /// Evaluate the bet once the match is finished, then write a
    /// post-mortem for accumulator members.
    async fn settle(&self, mut record: MatchRecord) -> Result<()> {
        let finished = record.status.as_ref().is_some_and(MatchStatus::is_finished);
        let bet_text = record.bet().map(str::to_string);
        let (Some(bet_text), Some((h, a)), true) = (bet_text, record.score(), finished) else {
            return Ok(());
        };

        let verdict = bet::evaluate_bet(
            &bet_text,
            &record.fixture.home_team,
            &record.fixture.away_team,
            h,
            a,
        );
        self.store.record_outcome(record.id, verdict).await?;
        record.prediction_correct = verdict.correct;
        record.outcome = Some(verdict.outcome);
        info!(record_id = record.id, bet = %bet_text, outcome = %verdict.outcome, "Prediction settled");

        if record.in_accumulator {
            if let Some(text) = self.analyst.post_mortem(&record).await {
                self.store.record_post_mortem(record.id, &text).await?;
                info!(record_id = record.id, "Post-mortem stored");
            }
        }
        Ok(())
    }

    // -- Manual entry ------------------------------------------------------

    /// Enter a score by hand. The outcome is always re-evaluated.
    pub async fn apply_manual_result(
        &self,
        id: i64,
        home_score: u32,
        away_score: u32,
        status: MatchStatus,
    ) -> Result<MatchRecord> {
        let record = self.store.require(id).await?;
        let result = MatchResult {
            home_score,
            away_score,
            status,
            source: MANUAL_SOURCE.to_string(),
        };
        self.store.record_result(id, &result).await?;
        info!(record = %with_result(&record, &result), "Manual result stored");

        self.settle(with_result(&record, &result)).await?;
        self.store.require(id).await
    }

    // -- Queries -----------------------------------------------------------

    pub async fn accuracy(&self) -> Result<AccuracyStats> {
        let members = self.store.accumulator_members().await?;
        Ok(AccuracyStats::from_records(&members))
    }

    /// Whether any of the day's accumulator members can still change.
    pub async fn should_keep_fetching(&self, day: NaiveDate) -> Result<bool> {
        let members = self.store.accumulator_for_day(day).await?;
        let active = members.iter().filter(|r| !r.is_terminal()).count();
        if active > 0 {
            info!(%day, active, "Accumulator matches still active or upcoming");
        }
        Ok(active > 0)
    }
}

/// `record` with `result` applied, as `record_result` stores it.
fn with_result(record: &MatchRecord, result: &MatchResult) -> MatchRecord {
    let mut r = record.clone();
    r.home_score = Some(result.home_score);
    r.away_score = Some(result.away_score);
    r.status = Some(result.status.clone());
    r.result_source = Some(result.source.clone());
    r.result_fetched = result.status.is_terminal();
    r
}
