//! End-to-end job tests: daily selection, result fetching with fallback,
//! settlement, post-mortems and manual override.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::sync::atomic::Ordering;
use std::time::Duration;

use smartacca::engine::jobs::{FetchScope, MANUAL_SOURCE};
use smartacca::storage::MatchStore;
use smartacca::types::{AccaError, Fixture, MatchStatus, Outcome, RiskLevel};

use crate::mock_sources::{analysis_reply, fixture, kickoff, match_day, Harness};

/// Five fixtures: two Low, one Medium, one High and one the AI fails on.
fn matchday_fixtures() -> Vec<Fixture> {
    vec![
        fixture(1, "Arsenal", "Chelsea", kickoff(12)),
        fixture(2, "Liverpool", "Everton", kickoff(14)),
        fixture(3, "Brighton", "Fulham", kickoff(15)),
        fixture(4, "Wolves", "Burnley", kickoff(15)),
        fixture(5, "Newcastle", "Spurs", kickoff(17)),
    ]
}

async fn matchday() -> Harness {
    let h = Harness::new(matchday_fixtures()).await;
    h.ai.script("Arsenal", analysis_reply(8.5, "Low Risk", "Home Win"));
    h.ai.script("Liverpool", analysis_reply(7.0, "Low Risk", "Over 2.5 Goals"));
    h.ai.script("Brighton", analysis_reply(6.5, "Medium Risk", "BTTS"));
    h.ai.script("Wolves", analysis_reply(9.0, "High Risk", "Home Win"));
    h
}

fn fixture_ids(records: &[smartacca::types::MatchRecord]) -> Vec<i64> {
    records.iter().map(|r| r.fixture.fixture_id).collect()
}

// ---------------------------------------------------------------------------
// Daily generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_daily_generation_persists_all_and_selects_eligible() {
    let h = matchday().await;
    let report = h.pipeline.generate_daily(match_day(), false).await.unwrap();

    assert_eq!(report.fixtures, 5);
    assert_eq!(report.persisted, 5);
    assert_eq!(report.failed, 0);
    let picked: Vec<i64> = report.selected.iter().map(|a| a.fixture.fixture_id).collect();
    assert_eq!(picked, vec![1, 2, 3]);

    let store = h.pipeline.store();
    let members = store.accumulator_for_day(match_day()).await.unwrap();
    assert_eq!(fixture_ids(&members), vec![1, 2, 3]);
    assert_eq!(store.by_day(match_day()).await.unwrap().len(), 5);

    let failed = store.by_fixture(5).await.unwrap().unwrap();
    assert_eq!(failed.risk, RiskLevel::High);
    assert_eq!(failed.confidence, 0.0);
    assert!(!failed.in_accumulator);
    assert!(failed
        .rationale
        .as_deref()
        .unwrap()
        .starts_with("Analysis unavailable"));

    // Pacing only: the failed call is not retried.
    assert_eq!(h.sleeper.take(), vec![Duration::from_secs(4); 4]);
}

#[tokio::test]
async fn test_rerun_same_day_is_idempotent() {
    let h = matchday().await;
    h.pipeline.generate_daily(match_day(), false).await.unwrap();
    let first_id = h.record_id(1).await;

    h.pipeline.generate_daily(match_day(), false).await.unwrap();

    let store = h.pipeline.store();
    assert_eq!(store.by_day(match_day()).await.unwrap().len(), 5);
    assert_eq!(h.record_id(1).await, first_id);
    let members = store.accumulator_for_day(match_day()).await.unwrap();
    assert_eq!(fixture_ids(&members), vec![1, 2, 3]);
    assert_eq!(h.fixtures.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reset_clears_previous_days() {
    let store = MatchStore::in_memory().await.unwrap();
    let saturday = match_day();
    let sunday = saturday.succ_opt().unwrap();

    let a = Harness::with_store(
        vec![
            fixture(1, "Arsenal", "Chelsea", kickoff(12)),
            fixture(2, "Liverpool", "Everton", kickoff(14)),
        ],
        store.clone(),
    )
    .await;
    a.ai.script("Arsenal", analysis_reply(8.0, "Low Risk", "Home Win"));
    a.ai.script("Liverpool", analysis_reply(7.0, "Low Risk", "Home Win"));
    a.pipeline.generate_daily(saturday, false).await.unwrap();

    let b = Harness::with_store(
        vec![fixture(11, "Leeds", "Sunderland", kickoff(13) + ChronoDuration::days(1))],
        store.clone(),
    )
    .await;
    b.ai.script("Leeds", analysis_reply(7.5, "Medium Risk", "Home Win"));

    b.pipeline.generate_daily(sunday, false).await.unwrap();
    assert_eq!(store.accumulator_members().await.unwrap().len(), 3);

    b.pipeline.generate_daily(sunday, true).await.unwrap();
    let members = store.accumulator_members().await.unwrap();
    assert_eq!(fixture_ids(&members), vec![11]);
    assert!(store.accumulator_for_day(saturday).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limited_analysis_waits_suggested_delay() {
    let h = Harness::new(vec![fixture(1, "Arsenal", "Chelsea", kickoff(12))]).await;
    h.ai.script("Arsenal", analysis_reply(8.0, "Low Risk", "Home Win"));
    h.ai.rate_limit(2);

    let report = h.pipeline.generate_daily(match_day(), false).await.unwrap();

    assert_eq!(report.selected.len(), 1);
    assert_eq!(report.selected[0].risk, RiskLevel::Low);
    assert_eq!(h.ai.analysis_calls.load(Ordering::SeqCst), 1);
    // "retry in 2s" plus the 1s buffer, twice.
    assert_eq!(h.sleeper.take(), vec![Duration::from_secs(3); 2]);
}

// ---------------------------------------------------------------------------
// Result fetching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_settles_members_and_writes_post_mortems() {
    let h = matchday().await;
    h.pipeline.generate_daily(match_day(), false).await.unwrap();
    h.sleeper.take();

    h.primary.set(1, 2, 0, MatchStatus::FullTime);
    h.primary.set(2, 1, 0, MatchStatus::FullTime);
    h.primary.set(4, 1, 0, MatchStatus::Live);
    h.board.push("Brighton & Hove Albion", "Fulham FC", (1, 1), MatchStatus::FullTime);

    let report = h.pipeline.fetch_results(FetchScope::Day(match_day())).await.unwrap();
    assert_eq!(report.considered, 5);
    assert_eq!(report.successful, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.accuracy.overall.correct, 2);
    assert_eq!(report.accuracy.overall.incorrect, 1);
    assert_eq!(report.accuracy.high_confidence.correct, 1);

    let store = h.pipeline.store();
    let arsenal = store.by_fixture(1).await.unwrap().unwrap();
    assert_eq!(arsenal.outcome, Some(Outcome::Win));
    assert_eq!(arsenal.prediction_correct, Some(true));
    assert!(arsenal.result_fetched);
    assert_eq!(
        arsenal.post_mortem.as_deref(),
        Some("The home side controlled midfield as expected.")
    );
    assert!(arsenal.post_mortem_at.is_some());

    let liverpool = store.by_fixture(2).await.unwrap().unwrap();
    assert_eq!(liverpool.outcome, Some(Outcome::Loss));

    let brighton = store.by_fixture(3).await.unwrap().unwrap();
    assert_eq!(brighton.outcome, Some(Outcome::Win));
    assert_eq!(brighton.result_source.as_deref(), Some("board"));

    // Live score stored, nothing settled, still pending.
    let wolves = store.by_fixture(4).await.unwrap().unwrap();
    assert_eq!(wolves.score(), Some((1, 0)));
    assert_eq!(wolves.status, Some(MatchStatus::Live));
    assert_eq!(wolves.outcome, None);
    assert!(!wolves.result_fetched);

    let newcastle = store.by_fixture(5).await.unwrap().unwrap();
    assert_eq!(newcastle.score(), None);

    // Post-mortems for the three members only; one pacing gap per record.
    assert_eq!(h.ai.post_mortem_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.sleeper.take(), vec![Duration::from_secs(1); 4]);
}

#[tokio::test]
async fn test_quota_exhaustion_falls_back_to_scoreboard() {
    let h = matchday().await;
    h.pipeline.generate_daily(match_day(), false).await.unwrap();

    h.primary.exhaust_quota();
    h.board.push("Arsenal FC", "Chelsea FC", (3, 1), MatchStatus::FullTime);

    let id = h.record_id(1).await;
    let report = h.pipeline.fetch_results(FetchScope::Record(id)).await.unwrap();
    assert_eq!(report.successful, 1);

    let record = h.pipeline.store().require(id).await.unwrap();
    assert_eq!(record.score(), Some((3, 1)));
    assert_eq!(record.result_source.as_deref(), Some("board"));
    assert_eq!(record.outcome, Some(Outcome::Win));
    assert_eq!(h.primary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.board.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_outcome_is_settled_once() {
    let h = matchday().await;
    h.pipeline.generate_daily(match_day(), false).await.unwrap();
    let id = h.record_id(1).await;

    h.primary.set(1, 2, 0, MatchStatus::FullTime);
    h.pipeline.fetch_results(FetchScope::Record(id)).await.unwrap();

    h.primary.set(1, 0, 2, MatchStatus::FullTime);
    h.pipeline.fetch_results(FetchScope::Record(id)).await.unwrap();

    let record = h.pipeline.store().require(id).await.unwrap();
    assert_eq!(record.score(), Some((0, 2)));
    assert_eq!(record.outcome, Some(Outcome::Win));
    assert_eq!(h.ai.post_mortem_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lookback_only_considers_recent_pending() {
    let now = Utc::now();
    let h = Harness::new(vec![
        fixture(1, "Arsenal", "Chelsea", now - ChronoDuration::hours(3)),
        fixture(2, "Liverpool", "Everton", now - ChronoDuration::days(3)),
    ])
    .await;
    h.ai.script("Arsenal", analysis_reply(8.0, "Low Risk", "Home Win"));
    h.ai.script("Liverpool", analysis_reply(7.0, "Low Risk", "Home Win"));
    let today = now.date_naive();
    h.pipeline.generate_daily(today, false).await.unwrap();

    h.primary.set(1, 1, 0, MatchStatus::FullTime);
    h.primary.set(2, 1, 0, MatchStatus::FullTime);

    let first = h.pipeline.fetch_results(FetchScope::LookBack(1)).await.unwrap();
    assert_eq!(first.considered, 1);
    assert_eq!(first.successful, 1);

    let again = h.pipeline.fetch_results(FetchScope::LookBack(1)).await.unwrap();
    assert_eq!(again.considered, 0);
}

// ---------------------------------------------------------------------------
// Manual override & scheduling gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_manual_result_always_reevaluates() {
    let h = matchday().await;
    h.pipeline.generate_daily(match_day(), false).await.unwrap();
    let id = h.record_id(1).await;

    h.primary.set(1, 2, 0, MatchStatus::FullTime);
    h.pipeline.fetch_results(FetchScope::Record(id)).await.unwrap();

    let record = h
        .pipeline
        .apply_manual_result(id, 0, 1, MatchStatus::FullTime)
        .await
        .unwrap();
    assert_eq!(record.score(), Some((0, 1)));
    assert_eq!(record.outcome, Some(Outcome::Loss));
    assert_eq!(record.prediction_correct, Some(false));
    assert_eq!(record.result_source.as_deref(), Some(MANUAL_SOURCE));
    assert!(record.result_fetched);
    assert_eq!(h.ai.post_mortem_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_manual_result_unknown_record() {
    let h = matchday().await;
    let err = h
        .pipeline
        .apply_manual_result(9999, 1, 0, MatchStatus::FullTime)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AccaError>(),
        Some(AccaError::RecordNotFound(9999))
    ));
}

#[tokio::test]
async fn test_keep_fetching_until_members_terminal() {
    let h = matchday().await;
    h.pipeline.generate_daily(match_day(), false).await.unwrap();
    assert!(h.pipeline.should_keep_fetching(match_day()).await.unwrap());

    h.primary.set(1, 2, 0, MatchStatus::FullTime);
    h.primary.set(2, 0, 0, MatchStatus::HalfTime);
    h.primary.set(3, 0, 0, MatchStatus::Postponed);
    h.pipeline.fetch_results(FetchScope::Day(match_day())).await.unwrap();
    assert!(h.pipeline.should_keep_fetching(match_day()).await.unwrap());

    // Non-members (4, 5) never hold the fetcher open.
    h.primary.set(2, 3, 1, MatchStatus::FullTime);
    h.pipeline.fetch_results(FetchScope::Day(match_day())).await.unwrap();
    assert!(!h.pipeline.should_keep_fetching(match_day()).await.unwrap());

    let other_day = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
    assert!(!h.pipeline.should_keep_fetching(other_day).await.unwrap());
}

#[tokio::test]
async fn test_file_store_survives_reconnect() {
    let path = std::env::temp_dir().join(format!("smartacca-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());

    {
        let store = MatchStore::connect(&url).await.unwrap();
        let h = Harness::with_store(vec![fixture(1, "Arsenal", "Chelsea", kickoff(12))], store).await;
        h.ai.script("Arsenal", analysis_reply(8.0, "Low Risk", "Home Win"));
        h.pipeline.generate_daily(match_day(), false).await.unwrap();
    }

    let reopened = MatchStore::connect(&url).await.unwrap();
    let members = reopened.accumulator_for_day(match_day()).await.unwrap();
    assert_eq!(fixture_ids(&members), vec![1]);
    assert_eq!(members[0].suggested_bet.as_deref(), Some("Home Win"));

    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}
