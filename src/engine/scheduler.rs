//! Time-triggered job loop.
//!
//! A daily trigger generates the accumulator at a fixed local time and
//! starts an hourly result fetch; the hourly trigger cancels itself once
//! every accumulator member for the day has reached a terminal status.
//! Jobs run to completion inside a tick, so no two ever overlap.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use std::time::Duration;
use tracing::{error, info};

use crate::engine::jobs::{FetchScope, Pipeline};

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Local time of the daily generation run.
    pub daily_at: NaiveTime,
    pub results_every: Duration,
    /// How often the loop wakes to check triggers.
    pub poll: Duration,
    /// Pass `reset` to the daily job (clears every previous day's flags).
    pub reset_on_daily: bool,
    /// Look-back window for the hourly fetch.
    pub days_back: i64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            daily_at: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
            results_every: Duration::from_secs(3600),
            poll: Duration::from_secs(60),
            reset_on_daily: false,
            days_back: 1,
        }
    }
}

/// First occurrence of `at` strictly after `now`.
pub fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Which triggers fired on a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Due {
    pub daily: bool,
    pub results: bool,
}

/// Trigger bookkeeping, free of I/O.
#[derive(Debug, Clone)]
pub struct Schedule {
    daily_at: NaiveTime,
    results_every: ChronoDuration,
    next_daily: NaiveDateTime,
    next_results: Option<NaiveDateTime>,
}

impl Schedule {
    pub fn new(now: NaiveDateTime, daily_at: NaiveTime, results_every: Duration) -> Self {
        Self {
            daily_at,
            results_every: ChronoDuration::from_std(results_every)
                .unwrap_or_else(|_| ChronoDuration::hours(1)),
            next_daily: next_occurrence(now, daily_at),
            next_results: None,
        }
    }

    /// Start (or restart) the recurring result fetch, first run one
    /// interval from `now`.
    pub fn start_results(&mut self, now: NaiveDateTime) {
        self.next_results = Some(now + self.results_every);
    }

    pub fn stop_results(&mut self) {
        self.next_results = None;
    }

    pub fn results_active(&self) -> bool {
        self.next_results.is_some()
    }

    pub fn next_daily(&self) -> NaiveDateTime {
        self.next_daily
    }

    /// Fire whatever is due at `now` and re-arm it.
    pub fn due(&mut self, now: NaiveDateTime) -> Due {
        let mut due = Due::default();
        if now >= self.next_daily {
            due.daily = true;
            self.next_daily = next_occurrence(now, self.daily_at);
        }
        if let Some(at) = self.next_results {
            if now >= at {
                due.results = true;
                self.next_results = Some(now + self.results_every);
            }
        }
        due
    }
}

/// Run the scheduler until Ctrl+C.
pub async fn run(pipeline: &Pipeline, settings: &ScheduleSettings) -> Result<()> {
    let mut schedule = Schedule::new(Local::now().naive_local(), settings.daily_at, settings.results_every);

    // Restarted mid-day with matches still in play: resume fetching.
    let today = Local::now().date_naive();
    match pipeline.should_keep_fetching(today).await {
        Ok(true) => {
            schedule.start_results(Local::now().naive_local());
            info!("Resuming hourly result fetching");
        }
        Ok(false) => {}
        Err(e) => error!(error = %e, "Could not check today's accumulator"),
    }

    let mut ticker = tokio::time::interval(settings.poll);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        daily_at = %settings.daily_at,
        next_daily = %schedule.next_daily(),
        "Scheduler running. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Local::now().naive_local();
                let due = schedule.due(now);

                if due.daily {
                    let day = now.date();
                    info!(%day, "Starting daily match generation");
                    match pipeline.generate_daily(day, settings.reset_on_daily).await {
                        Ok(report) => {
                            info!(selected = report.selected.len(), "Daily matches generated");
                            schedule.start_results(now);
                            info!("Result fetching scheduled");
                        }
                        Err(e) => error!(error = %e, "Daily generation failed"),
                    }
                }

                if due.results {
                    match pipeline.fetch_results(FetchScope::LookBack(settings.days_back)).await {
                        Ok(report) => info!(
                            successful = report.successful,
                            failed = report.failed,
                            "Hourly result fetch complete"
                        ),
                        Err(e) => error!(error = %e, "Result fetch failed"),
                    }
                    match pipeline.should_keep_fetching(now.date()).await {
                        Ok(false) => {
                            schedule.stop_results();
                            info!("All accumulator matches for today have finished. Stopping result fetcher.");
                        }
                        Ok(true) => {}
                        Err(e) => error!(error = %e, "Could not check today's accumulator"),
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn seven() -> NaiveTime {
        NaiveTime::from_hms_opt(7, 0, 0).unwrap()
    }

    #[test]
    fn test_next_occurrence() {
        assert_eq!(next_occurrence(at(6, 59), seven()), at(7, 0));
        assert_eq!(next_occurrence(at(7, 0), seven()), at(7, 0) + ChronoDuration::days(1));
        assert_eq!(next_occurrence(at(22, 0), seven()), at(7, 0) + ChronoDuration::days(1));
    }

    #[test]
    fn test_daily_fires_once_per_day() {
        let mut s = Schedule::new(at(6, 0), seven(), Duration::from_secs(3600));
        assert_eq!(s.due(at(6, 59)), Due::default());
        assert!(s.due(at(7, 0)).daily);
        assert!(!s.due(at(7, 1)).daily);
        assert_eq!(s.next_daily(), at(7, 0) + ChronoDuration::days(1));
    }

    #[test]
    fn test_results_trigger_rearms_until_stopped() {
        let mut s = Schedule::new(at(6, 0), seven(), Duration::from_secs(3600));
        assert!(!s.due(at(8, 0)).results);

        s.start_results(at(7, 0));
        assert!(s.results_active());
        assert!(!s.due(at(7, 59)).results);
        assert!(s.due(at(8, 0)).results);
        assert!(!s.due(at(8, 30)).results);
        assert!(s.due(at(9, 0)).results);

        s.stop_results();
        assert!(!s.due(at(11, 0)).results);
        assert!(!s.results_active());
    }
}
