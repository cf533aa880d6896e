//! Result resolution across an ordered chain of sources.
//!
//! The authoritative source is asked first by fixture id; on quota
//! exhaustion, transport failure, a non-success status or simply no
//! result, each fallback scoreboard is asked once, in order, and the
//! first one with a scored, name-matched fixture wins. Exhausting the
//! chain is not an error: the result is just not available yet.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::data::{ResultSource, ScoreLine, Scoreboard};
use crate::engine::matcher::TeamNameMatcher;
use crate::types::{AccaError, Fixture, MatchResult};

/// First scoreboard line whose teams both match the fixture and which
/// carries a full score.
pub fn find_in_scoreboard<'a>(
    fixture: &Fixture,
    lines: &'a [ScoreLine],
    matcher: &TeamNameMatcher,
) -> Option<&'a ScoreLine> {
    lines.iter().find(|line| {
        line.home_score.is_some()
            && line.away_score.is_some()
            && matcher.same_fixture(
                &fixture.home_team,
                &fixture.away_team,
                &line.home_team,
                &line.away_team,
            )
    })
}

/// Adapts a day/league `Scoreboard` into a `ResultSource` by team-name
/// matching.
pub struct ScoreboardSource<S> {
    board: S,
    matcher: TeamNameMatcher,
}

impl<S: Scoreboard> ScoreboardSource<S> {
    pub fn new(board: S, matcher: TeamNameMatcher) -> Self {
        Self { board, matcher }
    }
}

#[async_trait]
impl<S: Scoreboard> ResultSource for ScoreboardSource<S> {
    async fn try_resolve(&self, fixture: &Fixture) -> Result<Option<MatchResult>> {
        let day = fixture.kickoff.date_naive();
        let lines = self.board.scoreboard(fixture.league_id, day).await?;
        debug!(
            source = self.board.name(),
            fixture_id = fixture.fixture_id,
            candidates = lines.len(),
            "Scoreboard fetched"
        );

        Ok(find_in_scoreboard(fixture, &lines, &self.matcher).and_then(|line| {
            Some(MatchResult {
                home_score: line.home_score?,
                away_score: line.away_score?,
                status: line.status.clone(),
                source: self.board.name().to_string(),
            })
        }))
    }

    fn name(&self) -> &str {
        self.board.name()
    }
}

/// Ordered list of result sources, primary first.
pub struct ResultSourceChain {
    sources: Vec<Box<dyn ResultSource>>,
}

impl ResultSourceChain {
    pub fn new(sources: Vec<Box<dyn ResultSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// First result any source yields, or `None` if none has it yet.
    pub async fn resolve(&self, fixture: &Fixture) -> Option<MatchResult> {
        for source in &self.sources {
            match source.try_resolve(fixture).await {
                Ok(Some(result)) => {
                    info!(
                        fixture_id = fixture.fixture_id,
                        source = source.name(),
                        score = %result,
                        "Result resolved"
                    );
                    return Some(result);
                }
                Ok(None) => {
                    debug!(
                        fixture_id = fixture.fixture_id,
                        source = source.name(),
                        "No result from source"
                    );
                }
                Err(e) => match e.downcast_ref::<AccaError>() {
                    Some(AccaError::QuotaExhausted { .. }) => {
                        warn!(
                            fixture_id = fixture.fixture_id,
                            source = source.name(),
                            "Quota exhausted, falling back"
                        );
                    }
                    _ => {
                        warn!(
                            fixture_id = fixture.fixture_id,
                            source = source.name(),
                            error = %e,
                            "Result source failed, falling back"
                        );
                    }
                },
            }
        }

        debug!(fixture_id = fixture.fixture_id, "Result not available from any source");
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchStatus;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Quota,
        Fail,
        Empty,
        Score(u32, u32),
    }

    struct Stub {
        name: &'static str,
        behaviour: Behaviour,
        calls: Arc<AtomicU32>,
    }

    fn stub(name: &'static str, behaviour: Behaviour) -> (Box<dyn ResultSource>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Box::new(Stub {
                name,
                behaviour,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[async_trait]
    impl ResultSource for Stub {
        async fn try_resolve(&self, _fixture: &Fixture) -> Result<Option<MatchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Quota => Err(AccaError::QuotaExhausted {
                    source_name: self.name.into(),
                    message: "request limit for the day".into(),
                }
                .into()),
                Behaviour::Fail => Err(anyhow::anyhow!("connection reset")),
                Behaviour::Empty => Ok(None),
                Behaviour::Score(h, a) => Ok(Some(MatchResult {
                    home_score: h,
                    away_score: a,
                    status: MatchStatus::FullTime,
                    source: self.name.into(),
                })),
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    struct Board(Vec<ScoreLine>);

    #[async_trait]
    impl Scoreboard for Board {
        async fn scoreboard(&self, _league_id: i64, _day: NaiveDate) -> Result<Vec<ScoreLine>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "board"
        }
    }

    fn line(home: &str, away: &str, score: Option<(u32, u32)>) -> ScoreLine {
        ScoreLine {
            home_team: home.into(),
            away_team: away.into(),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            status: if score.is_some() { MatchStatus::FullTime } else { MatchStatus::NotStarted },
        }
    }

    #[tokio::test]
    async fn test_primary_wins_without_fallback() {
        let (primary, _) = stub("primary", Behaviour::Score(2, 1));
        let (fallback, fallback_calls) = stub("fallback", Behaviour::Score(0, 0));
        let chain = ResultSourceChain::new(vec![primary, fallback]);

        let r = chain.resolve(&Fixture::sample(1, "Arsenal", "Chelsea")).await.unwrap();
        assert_eq!((r.home_score, r.away_score), (2, 1));
        assert_eq!(r.source, "primary");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quota_falls_through_in_order() {
        let (primary, _) = stub("primary", Behaviour::Quota);
        let (a, a_calls) = stub("a", Behaviour::Fail);
        let (b, b_calls) = stub("b", Behaviour::Score(1, 1));
        let (c, c_calls) = stub("c", Behaviour::Score(3, 3));
        let chain = ResultSourceChain::new(vec![primary, a, b, c]);

        let r = chain.resolve(&Fixture::sample(1, "Arsenal", "Chelsea")).await.unwrap();
        assert_eq!(r.source, "b");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_none() {
        let (primary, _) = stub("primary", Behaviour::Empty);
        let (a, _) = stub("a", Behaviour::Fail);
        let chain = ResultSourceChain::new(vec![primary, a]);
        assert!(chain.resolve(&Fixture::sample(1, "Arsenal", "Chelsea")).await.is_none());
        assert_eq!(chain.source_names(), vec!["primary", "a"]);
    }

    #[tokio::test]
    async fn test_scoreboard_source_matches_names() {
        let board = Board(vec![
            line("Liverpool", "Everton", Some((1, 0))),
            line("Manchester United FC", "Tottenham Hotspur FC", Some((3, 2))),
        ]);
        let source = ScoreboardSource::new(board, TeamNameMatcher::default());

        let r = source
            .try_resolve(&Fixture::sample(7, "Man Utd", "Spurs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((r.home_score, r.away_score), (3, 2));
        assert_eq!(r.source, "board");
    }

    #[test]
    fn test_find_skips_unscored_lines() {
        let lines = vec![
            line("Arsenal", "Chelsea", None),
            line("Arsenal FC", "Chelsea FC", Some((0, 0))),
        ];
        let found = find_in_scoreboard(
            &Fixture::sample(1, "Arsenal", "Chelsea"),
            &lines,
            &TeamNameMatcher::default(),
        );
        assert_eq!(found.map(|l| l.home_team.as_str()), Some("Arsenal FC"));
    }
}
