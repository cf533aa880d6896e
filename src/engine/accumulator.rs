//! Accumulator selection and accuracy statistics.

use serde::Serialize;
use std::fmt;

use crate::types::{MatchAnalysis, MatchRecord, Outcome, RiskLevel};

/// Matches in a full accumulator.
pub const DEFAULT_ACCA_SIZE: usize = 5;

/// Confidence at or above which a pick counts as high-confidence.
pub const HIGH_CONFIDENCE: f64 = 8.0;

/// Pick the accumulator from the day's analyses.
///
/// Low-risk matches form the pool; if there are fewer than `size` of
/// them, Medium-risk matches join it. The pool is ranked by confidence
/// (stable on ties, so pool order decides) and the top `size` are
/// returned as indices into `analyses`. High-risk and unanalysed matches
/// never qualify; a short pool gives a short accumulator.
pub fn select_accumulator(analyses: &[MatchAnalysis], size: usize) -> Vec<usize> {
    let of_risk = |risk: RiskLevel| {
        analyses
            .iter()
            .enumerate()
            .filter(move |(_, a)| a.risk == risk)
            .map(|(i, _)| i)
    };

    let mut pool: Vec<usize> = of_risk(RiskLevel::Low).collect();
    if pool.len() < size {
        pool.extend(of_risk(RiskLevel::Medium));
    }
    // Stable: on equal confidence Low-risk picks stay ahead.
    pool.sort_by(|&a, &b| analyses[b].confidence.total_cmp(&analyses[a].confidence));
    pool.truncate(size);
    pool
}

// ---------------------------------------------------------------------------
// Accuracy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Tally {
    pub correct: u32,
    pub incorrect: u32,
}

impl Tally {
    fn add(&mut self, won: bool) {
        if won {
            self.correct += 1;
        } else {
            self.incorrect += 1;
        }
    }

    pub fn decided(&self) -> u32 {
        self.correct + self.incorrect
    }

    /// Percentage correct, `None` with nothing decided.
    pub fn accuracy(&self) -> Option<f64> {
        let n = self.decided();
        (n > 0).then(|| self.correct as f64 * 100.0 / n as f64)
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.accuracy() {
            Some(pct) => write!(f, "{}/{} ({pct:.1}%)", self.correct, self.decided()),
            None => write!(f, "no settled predictions"),
        }
    }
}

/// Prediction accuracy over settled accumulator members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AccuracyStats {
    pub overall: Tally,
    /// Members with confidence at or above `HIGH_CONFIDENCE`.
    pub high_confidence: Tally,
    /// Unrecognised bets; excluded from both tallies.
    pub unknown: u32,
}

impl AccuracyStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MatchRecord>) -> Self {
        let mut stats = Self::default();
        for r in records.into_iter().filter(|r| r.in_accumulator) {
            match r.outcome {
                Some(Outcome::Unknown) => stats.unknown += 1,
                Some(o) => {
                    let won = o == Outcome::Win;
                    stats.overall.add(won);
                    if r.confidence >= HIGH_CONFIDENCE {
                        stats.high_confidence.add(won);
                    }
                }
                None => {}
            }
        }
        stats
    }
}

impl fmt::Display for AccuracyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overall {} | high confidence (>= {HIGH_CONFIDENCE:.1}) {} | unknown {}",
            self.overall, self.high_confidence, self.unknown
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fixture, NO_BET};

    fn analysis(id: i64, risk: RiskLevel, confidence: f64) -> MatchAnalysis {
        MatchAnalysis {
            fixture: Fixture::sample(id, "Home", "Away"),
            confidence,
            risk,
            suggested_bet: NO_BET.into(),
            rationale: String::new(),
        }
    }

    fn ids(analyses: &[MatchAnalysis], picked: &[usize]) -> Vec<i64> {
        picked.iter().map(|&i| analyses[i].fixture.fixture_id).collect()
    }

    #[test]
    fn test_low_and_medium_pool_top_five() {
        let a = vec![
            analysis(1, RiskLevel::Low, 6.0),
            analysis(2, RiskLevel::Low, 8.0),
            analysis(3, RiskLevel::Low, 5.0),
            analysis(4, RiskLevel::Medium, 9.0),
            analysis(5, RiskLevel::Medium, 7.0),
            analysis(6, RiskLevel::Medium, 4.0),
            analysis(7, RiskLevel::Medium, 6.5),
        ];
        let picked = select_accumulator(&a, 5);
        assert_eq!(ids(&a, &picked), vec![4, 2, 5, 7, 1]);
    }

    #[test]
    fn test_enough_low_excludes_medium() {
        let mut a: Vec<MatchAnalysis> = (1..=5).map(|i| analysis(i, RiskLevel::Low, 5.0 + i as f64 / 10.0)).collect();
        a.push(analysis(6, RiskLevel::Medium, 9.9));
        let picked = select_accumulator(&a, 5);
        assert_eq!(ids(&a, &picked), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_high_and_unanalysed_never_eligible() {
        let a = vec![
            analysis(1, RiskLevel::High, 9.5),
            analysis(2, RiskLevel::NotAnalyzed, 9.0),
            analysis(3, RiskLevel::Medium, 3.0),
        ];
        assert_eq!(ids(&a, &select_accumulator(&a, 5)), vec![3]);
        assert!(select_accumulator(&[], 5).is_empty());
    }

    #[test]
    fn test_ties_prefer_pool_order() {
        let a = vec![
            analysis(1, RiskLevel::Medium, 7.0),
            analysis(2, RiskLevel::Low, 7.0),
            analysis(3, RiskLevel::Medium, 7.0),
            analysis(4, RiskLevel::Low, 7.0),
        ];
        assert_eq!(ids(&a, &select_accumulator(&a, 3)), vec![2, 4, 1]);
    }

    #[test]
    fn test_accuracy_stats() {
        let mut records = Vec::new();
        for (id, outcome, confidence, member) in [
            (1, Some(Outcome::Win), 8.5, true),
            (2, Some(Outcome::Loss), 8.0, true),
            (3, Some(Outcome::Win), 6.0, true),
            (4, Some(Outcome::Unknown), 9.0, true),
            (5, None, 7.0, true),
            (6, Some(Outcome::Loss), 9.0, false),
        ] {
            let mut r = MatchRecord::sample(id);
            r.outcome = outcome;
            r.confidence = confidence;
            r.in_accumulator = member;
            records.push(r);
        }

        let stats = AccuracyStats::from_records(&records);
        assert_eq!(stats.overall, Tally { correct: 2, incorrect: 1 });
        assert_eq!(stats.high_confidence, Tally { correct: 1, incorrect: 1 });
        assert_eq!(stats.unknown, 1);
        assert!((stats.overall.accuracy().unwrap() - 66.666).abs() < 0.01);
        assert_eq!(Tally::default().accuracy(), None);
    }
}
