//! Team-name matching across data sources.
//!
//! API-Football, ESPN and football-data.org all spell clubs differently
//! ("Manchester United" / "Man Utd" / "Manchester United FC"). Names are
//! normalised through a fixed substitution table, then compared by exact
//! match, containment, and finally a Ratcliff/Obershelp similarity ratio.

use regex::Regex;
use std::sync::LazyLock;

/// Default similarity threshold for a fuzzy match.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Known aliases, applied to the whole lowercased name before the
/// generic rewrites. Canonical forms avoid the words those rewrites drop.
const ALIASES: &[(&str, &str)] = &[
    ("manchester united", "manutd"),
    ("manchester utd", "manutd"),
    ("man united", "manutd"),
    ("man utd", "manutd"),
    ("manchester city", "mancity"),
    ("man city", "mancity"),
    ("tottenham hotspur", "tottenham"),
    ("spurs", "tottenham"),
    ("brighton & hove albion", "brighton"),
    ("brighton and hove albion", "brighton"),
    ("wolverhampton wanderers", "wolves"),
    ("west bromwich albion", "west brom"),
    ("queens park rangers", "qpr"),
    ("nottingham forest", "nottm forest"),
    ("sheffield wednesday", "sheff wed"),
    ("sheffield united", "sheff utd"),
];

/// Generic substring rewrites, in order.
const REWRITES: &[(&str, &str)] = &[
    (" afc", ""),
    (" fc", ""),
    (" united", " utd"),
    (" city", ""),
    (" town", ""),
];

static RE_CLUB_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+(fc|afc|cf|sc)$").unwrap());

/// Normalise a team name for comparison.
pub fn normalize(name: &str) -> String {
    let mut n = name.trim().to_lowercase();

    for (from, to) in ALIASES {
        if n.contains(from) {
            n = n.replace(from, to);
        }
    }
    for (from, to) in REWRITES {
        n = n.replace(from, to);
    }

    RE_CLUB_SUFFIX.replace(&n, "").trim().to_string()
}

/// Whether two team names refer to the same club.
pub fn teams_match(a: &str, b: &str, threshold: f64) -> bool {
    let a = normalize(a);
    let b = normalize(b);

    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }

    similarity(&a, &b) >= threshold
}

/// Ratcliff/Obershelp ratio in [0, 1]: `2 * matched / (len_a + len_b)`,
/// where `matched` counts characters in recursively found longest
/// common blocks. Symmetric in its arguments.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    2.0 * matched as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common contiguous block as `(start_a, start_b, len)`;
/// earliest position in `a` wins ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j + 1] = length of the common suffix ending at a[i], b[j]
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                cur[j + 1] = prev[j] + 1;
                if cur[j + 1] > best.2 {
                    best = (i + 1 - cur[j + 1], j + 1 - cur[j + 1], cur[j + 1]);
                }
            }
        }
        prev = cur;
    }
    best
}

/// Matcher with a configured threshold.
#[derive(Debug, Clone, Copy)]
pub struct TeamNameMatcher {
    threshold: f64,
}

impl Default for TeamNameMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl TeamNameMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn matches(&self, a: &str, b: &str) -> bool {
        teams_match(a, b, self.threshold)
    }

    /// Both sides of a fixture line up.
    pub fn same_fixture(&self, home_a: &str, away_a: &str, home_b: &str, away_b: &str) -> bool {
        self.matches(home_a, home_b) && self.matches(away_a, away_b)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aliases_and_suffixes() {
        assert_eq!(normalize("Manchester United"), "manutd");
        assert_eq!(normalize("Man Utd"), "manutd");
        assert_eq!(normalize("Newcastle Jets FC"), "newcastle jets");
        assert_eq!(normalize("Ipswich Town"), "ipswich");
        assert_eq!(normalize("  Wolverhampton Wanderers "), "wolves");
        assert_eq!(normalize("Real Betis SC"), "real betis");
    }

    #[test]
    fn test_known_pairs_match() {
        assert!(teams_match("Manchester United", "Man Utd", DEFAULT_THRESHOLD));
        assert!(teams_match("Tottenham Hotspur", "Tottenham", DEFAULT_THRESHOLD));
        assert!(teams_match("Leicester City", "Leicester", DEFAULT_THRESHOLD));
        assert!(teams_match("Brighton & Hove Albion", "Brighton", DEFAULT_THRESHOLD));
        assert!(teams_match("Arsenal FC", "Arsenal", DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_different_teams_do_not_match() {
        assert!(!teams_match("Arsenal", "Chelsea", DEFAULT_THRESHOLD));
        assert!(!teams_match("Manchester City", "Manchester United", DEFAULT_THRESHOLD));
        assert!(!teams_match("Everton", "Fulham", DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_fuzzy_spelling_variants() {
        assert!(teams_match("Borussia Monchengladbach", "Borussia Mönchengladbach", DEFAULT_THRESHOLD));
        assert!(teams_match("Sheffield Wed", "Sheffield Wednesday", DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_empty_names_never_match() {
        assert!(!teams_match("", "Arsenal", DEFAULT_THRESHOLD));
        assert!(!teams_match("Arsenal", "  ", DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_similarity_properties() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", ""), 1.0);
        let ab = similarity("watford", "walford");
        let ba = similarity("walford", "watford");
        assert!((ab - ba).abs() < 1e-12);
        assert!((ab - 12.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_matcher_threshold() {
        let strict = TeamNameMatcher::new(0.99);
        let loose = TeamNameMatcher::new(0.5);
        assert!(!strict.matches("Watford", "Walford"));
        assert!(loose.matches("Watford", "Walford"));
        assert!(TeamNameMatcher::default().same_fixture(
            "Man Utd", "Spurs", "Manchester United", "Tottenham Hotspur"
        ));
    }
}
