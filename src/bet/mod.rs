//! Bet grammar: parse free-text bet descriptions and settle them.
//!
//! A suggested bet such as `"Arsenal win & BTTS"` is parsed once into a
//! `BetExpr` (a single `Predicate` or a `Conjunction` of them) and then
//! evaluated against a final score. Unrecognised text parses to
//! `Predicate::Unrecognized` and settles as `Outcome::Unknown`; it is
//! never an error.

use std::fmt;

use crate::types::Verdict;

/// The only goal line the grammar settles; other lines are unrecognised.
pub const GOAL_LINE: f64 = 2.5;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

/// A single verifiable proposition about a final score.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    HomeWin,
    AwayWin,
    Draw,
    BothTeamsScore,
    OverGoals(f64),
    UnderGoals(f64),
    /// The named side wins or the match is drawn.
    DoubleChance(Side),
    Unrecognized(String),
}

impl Predicate {
    /// Whether the proposition holds; `None` if it cannot be judged.
    pub fn holds(&self, home_score: u32, away_score: u32) -> Option<bool> {
        let total = f64::from(home_score + away_score);
        let held = match self {
            Predicate::HomeWin => home_score > away_score,
            Predicate::AwayWin => away_score > home_score,
            Predicate::Draw => home_score == away_score,
            Predicate::BothTeamsScore => home_score > 0 && away_score > 0,
            Predicate::OverGoals(line) => total > *line,
            Predicate::UnderGoals(line) => total < *line,
            Predicate::DoubleChance(Side::Home) => home_score >= away_score,
            Predicate::DoubleChance(Side::Away) => away_score >= home_score,
            Predicate::Unrecognized(_) => return None,
        };
        Some(held)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::HomeWin => write!(f, "Home Win"),
            Predicate::AwayWin => write!(f, "Away Win"),
            Predicate::Draw => write!(f, "Draw"),
            Predicate::BothTeamsScore => write!(f, "BTTS"),
            Predicate::OverGoals(l) => write!(f, "Over {l}"),
            Predicate::UnderGoals(l) => write!(f, "Under {l}"),
            Predicate::DoubleChance(Side::Home) => write!(f, "Home or Draw"),
            Predicate::DoubleChance(Side::Away) => write!(f, "Away or Draw"),
            Predicate::Unrecognized(t) => write!(f, "?({t})"),
        }
    }
}

/// Parsed form of a suggested-bet string.
#[derive(Debug, Clone, PartialEq)]
pub enum BetExpr {
    Single(Predicate),
    /// Every part must win for the bet to win.
    Conjunction(Vec<BetExpr>),
}

impl fmt::Display for BetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetExpr::Single(p) => write!(f, "{p}"),
            BetExpr::Conjunction(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(" & "))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Team names the bet text may refer to.
#[derive(Debug, Clone)]
pub struct Teams {
    home: String,
    away: String,
}

impl Teams {
    pub fn new(home: &str, away: &str) -> Self {
        Teams {
            home: home.trim().to_lowercase(),
            away: away.trim().to_lowercase(),
        }
    }
}

/// Parse a bet description. Matching is case-insensitive.
pub fn parse(bet: &str, teams: &Teams) -> BetExpr {
    let text = bet.trim().to_lowercase();

    // Compound bets must be split before their parts are classified,
    // otherwise "home win and over 2.5" would settle as a plain home win.
    if text.contains(" and ") || text.contains(" & ") {
        let parts: Vec<BetExpr> = text
            .replace(" and ", " & ")
            .split('&')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| parse(p, teams))
            .collect();
        return match parts.len() {
            0 => BetExpr::Single(Predicate::Unrecognized(text)),
            1 => parts.into_iter().next().unwrap_or(BetExpr::Single(Predicate::Unrecognized(text))),
            _ => BetExpr::Conjunction(parts),
        };
    }

    BetExpr::Single(classify(&text, teams))
}

/// Classify a simple (non-compound) lowercase bet, first match wins.
///
/// The order is significant: "Arsenal or Draw" is a home win because the
/// text starts with the home team, and "Home or Draw" is a draw because
/// it never says "double chance".
fn classify(text: &str, teams: &Teams) -> Predicate {
    let named_win = |name: &str| !name.is_empty() && text.contains(&format!("{name} win"));

    if text.contains("home win")
        || named_win(&teams.home)
        || (!teams.home.is_empty() && text.starts_with(&teams.home))
    {
        return Predicate::HomeWin;
    }
    if text.contains("away win")
        || named_win(&teams.away)
        || (!teams.away.is_empty() && text.starts_with(&teams.away))
    {
        return Predicate::AwayWin;
    }
    if text.contains("draw") && !text.contains("double chance") {
        return Predicate::Draw;
    }
    if text.contains("both teams to score") || text.contains("btts") || has_token(text, "gg") {
        return Predicate::BothTeamsScore;
    }
    if text.contains("over 2.5") || text.contains("o2.5") {
        return Predicate::OverGoals(GOAL_LINE);
    }
    if text.contains("under 2.5") || text.contains("u2.5") {
        return Predicate::UnderGoals(GOAL_LINE);
    }
    if text.contains("double chance") || text.contains("or draw") {
        let home_named = !teams.home.is_empty() && text.contains(&teams.home);
        return Predicate::DoubleChance(if home_named { Side::Home } else { Side::Away });
    }

    Predicate::Unrecognized(text.to_string())
}

/// Whole-word token check with hyphens stripped ("G-G" counts as "gg").
fn has_token(text: &str, token: &str) -> bool {
    text.replace('-', "")
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == token)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Settle a parsed bet against a final score.
///
/// A conjunction wins only if every part wins; an unrecognised part
/// makes the whole conjunction a loss rather than unknown.
pub fn evaluate(expr: &BetExpr, home_score: u32, away_score: u32) -> Verdict {
    match expr {
        BetExpr::Single(p) => match p.holds(home_score, away_score) {
            Some(correct) => Verdict::decided(correct),
            None => Verdict::unknown(),
        },
        BetExpr::Conjunction(parts) => {
            let all_won = parts
                .iter()
                .all(|part| evaluate(part, home_score, away_score).is_win());
            Verdict::decided(all_won)
        }
    }
}

/// Parse and settle in one step.
pub fn evaluate_bet(
    bet: &str,
    home_team: &str,
    away_team: &str,
    home_score: u32,
    away_score: u32,
) -> Verdict {
    let expr = parse(bet, &Teams::new(home_team, away_team));
    evaluate(&expr, home_score, away_score)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
