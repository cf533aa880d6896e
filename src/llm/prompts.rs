//! Prompt builders for match analysis and post-mortems.

use crate::types::{Fixture, MatchRecord};

/// Analysis prompt for one fixture. `stats` is the pre-rendered
/// statistics block from the enricher.
pub fn analysis_prompt(fixture: &Fixture, stats: &str) -> String {
    let mut prompt = String::with_capacity(2000);

    prompt.push_str(
        "You are a professional football betting analyst. Assess how confidently \
         a single bet on this match can be recommended.\n\n",
    );
    prompt.push_str(&format!(
        "MATCH: {} vs {}\n",
        fixture.home_team, fixture.away_team
    ));
    prompt.push_str(&format!("LEAGUE: {}\n", fixture.league_name));
    prompt.push_str(&format!(
        "KICKOFF: {}\n",
        fixture.kickoff.format("%Y-%m-%d %H:%M UTC")
    ));
    prompt.push_str(&format!("VENUE: {}\n", fixture.venue));

    prompt.push_str("\nSTATISTICS:\n");
    prompt.push_str(stats);

    prompt.push_str(
        "\n\nRespond with ONLY a JSON object of this shape:\n\
         {\n\
           \"confidence_score\": <number 0.0-10.0>,\n\
           \"risk_level\": \"Low Risk\" | \"Medium Risk\" | \"High Risk\",\n\
           \"suggested_bet\": \"<e.g. Home Win, Over 2.5 Goals, BTTS, Double Chance Home or Draw>\",\n\
           \"rationale\": \"<two or three sentences>\"\n\
         }\n",
    );

    prompt
}

/// Post-mortem prompt for a settled record.
pub fn post_mortem_prompt(record: &MatchRecord) -> String {
    let (h, a) = record.score().unwrap_or_default();
    let outcome = record
        .outcome
        .map(|o| o.as_str())
        .unwrap_or("UNKNOWN");

    let mut prompt = String::with_capacity(1500);
    prompt.push_str(&format!(
        "MATCH: {} {h}-{a} {} ({})\n",
        record.fixture.home_team, record.fixture.away_team, record.fixture.league_name
    ));
    prompt.push_str(&format!(
        "PREDICTION: {} (confidence {:.1}/10, {})\n",
        record.suggested_bet.as_deref().unwrap_or("N/A"),
        record.confidence,
        record.risk
    ));
    if let Some(rationale) = &record.rationale {
        prompt.push_str(&format!("ORIGINAL RATIONALE: {rationale}\n"));
    }
    prompt.push_str(&format!("OUTCOME: {outcome}\n\n"));
    prompt.push_str(
        "In under 150 words, explain why the prediction succeeded or failed and \
         what signal, if any, was missed. Plain text only.\n",
    );

    prompt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
