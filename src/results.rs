use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::errors::{FieldError, Precondition, TournamentError, TournamentResult};
use crate::state::TournamentState;
use crate::types::{
    BracketOrigin, BracketType, Heat, HeatResults, HeatStatus, PilotBracket, Ranking,
    ADVANCING_RANK,
};

/// Where each pilot of a completed heat went.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatOutcome {
    pub heat_id: String,
    pub bracket_type: BracketType,
    pub is_finale: bool,
    /// Pilots queued for the next winner-bracket round.
    pub advanced: Vec<String>,
    /// Pilots appended to the loser pool, in rank order.
    pub pooled: Vec<String>,
    pub eliminated: Vec<String>,
    /// Grand-finale seats won, or the final order for the grand finale itself.
    pub finalists: Vec<String>,
    /// Heats created by the follow-up generators.
    pub generated_heats: Vec<String>,
}

/// Every problem with `rankings` for `heat`; empty when they can be applied.
pub fn validate_rankings(state: &TournamentState, heat: &Heat, rankings: &[Ranking]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let expected: Vec<String> = state.rankable_pilots(heat);
    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let count = expected.len() as u32;

    let mut seen_pilots: HashSet<&str> = HashSet::new();
    let mut seen_ranks: HashSet<u32> = HashSet::new();
    for ranking in rankings {
        let pilot_id = ranking.pilot_id.as_str();
        if !heat.contains(pilot_id) {
            errors.push(FieldError::new(
                "rankings",
                format!("pilot {pilot_id} is not part of {}", heat.id),
            ));
        } else if !expected_set.contains(pilot_id) {
            errors.push(FieldError::new(
                "rankings",
                format!("pilot {pilot_id} has dropped out and cannot be ranked"),
            ));
        }
        if !seen_pilots.insert(pilot_id) {
            errors.push(FieldError::new(
                "rankings",
                format!("pilot {pilot_id} is ranked more than once"),
            ));
        }
        if ranking.rank == 0 || ranking.rank > count {
            errors.push(FieldError::new(
                "rankings",
                format!("rank {} is outside 1-{count}", ranking.rank),
            ));
        } else if !seen_ranks.insert(ranking.rank) {
            errors.push(FieldError::new(
                "rankings",
                format!("rank {} is assigned more than once", ranking.rank),
            ));
        }
    }

    for pilot_id in &expected {
        if !seen_pilots.contains(pilot_id.as_str()) {
            errors.push(FieldError::new(
                "rankings",
                format!("pilot {pilot_id} has no rank"),
            ));
        }
    }
    errors
}

/// Validates and stores `rankings` for `heat_id`, then routes its pilots.
/// Nothing is touched unless every check passes.
pub fn apply(
    state: &mut TournamentState,
    heat_id: &str,
    rankings: Vec<Ranking>,
    now_ms: u64,
) -> TournamentResult<HeatOutcome> {
    let index = state
        .heat_index(heat_id)
        .ok_or_else(|| Precondition::UnknownHeat(heat_id.to_string()))?;
    let heat = &state.heats[index];
    if heat.is_completed() {
        return Err(Precondition::HeatLocked(heat_id.to_string()).into());
    }
    let errors = validate_rankings(state, heat, &rankings);
    if !errors.is_empty() {
        return Err(TournamentError::Validation(errors));
    }

    let mut rankings = rankings;
    rankings.sort_by_key(|ranking| ranking.rank);
    let (top, bottom): (Vec<&Ranking>, Vec<&Ranking>) = rankings
        .iter()
        .partition(|ranking| ranking.rank <= ADVANCING_RANK);
    let top: Vec<String> = top.into_iter().map(|r| r.pilot_id.clone()).collect();
    let bottom: Vec<String> = bottom.into_iter().map(|r| r.pilot_id.clone()).collect();

    let bracket_type = heat.bracket_type;
    let is_finale = heat.is_finale;
    let mut outcome = HeatOutcome {
        heat_id: heat_id.to_string(),
        bracket_type,
        is_finale,
        ..HeatOutcome::default()
    };

    match (bracket_type, is_finale) {
        (BracketType::Qualification, _) | (BracketType::Winner, false) => {
            for pilot_id in &top {
                state.winner_pool.enqueue(pilot_id.clone());
                state.set_bracket(pilot_id, PilotBracket::Winner, None);
            }
            for pilot_id in &bottom {
                state.loser_pool.enqueue(pilot_id.clone());
                state.set_bracket(pilot_id, PilotBracket::Loser, None);
            }
            outcome.advanced = top;
            outcome.pooled = bottom;
        }
        (BracketType::Winner, true) => {
            for pilot_id in &top {
                state.set_bracket(pilot_id, PilotBracket::GrandFinale, Some(BracketOrigin::Wb));
            }
            for pilot_id in &bottom {
                state.loser_pool.enqueue(pilot_id.clone());
                state.set_bracket(pilot_id, PilotBracket::Loser, None);
            }
            outcome.finalists = top;
            outcome.pooled = bottom;
        }
        (BracketType::Loser, false) => {
            for pilot_id in &top {
                state.loser_pool.enqueue(pilot_id.clone());
                state.set_bracket(pilot_id, PilotBracket::Loser, None);
            }
            eliminate(state, &bottom);
            outcome.pooled = top;
            outcome.eliminated = bottom;
        }
        (BracketType::Loser, true) => {
            for pilot_id in &top {
                state.set_bracket(pilot_id, PilotBracket::GrandFinale, Some(BracketOrigin::Lb));
            }
            eliminate(state, &bottom);
            outcome.finalists = top;
            outcome.eliminated = bottom;
        }
        (BracketType::GrandFinale, _) => {
            outcome.finalists = rankings.iter().map(|r| r.pilot_id.clone()).collect();
        }
    }

    let heat = &mut state.heats[index];
    heat.status = HeatStatus::Completed;
    heat.results = Some(HeatResults {
        rankings,
        completed_at: now_ms,
    });
    state.last_completed_bracket_type = Some(bracket_type);

    info!(
        "{} completed: advanced={:?} pooled={:?} eliminated={:?} finalists={:?}",
        heat_id, outcome.advanced, outcome.pooled, outcome.eliminated, outcome.finalists
    );
    Ok(outcome)
}

fn eliminate(state: &mut TournamentState, pilot_ids: &[String]) {
    for pilot_id in pilot_ids {
        state.loser_pool.remove(pilot_id);
        state.eliminated.insert(pilot_id.clone());
        state.set_bracket(pilot_id, PilotBracket::Eliminated, None);
    }
}
