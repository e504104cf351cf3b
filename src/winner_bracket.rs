use tracing::info;

use crate::planner::split;
use crate::state::TournamentState;
use crate::types::{BracketType, TournamentPhase, MAX_HEAT_SIZE};

/// Builds the next WB round from the winner pool once the previous
/// qualification/WB round has been flown completely. Returns the new heat ids.
pub fn maybe_advance(state: &mut TournamentState) -> Vec<String> {
    if state.phase != TournamentPhase::Running
        || !state.qualification_resolved()
        || state.winner_side_open()
        || state.finales(BracketType::Winner).next().is_some()
        || state.winner_pool.is_empty()
    {
        return Vec::new();
    }

    let round = state.latest_round(BracketType::Winner) + 1;
    let eligible = state.winner_pool.len();
    if eligible <= MAX_HEAT_SIZE {
        let pilot_ids = state.winner_pool.dequeue_front(eligible);
        let heat_id = state.push_heat(BracketType::Winner, round, pilot_ids, true);
        info!("generated WB finale {heat_id} (round {round})");
        return vec![heat_id];
    }

    let sizes = round_sizes(eligible);
    let seated: usize = sizes.iter().sum();
    let pilot_ids = state.winner_pool.dequeue_front(seated);
    let mut heat_ids = Vec::with_capacity(sizes.len());
    for heat_pilots in deal(&pilot_ids, &sizes) {
        heat_ids.push(state.push_heat(BracketType::Winner, round, heat_pilots, false));
    }
    info!(
        "generated WB round {round}: {} heats, {} pilots on a bye",
        heat_ids.len(),
        state.winner_pool.len()
    );
    heat_ids
}

/// Heat sizes for a WB round of more than four pilots. Five cannot be split
/// into 3/4 heats, so the last pilot sits out one round.
fn round_sizes(eligible: usize) -> Vec<usize> {
    match split(eligible) {
        Some(plan) => plan.heat_sizes(),
        None => vec![MAX_HEAT_SIZE],
    }
}

/// Deals pilots round-robin across heats so pilots who arrived together
/// (same previous heat) end up apart.
fn deal(pilot_ids: &[String], sizes: &[usize]) -> Vec<Vec<String>> {
    let mut heats: Vec<Vec<String>> = sizes.iter().map(|size| Vec::with_capacity(*size)).collect();
    let mut slot = 0usize;
    for pilot_id in pilot_ids {
        while heats[slot].len() >= sizes[slot] {
            slot = (slot + 1) % sizes.len();
        }
        heats[slot].push(pilot_id.clone());
        slot = (slot + 1) % sizes.len();
    }
    heats
}
