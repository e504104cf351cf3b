use tracing::{info, warn};

use crate::state::TournamentState;
use crate::types::{BracketOrigin, BracketType, PilotBracket, TournamentPhase};

/// Top two of a completed bracket finale who are still flying. A finalist
/// who dropped out afterwards leaves their seat empty.
fn finalists(state: &TournamentState, bracket_type: BracketType) -> Option<Vec<String>> {
    let top = state
        .completed_finale(bracket_type)?
        .results
        .as_ref()?
        .top_pilots();
    Some(
        top.into_iter()
            .filter(|pilot_id| !state.is_dropped_out(pilot_id) && !state.eliminated.contains(pilot_id))
            .collect(),
    )
}

/// Seats `[wb1, wb2, lb1, lb2]` in the grand finale once both bracket finales
/// are completed and moves the tournament into the finale phase. No-op (and
/// `None`) otherwise, including when the grand finale already exists.
pub fn maybe_build(state: &mut TournamentState) -> Option<String> {
    if state.grand_finale().is_some() {
        return None;
    }
    let wb_finalists = finalists(state, BracketType::Winner)?;
    let lb_finalists = finalists(state, BracketType::Loser)?;
    if wb_finalists.is_empty() && lb_finalists.is_empty() {
        warn!("every finalist dropped out, no grand finale to seat");
        return None;
    }

    for pilot_id in &wb_finalists {
        state.set_bracket(pilot_id, PilotBracket::GrandFinale, Some(BracketOrigin::Wb));
    }
    for pilot_id in &lb_finalists {
        state.set_bracket(pilot_id, PilotBracket::GrandFinale, Some(BracketOrigin::Lb));
    }

    let mut pilot_ids = wb_finalists;
    pilot_ids.extend(lb_finalists);
    let heat_id = state.push_heat(BracketType::GrandFinale, 1, pilot_ids, true);
    state.phase = TournamentPhase::Finale;
    info!("grand finale {heat_id} seated, tournament phase is now finale");
    Some(heat_id)
}
