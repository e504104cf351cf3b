use tracing::{debug, info};

use crate::state::TournamentState;
use crate::types::{BracketType, TournamentPhase, MAX_HEAT_SIZE, MIN_HEAT_SIZE};

/// Whether the pool can form an LB heat right now.
///
/// A full heat can always be formed. Smaller pools wait as wildcards while the
/// winner bracket can still feed them; once it can't, three pilots fly on
/// their own, and one or two pilots only fly as the LB finale.
pub fn can_generate(state: &TournamentState) -> bool {
    if state.phase != TournamentPhase::Running || state.finales(BracketType::Loser).next().is_some() {
        return false;
    }
    let waiting = state.loser_pool.len();
    if waiting >= MAX_HEAT_SIZE {
        return true;
    }
    if waiting == 0 || state.winner_side_open() {
        return false;
    }
    waiting >= MIN_HEAT_SIZE || finale_ready(state)
}

/// The next LB heat would hold every pilot still alive in the loser bracket.
fn finale_ready(state: &TournamentState) -> bool {
    state.completed_finale(BracketType::Winner).is_some()
        && !state.loser_heat_open()
        && !state.loser_pool.is_empty()
        && state.loser_pool.len() <= MAX_HEAT_SIZE
}

/// Moves the first four pooled pilots (longest waiting first) into a new
/// pending LB heat. `None` without touching anything when the pool is not
/// ready or qualification is still running.
pub fn generate(state: &mut TournamentState) -> Option<String> {
    if !state.qualification_resolved() || !can_generate(state) {
        debug!(
            "LB heat not generated: pool={} quali_resolved={}",
            state.loser_pool.len(),
            state.qualification_resolved()
        );
        return None;
    }
    let is_finale = finale_ready(state);
    let pilot_ids = state.loser_pool.dequeue_front(MAX_HEAT_SIZE);
    let round = pilot_ids
        .iter()
        .map(|id| state.loser_depth(id))
        .max()
        .unwrap_or(0)
        + 1;
    let heat_id = state.push_heat(BracketType::Loser, round, pilot_ids, is_finale);
    info!(
        "generated {}LB heat {} (round {}), {} pilots still waiting",
        if is_finale { "final " } else { "" },
        heat_id,
        round,
        state.loser_pool.len()
    );
    Some(heat_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Heat, HeatStatus};

    fn running_state(pool: &[&str]) -> TournamentState {
        let mut state = TournamentState::new();
        state.phase = TournamentPhase::Running;
        let mut quali = Heat::new(1, BracketType::Qualification, 1, vec!["q".into()], false);
        quali.status = HeatStatus::Completed;
        state.heats.push(quali);
        for id in pool {
            state.loser_pool.enqueue(*id);
        }
        state
    }

    fn add_wb_heat(state: &mut TournamentState, status: HeatStatus, is_finale: bool) {
        let number = state.next_heat_number();
        let mut heat = Heat::new(number, BracketType::Winner, 1, vec!["w".into()], is_finale);
        heat.status = status;
        state.heats.push(heat);
    }

    #[test]
    fn full_pool_generates_first_four_fifo() {
        let mut state = running_state(&["a", "b", "c", "d", "e"]);
        add_wb_heat(&mut state, HeatStatus::Pending, false);
        assert!(can_generate(&state));
        let id = generate(&mut state).unwrap();
        let heat = state.heat(&id).unwrap();
        assert_eq!(heat.pilot_ids, vec!["a", "b", "c", "d"]);
        assert_eq!(heat.bracket_type, BracketType::Loser);
        assert_eq!(heat.round_number, 1);
        assert!(!heat.is_finale);
        assert_eq!(state.loser_pool.to_vec(), vec!["e"]);
    }

    #[test]
    fn small_pool_waits_while_winner_bracket_can_feed() {
        let mut state = running_state(&["a", "b", "c"]);
        add_wb_heat(&mut state, HeatStatus::Active, false);
        assert!(!can_generate(&state));
        assert_eq!(generate(&mut state), None);
        assert_eq!(state.loser_pool.len(), 3);
        assert_eq!(state.heats.len(), 2);
    }

    #[test]
    fn three_pilots_fly_once_the_round_is_over() {
        let mut state = running_state(&["a", "b", "c"]);
        add_wb_heat(&mut state, HeatStatus::Completed, false);
        assert!(can_generate(&state));
        let id = generate(&mut state).unwrap();
        assert_eq!(state.heat(&id).unwrap().pilot_ids.len(), 3);
        assert!(state.loser_pool.is_empty());
    }

    #[test]
    fn two_wildcards_wait_until_the_finale() {
        let mut state = running_state(&["a", "b"]);
        add_wb_heat(&mut state, HeatStatus::Completed, false);
        assert!(!can_generate(&state));

        let mut state = running_state(&["a", "b"]);
        add_wb_heat(&mut state, HeatStatus::Completed, true);
        assert!(can_generate(&state));
        let id = generate(&mut state).unwrap();
        assert!(state.heat(&id).unwrap().is_finale);
    }

    #[test]
    fn finale_needs_quiet_loser_bracket() {
        let mut state = running_state(&["a", "b", "c", "d"]);
        add_wb_heat(&mut state, HeatStatus::Completed, true);
        let number = state.next_heat_number();
        state.heats.push(Heat::new(number, BracketType::Loser, 1, vec!["x".into()], false));
        let id = generate(&mut state).unwrap();
        assert!(!state.heat(&id).unwrap().is_finale);
    }

    #[test]
    fn nothing_before_qualification_is_resolved() {
        let mut state = running_state(&["a", "b", "c", "d"]);
        state.heats[0].status = HeatStatus::Pending;
        assert_eq!(generate(&mut state), None);
        assert_eq!(state.loser_pool.len(), 4);
    }

    #[test]
    fn round_follows_deepest_pilot() {
        let mut state = running_state(&["a", "b", "c", "d"]);
        let mut previous = Heat::new(2, BracketType::Loser, 2, vec!["b".into()], false);
        previous.status = HeatStatus::Completed;
        state.heats.push(previous);
        let id = generate(&mut state).unwrap();
        assert_eq!(state.heat(&id).unwrap().round_number, 3);
    }
}
