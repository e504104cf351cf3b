use crate::state::TournamentState;
use crate::types::Heat;

/// Earliest pending heat of a different bracket than the one flown last, so
/// WB and LB heats alternate; otherwise the earliest pending heat.
pub fn next_recommended_heat(state: &TournamentState) -> Option<&Heat> {
    let pending = state.pending_heats();
    let alternate = state.last_completed_bracket_type.and_then(|last| {
        pending
            .iter()
            .find(|heat| heat.bracket_type != last)
            .copied()
    });
    alternate.or_else(|| pending.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BracketType, HeatStatus};

    fn state_with(heats: &[(u32, BracketType, HeatStatus)]) -> TournamentState {
        let mut state = TournamentState::new();
        for (number, bracket_type, status) in heats {
            let mut heat = Heat::new(*number, *bracket_type, 1, vec![format!("p{number}")], false);
            heat.status = *status;
            state.heats.push(heat);
        }
        state
    }

    #[test]
    fn alternates_away_from_last_bracket() {
        let mut state = state_with(&[
            (1, BracketType::Winner, HeatStatus::Completed),
            (2, BracketType::Winner, HeatStatus::Pending),
            (3, BracketType::Loser, HeatStatus::Pending),
        ]);
        state.last_completed_bracket_type = Some(BracketType::Winner);
        assert_eq!(next_recommended_heat(&state).unwrap().id, "heat-3");

        state.last_completed_bracket_type = Some(BracketType::Loser);
        assert_eq!(next_recommended_heat(&state).unwrap().id, "heat-2");
    }

    #[test]
    fn falls_back_to_earliest_pending() {
        let mut state = state_with(&[
            (4, BracketType::Winner, HeatStatus::Pending),
            (2, BracketType::Winner, HeatStatus::Pending),
        ]);
        state.last_completed_bracket_type = Some(BracketType::Winner);
        assert_eq!(next_recommended_heat(&state).unwrap().id, "heat-2");
        state.last_completed_bracket_type = None;
        assert_eq!(next_recommended_heat(&state).unwrap().id, "heat-2");
    }

    #[test]
    fn nothing_pending_means_no_recommendation() {
        let state = state_with(&[(1, BracketType::Loser, HeatStatus::Active)]);
        assert!(next_recommended_heat(&state).is_none());
    }
}
