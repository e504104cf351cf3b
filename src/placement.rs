use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::state::TournamentState;
use crate::types::{BracketOrigin, BracketType, ADVANCING_RANK};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub place: u32,
    pub pilot_id: String,
    pub bracket_origin: Option<BracketOrigin>,
}

/// Grand-finale ranks as flown, once that heat is completed.
pub fn top4(state: &TournamentState) -> Option<Vec<Placement>> {
    let finale = state.grand_finale().filter(|heat| heat.is_completed())?;
    let results = finale.results.as_ref()?;
    let mut placements: Vec<Placement> = results
        .rankings
        .iter()
        .map(|ranking| Placement {
            place: ranking.rank,
            pilot_id: ranking.pilot_id.clone(),
            bracket_origin: state
                .pilot_bracket_states
                .get(&ranking.pilot_id)
                .and_then(|entry| entry.bracket_origin),
        })
        .collect();
    placements.sort_by_key(|placement| placement.place);
    Some(placements)
}

/// Inclusive placement range shared by pilots eliminated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankGroup {
    pub from: usize,
    pub to: usize,
}

impl fmt::Display for RankGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

/// LB round in which `pilot_id` finished outside the top two, if any.
pub fn elimination_round(state: &TournamentState, pilot_id: &str) -> Option<u32> {
    state
        .heats
        .iter()
        .filter(|heat| heat.bracket_type == BracketType::Loser && heat.is_completed())
        .find_map(|heat| {
            let rank = heat.results.as_ref()?.rank_of(pilot_id)?;
            (rank > ADVANCING_RANK).then_some(heat.round_number)
        })
}

/// Pilots who took part in the bracket, i.e. were seated in any heat.
fn field_size(state: &TournamentState) -> usize {
    state
        .heats
        .iter()
        .flat_map(|heat| heat.pilot_ids.iter())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Placement ranges for every eliminated pilot. Earlier eliminations take
/// the worst places; drop-outs without an elimination heat rank below all of
/// them.
pub fn rank_groups(state: &TournamentState) -> BTreeMap<String, RankGroup> {
    let mut by_round: BTreeMap<u32, Vec<&String>> = BTreeMap::new();
    for pilot_id in state.eliminated.iter() {
        let round = elimination_round(state, pilot_id).unwrap_or(0);
        by_round.entry(round).or_default().push(pilot_id);
    }

    let mut groups = BTreeMap::new();
    let mut worst = field_size(state).max(state.eliminated.len());
    for pilot_ids in by_round.values() {
        let group = RankGroup {
            from: worst + 1 - pilot_ids.len(),
            to: worst,
        };
        for pilot_id in pilot_ids {
            groups.insert((*pilot_id).clone(), group);
        }
        worst -= pilot_ids.len();
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Heat, HeatResults, HeatStatus, Ranking};

    fn flown(number: u32, bracket_type: BracketType, round: u32, order: &[&str]) -> Heat {
        let pilot_ids: Vec<String> = order.iter().map(|id| id.to_string()).collect();
        let mut heat = Heat::new(number, bracket_type, round, pilot_ids.clone(), false);
        heat.status = HeatStatus::Completed;
        heat.results = Some(HeatResults {
            rankings: pilot_ids
                .iter()
                .enumerate()
                .map(|(i, id)| Ranking::new(id.clone(), i as u32 + 1))
                .collect(),
            completed_at: 0,
        });
        heat
    }

    #[test]
    fn top4_only_after_grand_finale() {
        let mut state = TournamentState::new();
        assert!(top4(&state).is_none());
        let mut finale = flown(9, BracketType::GrandFinale, 1, &["c", "a", "d", "b"]);
        finale.is_finale = true;
        finale.status = HeatStatus::Pending;
        state.heats.push(finale.clone());
        assert!(top4(&state).is_none());

        finale.status = HeatStatus::Completed;
        state.heats[0] = finale;
        state.set_bracket("c", crate::types::PilotBracket::GrandFinale, Some(BracketOrigin::Lb));
        let places = top4(&state).unwrap();
        let order: Vec<&str> = places.iter().map(|p| p.pilot_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "d", "b"]);
        assert_eq!(places[0].place, 1);
        assert_eq!(places[0].bracket_origin, Some(BracketOrigin::Lb));
    }

    #[test]
    fn same_round_shares_a_range() {
        let mut state = TournamentState::new();
        state.heats.push(flown(1, BracketType::Qualification, 1, &["a", "b", "c", "d"]));
        state.heats.push(flown(2, BracketType::Qualification, 1, &["e", "f", "g", "h"]));
        state.heats.push(flown(3, BracketType::Loser, 1, &["c", "d", "g", "h"]));
        state.heats.push(flown(4, BracketType::Loser, 2, &["c", "b", "d", "f"]));
        for id in ["g", "h", "d", "f"] {
            state.eliminated.insert(id);
        }
        let groups = rank_groups(&state);
        assert_eq!(groups["g"].to_string(), "7-8");
        assert_eq!(groups["h"].to_string(), "7-8");
        assert_eq!(groups["d"].to_string(), "5-6");
        assert_eq!(groups["f"], RankGroup { from: 5, to: 6 });
        assert!(!groups.contains_key("a"));
    }

    #[test]
    fn dropouts_rank_last_and_singletons_render_plain() {
        let mut state = TournamentState::new();
        state.heats.push(flown(1, BracketType::Qualification, 1, &["a", "b", "c", "d"]));
        state.heats.push(flown(2, BracketType::Qualification, 1, &["e", "f", "g"]));
        state.heats.push(flown(3, BracketType::Loser, 1, &["c", "d", "g"]));
        state.eliminated.insert("e");
        state.eliminated.insert("g");
        let groups = rank_groups(&state);
        assert_eq!(groups["e"].to_string(), "7");
        assert_eq!(groups["g"].to_string(), "6");
    }
}
