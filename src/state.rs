use std::collections::BTreeMap;

use crate::pool::{EliminatedSet, PilotQueue};
use crate::qualification::HeatAssignment;
use crate::recommendation::next_recommended_heat;
use crate::roster::PilotRoster;
use crate::types::{
  BracketOrigin, BracketType, Heat, HeatStatus, PilotBracket, PilotBracketState, TournamentPhase,
};

/// Everything the tournament knows. Derived views (active heat, round
/// completion, finales) are computed from `heats` on demand, never cached.
#[derive(Debug, Clone, Default)]
pub struct TournamentState {
  pub phase: TournamentPhase,
  pub roster: PilotRoster,
  pub heats: Vec<Heat>,
  pub loser_pool: PilotQueue,
  pub winner_pool: PilotQueue,
  pub eliminated: EliminatedSet,
  pub last_completed_bracket_type: Option<BracketType>,
  pub pilot_bracket_states: BTreeMap<String, PilotBracketState>,
  pub heat_assignment: Option<HeatAssignment>,
}

impl TournamentState {
  pub fn new() -> Self {
    TournamentState::default()
  }

  pub fn heat(&self, heat_id: &str) -> Option<&Heat> {
    self.heats.iter().find(|heat| heat.id == heat_id)
  }

  pub fn heat_index(&self, heat_id: &str) -> Option<usize> {
    self.heats.iter().position(|heat| heat.id == heat_id)
  }

  pub fn next_heat_number(&self) -> u32 {
    self.heats.iter().map(|heat| heat.heat_number).max().unwrap_or(0) + 1
  }

  pub fn active_heat(&self) -> Option<&Heat> {
    self.heats.iter().find(|heat| heat.status == HeatStatus::Active)
  }

  /// Pending heats ordered by heat number.
  pub fn pending_heats(&self) -> Vec<&Heat> {
    let mut pending: Vec<&Heat> = self
      .heats
      .iter()
      .filter(|heat| heat.status == HeatStatus::Pending)
      .collect();
    pending.sort_by_key(|heat| heat.heat_number);
    pending
  }

  pub fn is_dropped_out(&self, pilot_id: &str) -> bool {
    self.roster.is_dropped_out(pilot_id)
  }

  /// Pilots of `heat` that still have to be ranked.
  pub fn rankable_pilots(&self, heat: &Heat) -> Vec<String> {
    heat
      .pilot_ids
      .iter()
      .filter(|id| !self.is_dropped_out(id))
      .cloned()
      .collect()
  }

  /// True once every heat sharing `bracket_type` and `round` is completed.
  pub fn round_complete(&self, bracket_type: BracketType, round: u32) -> bool {
    let mut round_heats = self
      .heats
      .iter()
      .filter(|heat| heat.bracket_type == bracket_type && heat.round_number == round)
      .peekable();
    round_heats.peek().is_some() && round_heats.all(Heat::is_completed)
  }

  /// Whether a qualification/WB heat is still unflown, i.e. the WB can still
  /// push losers into the pool.
  pub fn winner_side_open(&self) -> bool {
    self
      .heats
      .iter()
      .any(|heat| heat.bracket_type.is_winner_side() && heat.is_open())
  }

  pub fn loser_heat_open(&self) -> bool {
    self
      .heats
      .iter()
      .any(|heat| heat.bracket_type == BracketType::Loser && heat.is_open())
  }

  pub fn qualification_resolved(&self) -> bool {
    let mut quali = self
      .heats
      .iter()
      .filter(|heat| heat.bracket_type == BracketType::Qualification)
      .peekable();
    quali.peek().is_some() && quali.all(Heat::is_completed)
  }

  pub fn finales(&self, bracket_type: BracketType) -> impl Iterator<Item = &Heat> {
    self
      .heats
      .iter()
      .filter(move |heat| heat.bracket_type == bracket_type && heat.is_finale)
  }

  /// The finale of `bracket_type` if exactly one exists and it is completed.
  pub fn completed_finale(&self, bracket_type: BracketType) -> Option<&Heat> {
    let finales: Vec<&Heat> = self.finales(bracket_type).collect();
    match finales.as_slice() {
      [only] if only.is_completed() => Some(*only),
      _ => None,
    }
  }

  pub fn grand_finale(&self) -> Option<&Heat> {
    self
      .heats
      .iter()
      .find(|heat| heat.bracket_type == BracketType::GrandFinale)
  }

  pub fn latest_round(&self, bracket_type: BracketType) -> u32 {
    self
      .heats
      .iter()
      .filter(|heat| heat.bracket_type == bracket_type)
      .map(|heat| heat.round_number)
      .max()
      .unwrap_or(0)
  }

  /// Deepest LB round `pilot_id` has been placed in; 0 for WB-only pilots.
  pub fn loser_depth(&self, pilot_id: &str) -> u32 {
    self
      .heats
      .iter()
      .filter(|heat| heat.bracket_type == BracketType::Loser && heat.contains(pilot_id))
      .map(|heat| heat.round_number)
      .max()
      .unwrap_or(0)
  }

  /// Earliest unflown heat holding `pilot_id`.
  pub fn next_heat_for(&self, pilot_id: &str) -> Option<&Heat> {
    self
      .heats
      .iter()
      .filter(|heat| heat.is_open() && heat.contains(pilot_id))
      .min_by_key(|heat| heat.heat_number)
  }

  /// Completed heats in which `pilot_id` was ranked, in heat-number order.
  pub fn flown_heats(&self, pilot_id: &str) -> Vec<&Heat> {
    let mut flown: Vec<&Heat> = self
      .heats
      .iter()
      .filter(|heat| {
        heat
          .results
          .as_ref()
          .and_then(|results| results.rank_of(pilot_id))
          .is_some()
      })
      .collect();
    flown.sort_by_key(|heat| heat.heat_number);
    flown
  }

  /// Index into `heats` the UI should focus: active heat, else the
  /// recommended pending one, else one past the end.
  pub fn current_heat_index(&self) -> usize {
    if let Some(index) = self
      .heats
      .iter()
      .position(|heat| heat.status == HeatStatus::Active)
    {
      return index;
    }
    next_recommended_heat(self)
      .and_then(|heat| self.heat_index(&heat.id))
      .unwrap_or(self.heats.len())
  }

  /// Elimination is terminal: an eliminated pilot keeps that state.
  pub fn set_bracket(&mut self, pilot_id: &str, bracket: PilotBracket, origin: Option<BracketOrigin>) {
    let eliminated = self
      .pilot_bracket_states
      .get(pilot_id)
      .is_some_and(|entry| entry.bracket == PilotBracket::Eliminated);
    if eliminated && bracket != PilotBracket::Eliminated {
      return;
    }
    self.pilot_bracket_states.insert(
      pilot_id.to_string(),
      PilotBracketState {
        bracket,
        bracket_origin: origin,
      },
    );
  }

  /// Appends a new pending heat numbered `max + 1` and returns its id.
  pub fn push_heat(
    &mut self,
    bracket_type: BracketType,
    round: u32,
    pilot_ids: Vec<String>,
    is_finale: bool,
  ) -> String {
    let heat = Heat::new(self.next_heat_number(), bracket_type, round, pilot_ids, is_finale);
    let id = heat.id.clone();
    self.heats.push(heat);
    id
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn heat(number: u32, bracket_type: BracketType, round: u32, status: HeatStatus) -> Heat {
    let mut heat = Heat::new(number, bracket_type, round, vec![format!("p{number}")], false);
    heat.status = status;
    heat
  }

  #[test]
  fn heat_numbers_continue_from_max() {
    let mut state = TournamentState::new();
    assert_eq!(state.next_heat_number(), 1);
    state.heats.push(heat(7, BracketType::Qualification, 1, HeatStatus::Completed));
    let id = state.push_heat(BracketType::Loser, 1, vec!["a".into()], false);
    assert_eq!(id, "heat-8");
  }

  #[test]
  fn round_complete_needs_every_heat_of_the_round() {
    let mut state = TournamentState::new();
    state.heats.push(heat(1, BracketType::Qualification, 1, HeatStatus::Completed));
    state.heats.push(heat(2, BracketType::Qualification, 1, HeatStatus::Pending));
    state.heats.push(heat(3, BracketType::Loser, 1, HeatStatus::Completed));
    assert!(!state.round_complete(BracketType::Qualification, 1));
    assert!(state.round_complete(BracketType::Loser, 1));
    assert!(!state.round_complete(BracketType::Winner, 1));
    assert!(state.winner_side_open());
    assert!(!state.qualification_resolved());
  }

  #[test]
  fn completed_finale_requires_exactly_one() {
    let mut state = TournamentState::new();
    let mut wb = heat(1, BracketType::Winner, 1, HeatStatus::Completed);
    wb.is_finale = true;
    state.heats.push(wb.clone());
    assert!(state.completed_finale(BracketType::Winner).is_some());
    wb.heat_number = 2;
    wb.id = "heat-2".to_string();
    state.heats.push(wb);
    assert!(state.completed_finale(BracketType::Winner).is_none());
  }

  #[test]
  fn loser_depth_tracks_deepest_round() {
    let mut state = TournamentState::new();
    let mut first = heat(1, BracketType::Loser, 1, HeatStatus::Completed);
    first.pilot_ids = vec!["a".into(), "b".into()];
    let mut second = heat(2, BracketType::Loser, 2, HeatStatus::Pending);
    second.pilot_ids = vec!["a".into()];
    state.heats.push(first);
    state.heats.push(second);
    assert_eq!(state.loser_depth("a"), 2);
    assert_eq!(state.loser_depth("b"), 1);
    assert_eq!(state.loser_depth("c"), 0);
  }

  #[test]
  fn eliminated_bracket_state_sticks() {
    let mut state = TournamentState::new();
    state.set_bracket("a", PilotBracket::Eliminated, None);
    state.set_bracket("a", PilotBracket::GrandFinale, Some(BracketOrigin::Wb));
    assert_eq!(state.pilot_bracket_states["a"].bracket, PilotBracket::Eliminated);
    assert_eq!(state.pilot_bracket_states["a"].bracket_origin, None);
  }
}
