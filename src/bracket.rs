use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::now_ms;
use crate::csv_import::{parse_pilots_csv, CsvPilotRow, CsvRowError, PilotImport};
use crate::errors::{Precondition, TournamentError, TournamentResult};
use crate::grand_finale;
use crate::loser_bracket;
use crate::placement::{self, Placement, RankGroup};
use crate::qualification::{HeatAssignment, ShuffleRng};
use crate::recommendation::next_recommended_heat;
use crate::results::{self, HeatOutcome};
use crate::roster::PilotRoster;
use crate::state::TournamentState;
use crate::types::{
  BracketType, Heat, HeatStatus, Pilot, PilotBracket, PilotInput, Ranking, TournamentPhase,
  TournamentRules,
};
use crate::winner_bracket;

/// The tournament state machine. Every mutator either applies completely or
/// returns an error with the state untouched.
#[derive(Debug, Clone)]
pub struct Tournament {
  state: TournamentState,
  rules: TournamentRules,
  rng: ShuffleRng,
}

impl Tournament {
  pub fn new(rules: TournamentRules) -> Self {
    Tournament {
      state: TournamentState::new(),
      rules,
      rng: ShuffleRng::from_clock(),
    }
  }

  /// Deterministic heat proposals, for tests and reproducible events.
  pub fn with_seed(rules: TournamentRules, seed: u64) -> Self {
    Tournament {
      state: TournamentState::new(),
      rules,
      rng: ShuffleRng::new(seed),
    }
  }

  pub fn from_state(state: TournamentState, rules: TournamentRules, seed: Option<u64>) -> Self {
    let rng = match seed {
      Some(seed) => ShuffleRng::new(seed),
      None => ShuffleRng::from_clock(),
    };
    Tournament { state, rules, rng }
  }

  pub fn state(&self) -> &TournamentState {
    &self.state
  }

  pub fn rules(&self) -> TournamentRules {
    self.rules
  }

  pub fn phase(&self) -> TournamentPhase {
    self.state.phase
  }

  fn require_phase(&self, allowed: &[TournamentPhase]) -> TournamentResult<()> {
    if allowed.contains(&self.state.phase) {
      Ok(())
    } else {
      Err(Precondition::WrongPhase(self.state.phase).into())
    }
  }

  // ── Roster ─────────────────────────────────────────────────────────

  pub fn add_pilot(&mut self, input: PilotInput) -> TournamentResult<Pilot> {
    self.require_phase(&[TournamentPhase::Setup])?;
    let pilot = self.state.roster.add(input, self.rules.max_pilots)?;
    info!("pilot added: {} ({})", pilot.name, pilot.id);
    Ok(pilot)
  }

  pub fn update_pilot(&mut self, pilot_id: &str, input: PilotInput) -> TournamentResult<Pilot> {
    self.require_phase(&[TournamentPhase::Setup, TournamentPhase::HeatAssignment])?;
    self.state.roster.update(pilot_id, input)
  }

  pub fn delete_pilot(&mut self, pilot_id: &str) -> TournamentResult<Pilot> {
    self.require_phase(&[TournamentPhase::Setup])?;
    let pilot = self.state.roster.remove(pilot_id)?;
    info!("pilot deleted: {} ({})", pilot.name, pilot.id);
    Ok(pilot)
  }

  pub fn delete_all_pilots(&mut self) -> TournamentResult<()> {
    self.require_phase(&[TournamentPhase::Setup])?;
    self.state.roster.clear();
    info!("all pilots deleted");
    Ok(())
  }

  /// Marks a pilot as dropped out. Once the bracket runs, the pilot leaves
  /// both pools for good and no longer needs a rank in unflown heats.
  /// `Ok(false)` when the pilot had already dropped out.
  pub fn mark_dropped_out(&mut self, pilot_id: &str) -> TournamentResult<bool> {
    if self.state.phase == TournamentPhase::Completed {
      return Err(Precondition::WrongPhase(self.state.phase).into());
    }
    if !self.state.roster.mark_dropped_out(pilot_id)? {
      return Ok(false);
    }
    match self.state.phase {
      TournamentPhase::HeatAssignment => {
        if let Some(assignment) = self.state.heat_assignment.as_mut() {
          assignment.retain_pilots(|id| id != pilot_id);
        }
      }
      TournamentPhase::Running | TournamentPhase::Finale => {
        self.state.loser_pool.remove(pilot_id);
        self.state.winner_pool.remove(pilot_id);
        self.state.eliminated.insert(pilot_id);
        self.state.set_bracket(pilot_id, PilotBracket::Eliminated, None);
      }
      TournamentPhase::Setup | TournamentPhase::Completed => {}
    }
    warn!("pilot {pilot_id} dropped out");
    Ok(true)
  }

  /// Adds every valid, non-duplicate row of `data` while capacity lasts.
  pub fn import_pilots_csv(&mut self, data: &str) -> TournamentResult<PilotImport> {
    self.require_phase(&[TournamentPhase::Setup])?;
    let report = parse_pilots_csv(data, &self.state.roster)?;
    let mut outcome = PilotImport {
      errors: report.errors,
      duplicates: report.duplicates,
      ..PilotImport::default()
    };
    for CsvPilotRow { row, input } in report.pilots {
      let name = input.name.clone();
      match self.state.roster.add(input, self.rules.max_pilots) {
        Ok(pilot) => outcome.added.push(pilot),
        Err(TournamentError::Validation(errors)) => {
          outcome.errors.extend(errors.into_iter().map(|error| CsvRowError {
            row,
            field: error.field,
            message: error.message,
          }))
        }
        Err(err) => outcome.errors.push(CsvRowError {
          row,
          field: "capacity".to_string(),
          message: format!("{name}: {err}"),
        }),
      }
    }
    info!(
      "csv import: {} added, {} errors, {} duplicates",
      outcome.added.len(),
      outcome.errors.len(),
      outcome.duplicates.len()
    );
    Ok(outcome)
  }

  // ── Heat assignment ────────────────────────────────────────────────

  /// setup → heat-assignment with a fresh shuffled proposal.
  pub fn start_heat_assignment(&mut self) -> TournamentResult<&HeatAssignment> {
    self.require_phase(&[TournamentPhase::Setup])?;
    let pilot_ids = self.state.roster.active_ids();
    let count = pilot_ids.len();
    if count < self.rules.min_pilots || count > self.rules.max_pilots {
      return Err(
        Precondition::PilotCountOutOfRange {
          count,
          min: self.rules.min_pilots,
          max: self.rules.max_pilots,
        }
        .into(),
      );
    }
    let assignment = HeatAssignment::propose(&pilot_ids, &mut self.rng)?;
    info!("heat assignment proposed: {} heats for {count} pilots", assignment.heats.len());
    self.state.phase = TournamentPhase::HeatAssignment;
    Ok(self.state.heat_assignment.insert(assignment))
  }

  pub fn shuffle_heats(&mut self) -> TournamentResult<&HeatAssignment> {
    self.require_phase(&[TournamentPhase::HeatAssignment])?;
    let pilot_ids = self.state.roster.active_ids();
    let assignment = HeatAssignment::propose(&pilot_ids, &mut self.rng)?;
    Ok(self.state.heat_assignment.insert(assignment))
  }

  pub fn move_pilot_to_heat(&mut self, pilot_id: &str, target: usize) -> TournamentResult<&HeatAssignment> {
    self.require_phase(&[TournamentPhase::HeatAssignment])?;
    let assignment = self
      .state
      .heat_assignment
      .as_mut()
      .ok_or(Precondition::NoHeatAssignment)?;
    assignment.move_pilot(pilot_id, target)?;
    Ok(assignment)
  }

  /// Locks the proposal in as qualification heats and starts the bracket.
  pub fn confirm_heat_assignment(&mut self) -> TournamentResult<Vec<String>> {
    self.require_phase(&[TournamentPhase::HeatAssignment])?;
    let assignment = self
      .state
      .heat_assignment
      .as_ref()
      .ok_or(Precondition::NoHeatAssignment)?;
    if let Some((heat, size)) = assignment.blocking_heat() {
      return Err(Precondition::InvalidProposal { heat, size }.into());
    }
    let assignment = self
      .state
      .heat_assignment
      .take()
      .ok_or(Precondition::NoHeatAssignment)?;

    let heats = assignment.into_heats(self.state.next_heat_number());
    let heat_ids: Vec<String> = heats.iter().map(|heat| heat.id.clone()).collect();
    self.state.loser_pool = Default::default();
    self.state.winner_pool = Default::default();
    self.state.eliminated = Default::default();
    self.state.pilot_bracket_states.clear();
    for heat in &heats {
      for pilot_id in &heat.pilot_ids {
        self.state.set_bracket(pilot_id, PilotBracket::Winner, None);
      }
    }
    self.state.heats.extend(heats);
    self.state.phase = TournamentPhase::Running;
    info!("tournament started with {} qualification heats", heat_ids.len());
    Ok(heat_ids)
  }

  pub fn cancel_heat_assignment(&mut self) -> TournamentResult<()> {
    self.require_phase(&[TournamentPhase::HeatAssignment])?;
    self.state.heat_assignment = None;
    self.state.phase = TournamentPhase::Setup;
    info!("heat assignment cancelled");
    Ok(())
  }

  // ── Running ────────────────────────────────────────────────────────

  pub fn activate_heat(&mut self, heat_id: &str) -> TournamentResult<&Heat> {
    self.require_phase(&[TournamentPhase::Running, TournamentPhase::Finale])?;
    let index = self
      .state
      .heat_index(heat_id)
      .ok_or_else(|| Precondition::UnknownHeat(heat_id.to_string()))?;
    if let Some(active) = self.state.active_heat() {
      return Err(Precondition::HeatAlreadyActive(active.id.clone()).into());
    }
    let heat = &mut self.state.heats[index];
    if heat.status != HeatStatus::Pending {
      return Err(Precondition::HeatNotPending(heat_id.to_string()).into());
    }
    heat.status = HeatStatus::Active;
    info!("heat {heat_id} is now active");
    Ok(&self.state.heats[index])
  }

  /// Stores the rankings of one heat, routes its pilots and then lets the
  /// generators create whatever heats became possible.
  pub fn submit_heat_results(
    &mut self,
    heat_id: &str,
    rankings: Vec<Ranking>,
  ) -> TournamentResult<HeatOutcome> {
    self.require_phase(&[TournamentPhase::Running, TournamentPhase::Finale])?;
    let round = self
      .state
      .heat(heat_id)
      .map(|heat| heat.round_number)
      .ok_or_else(|| Precondition::UnknownHeat(heat_id.to_string()))?;

    let mut outcome = results::apply(&mut self.state, heat_id, rankings, now_ms())?;
    let bracket_type = outcome.bracket_type;

    if bracket_type == BracketType::GrandFinale {
      self.state.phase = TournamentPhase::Completed;
      info!("grand finale flown, tournament completed");
      return Ok(outcome);
    }

    let lb_due = bracket_type == BracketType::Loser
      || (bracket_type.is_winner_side() && self.state.round_complete(bracket_type, round));
    if lb_due {
      outcome.generated_heats.extend(loser_bracket::generate(&mut self.state));
    }
    outcome
      .generated_heats
      .extend(winner_bracket::maybe_advance(&mut self.state));
    outcome.generated_heats.extend(grand_finale::maybe_build(&mut self.state));
    self.warn_if_stalled();
    Ok(outcome)
  }

  /// A bracket that has run dry cannot reach a grand finale on its own.
  fn warn_if_stalled(&self) {
    let state = &self.state;
    if state.phase == TournamentPhase::Running
      && state.active_heat().is_none()
      && state.pending_heats().is_empty()
      && !loser_bracket::can_generate(state)
    {
      warn!(
        "no heat left to fly: loser pool={} winner pool={}",
        state.loser_pool.len(),
        state.winner_pool.len()
      );
    }
  }

  pub fn can_generate_loser_heat(&self) -> bool {
    loser_bracket::can_generate(&self.state)
  }

  pub fn generate_loser_heat(&mut self) -> Option<String> {
    loser_bracket::generate(&mut self.state)
  }

  pub fn build_grand_finale(&mut self) -> Option<String> {
    grand_finale::maybe_build(&mut self.state)
  }

  pub fn top4(&self) -> Option<Vec<Placement>> {
    placement::top4(&self.state)
  }

  pub fn rank_groups(&self) -> BTreeMap<String, RankGroup> {
    placement::rank_groups(&self.state)
  }

  pub fn next_recommended_heat(&self) -> Option<&Heat> {
    next_recommended_heat(&self.state)
  }

  // ── Resets ─────────────────────────────────────────────────────────

  /// Back to setup with the same pilots (drop-out flags included).
  pub fn reset_tournament(&mut self) {
    let roster = std::mem::take(&mut self.state.roster);
    self.state = TournamentState {
      roster,
      ..TournamentState::default()
    };
    info!("tournament reset, {} pilots kept", self.state.roster.len());
  }

  pub fn reset_all(&mut self) {
    self.state = TournamentState {
      roster: PilotRoster::from_parts(Vec::new(), self.state.roster.next_seq()),
      ..TournamentState::default()
    };
    info!("tournament and roster wiped");
  }

  pub fn replace_state(&mut self, state: TournamentState) {
    self.state = state;
    info!(
      "state replaced: phase={} pilots={} heats={}",
      self.state.phase,
      self.state.roster.len(),
      self.state.heats.len()
    );
  }
}
