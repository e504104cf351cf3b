use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::errors::{TournamentError, TournamentResult};
use crate::pool::{EliminatedSet, PilotQueue};
use crate::qualification::HeatAssignment;
use crate::roster::PilotRoster;
use crate::state::TournamentState;
use crate::types::{
  BracketType, Heat, Pilot, PilotBracketState, TournamentPhase, SNAPSHOT_VERSION,
};

// ── Wire format ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEnvelope {
  #[serde(default = "default_version")]
  pub version: u32,
  #[serde(default)]
  pub exported_at: String,
  pub state: SnapshotState,
}

fn default_version() -> u32 {
  SNAPSHOT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotState {
  pub pilots: Vec<Pilot>,
  #[serde(default)]
  pub tournament_started: bool,
  #[serde(default)]
  pub tournament_phase: Option<TournamentPhase>,
  #[serde(default)]
  pub heats: Vec<Heat>,
  #[serde(default)]
  pub current_heat_index: usize,
  #[serde(default)]
  pub loser_pool: Vec<String>,
  #[serde(default)]
  pub winner_pool: Vec<String>,
  #[serde(default)]
  pub eliminated_pilots: Vec<String>,
  #[serde(default)]
  pub last_completed_bracket_type: Option<BracketType>,
  #[serde(default)]
  pub pilot_bracket_states: BTreeMap<String, PilotBracketState>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub heat_assignment: Option<HeatAssignment>,
  #[serde(default)]
  pub next_pilot_seq: u64,
}

// ── Export ─────────────────────────────────────────────────────────────

pub fn export_state(state: &TournamentState, exported_at: DateTime<Local>) -> SnapshotEnvelope {
  SnapshotEnvelope {
    version: SNAPSHOT_VERSION,
    exported_at: exported_at.to_rfc3339(),
    state: SnapshotState {
      pilots: state.roster.all().to_vec(),
      tournament_started: state.phase.is_started(),
      tournament_phase: Some(state.phase),
      heats: state.heats.clone(),
      current_heat_index: state.current_heat_index(),
      loser_pool: state.loser_pool.to_vec(),
      winner_pool: state.winner_pool.to_vec(),
      eliminated_pilots: state.eliminated.iter().cloned().collect(),
      last_completed_bracket_type: state.last_completed_bracket_type,
      pilot_bracket_states: state.pilot_bracket_states.clone(),
      heat_assignment: state.heat_assignment.clone(),
      next_pilot_seq: state.roster.next_seq(),
    },
  }
}

pub fn to_json(state: &TournamentState, exported_at: DateTime<Local>) -> Result<String, String> {
  serde_json::to_string_pretty(&export_state(state, exported_at)).map_err(|e| e.to_string())
}

/// `heats_2024-05-01_18-30.json` style download name.
pub fn export_file_name(ext: &str, at: DateTime<Local>) -> String {
  format!("heats_{}.{ext}", at.format("%Y-%m-%d_%H-%M"))
}

// ── Import ─────────────────────────────────────────────────────────────

fn reject(message: impl Into<String>) -> TournamentError {
  TournamentError::Import(message.into())
}

/// Shape checks on the raw document, before typed decoding, so the error
/// names the offending field instead of a serde position.
fn check_shape(doc: &Value) -> TournamentResult<()> {
  let state = doc
    .get("state")
    .filter(|state| state.is_object())
    .ok_or_else(|| reject("missing \"state\" object"))?;
  if let Some(version) = doc.get("version") {
    if version.as_u64() != Some(SNAPSHOT_VERSION as u64) {
      return Err(reject(format!("unsupported snapshot version {version}")));
    }
  }
  let pilots = state
    .get("pilots")
    .and_then(Value::as_array)
    .ok_or_else(|| reject("\"pilots\" must be an array"))?;
  for (index, pilot) in pilots.iter().enumerate() {
    let well_typed = pilot.get("id").is_some_and(Value::is_string)
      && pilot.get("name").is_some_and(Value::is_string);
    if !well_typed {
      return Err(reject(format!("pilot #{index} needs string \"id\" and \"name\"")));
    }
  }
  let heats = match state.get("heats") {
    None | Some(Value::Null) => return Ok(()),
    Some(heats) => heats
      .as_array()
      .ok_or_else(|| reject("\"heats\" must be an array"))?,
  };
  for (index, heat) in heats.iter().enumerate() {
    let well_typed = heat.get("id").is_some_and(Value::is_string)
      && heat.get("heatNumber").is_some_and(Value::is_u64)
      && heat.get("pilotIds").is_some_and(Value::is_array)
      && heat.get("status").is_some_and(Value::is_string);
    if !well_typed {
      return Err(reject(format!(
        "heat #{index} needs \"id\", \"heatNumber\", \"pilotIds\" and \"status\""
      )));
    }
  }
  Ok(())
}

/// Cross-references a decoded snapshot can get wrong without breaking serde.
fn check_consistency(snapshot: &SnapshotState) -> TournamentResult<()> {
  let pilot_ids: HashSet<&str> = snapshot.pilots.iter().map(|p| p.id.as_str()).collect();
  if pilot_ids.len() != snapshot.pilots.len() {
    return Err(reject("duplicate pilot ids"));
  }
  let mut heat_ids = HashSet::new();
  let mut heat_numbers = HashSet::new();
  for heat in &snapshot.heats {
    if !heat_ids.insert(heat.id.as_str()) || !heat_numbers.insert(heat.heat_number) {
      return Err(reject(format!("duplicate heat {}", heat.id)));
    }
    if let Some(unknown) = heat.pilot_ids.iter().find(|id| !pilot_ids.contains(id.as_str())) {
      return Err(reject(format!("heat {} references unknown pilot {unknown}", heat.id)));
    }
    let mut seated = HashSet::new();
    if !heat.pilot_ids.iter().all(|id| seated.insert(id)) {
      return Err(reject(format!("heat {} seats a pilot twice", heat.id)));
    }
  }
  let grand_finales = snapshot
    .heats
    .iter()
    .filter(|heat| heat.bracket_type == BracketType::GrandFinale)
    .count();
  if grand_finales > 1 {
    return Err(reject("more than one grand finale"));
  }
  let pooled = snapshot
    .loser_pool
    .iter()
    .chain(&snapshot.winner_pool)
    .chain(&snapshot.eliminated_pilots);
  for id in pooled {
    if !pilot_ids.contains(id.as_str()) {
      return Err(reject(format!("pool references unknown pilot {id}")));
    }
  }
  Ok(())
}

fn into_state(snapshot: SnapshotState) -> TournamentState {
  let phase = match snapshot.tournament_phase {
    Some(phase) => phase,
    None if snapshot.tournament_started => TournamentPhase::Running,
    None => TournamentPhase::Setup,
  };
  let mut eliminated = EliminatedSet::new();
  for id in snapshot.eliminated_pilots {
    eliminated.insert(id);
  }
  TournamentState {
    phase,
    roster: PilotRoster::from_parts(snapshot.pilots, snapshot.next_pilot_seq),
    heats: snapshot.heats,
    loser_pool: PilotQueue::from_ids(snapshot.loser_pool),
    winner_pool: PilotQueue::from_ids(snapshot.winner_pool),
    eliminated,
    last_completed_bracket_type: snapshot.last_completed_bracket_type,
    pilot_bracket_states: snapshot.pilot_bracket_states,
    heat_assignment: snapshot.heat_assignment,
  }
}

/// Decodes a snapshot document. All or nothing: any problem rejects the
/// whole document and nothing is returned.
pub fn import_json(data: &str) -> TournamentResult<TournamentState> {
  let doc: Value = serde_json::from_str(data).map_err(|e| reject(format!("invalid JSON: {e}")))?;
  check_shape(&doc)?;
  let envelope: SnapshotEnvelope =
    serde_json::from_value(doc).map_err(|e| reject(e.to_string()))?;
  check_consistency(&envelope.state)?;
  Ok(into_state(envelope.state))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bracket::Tournament;
  use crate::types::{PilotInput, Ranking, TournamentRules};
  use chrono::TimeZone;

  fn running_tournament() -> Tournament {
    let mut t = Tournament::with_seed(TournamentRules::default(), 9);
    for i in 0..9 {
      t.add_pilot(PilotInput {
        name: format!("Flyer {i}"),
        image_url: format!("https://img.example/{i}.png"),
        instagram_handle: Some(format!("flyer{i}")),
      })
      .unwrap();
    }
    t.start_heat_assignment().unwrap();
    t.confirm_heat_assignment().unwrap();
    let heat = t.state().heats[0].clone();
    let rankings = heat
      .pilot_ids
      .iter()
      .enumerate()
      .map(|(i, id)| Ranking::new(id.clone(), i as u32 + 1))
      .collect();
    t.submit_heat_results(&heat.id, rankings).unwrap();
    t
  }

  fn at() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap()
  }

  #[test]
  fn export_then_import_keeps_the_tournament() {
    let t = running_tournament();
    let json = to_json(t.state(), at()).unwrap();
    let restored = import_json(&json).unwrap();
    assert_eq!(restored.phase, TournamentPhase::Running);
    assert_eq!(restored.heats, t.state().heats);
    assert_eq!(restored.roster.all(), t.state().roster.all());
    assert_eq!(restored.roster.next_seq(), t.state().roster.next_seq());
    assert_eq!(restored.loser_pool, t.state().loser_pool);
    assert_eq!(restored.winner_pool, t.state().winner_pool);
    assert_eq!(restored.pilot_bracket_states, t.state().pilot_bracket_states);
    assert_eq!(restored.last_completed_bracket_type, Some(BracketType::Qualification));
    assert_eq!(restored.current_heat_index(), t.state().current_heat_index());
  }

  #[test]
  fn envelope_fields_are_camel_case() {
    let t = running_tournament();
    let doc: Value = serde_json::to_value(export_state(t.state(), at())).unwrap();
    assert_eq!(doc["version"], 1);
    let state = &doc["state"];
    assert_eq!(state["tournamentStarted"], true);
    assert_eq!(state["tournamentPhase"], "running");
    assert_eq!(state["currentHeatIndex"], 1);
    assert_eq!(state["heats"][0]["bracketType"], "qualification");
    assert_eq!(state["loserPool"].as_array().unwrap().len(), 1);
  }

  #[test]
  fn missing_pilots_is_rejected() {
    let err = import_json(r#"{"state": {"heats": []}}"#).unwrap_err();
    assert_eq!(err, TournamentError::Import("\"pilots\" must be an array".to_string()));
    assert!(import_json(r#"{"state": {"pilots": {}}}"#).is_err());
    assert!(import_json("not json").is_err());
  }

  #[test]
  fn malformed_heat_is_rejected() {
    let doc = r#"{"state": {
      "pilots": [{"id": "pilot-0", "name": "Ada"}],
      "heats": [{"id": "heat-1", "pilotIds": ["pilot-0"], "status": "pending"}]
    }}"#;
    let err = import_json(doc).unwrap_err();
    assert!(err.to_string().contains("heat #0"));
  }

  #[test]
  fn minimal_document_defaults_the_rest() {
    let doc = r#"{"state": {
      "pilots": [{"id": "pilot-4", "name": "Ada"}],
      "tournamentStarted": false
    }}"#;
    let state = import_json(doc).unwrap();
    assert_eq!(state.phase, TournamentPhase::Setup);
    assert_eq!(state.roster.len(), 1);
    assert_eq!(state.roster.next_seq(), 5);
  }

  #[test]
  fn unknown_pilot_and_wrong_version_are_rejected() {
    let doc = r#"{"state": {
      "pilots": [{"id": "pilot-0", "name": "Ada"}],
      "heats": [{"id": "heat-1", "heatNumber": 1, "pilotIds": ["ghost"], "status": "pending"}]
    }}"#;
    assert!(import_json(doc).unwrap_err().to_string().contains("ghost"));
    let doc = r#"{"version": 2, "state": {"pilots": []}}"#;
    assert!(import_json(doc).is_err());
  }

  #[test]
  fn file_name_uses_minutes() {
    assert_eq!(export_file_name("csv", at()), "heats_2024-05-01_18-30.csv");
  }
}
