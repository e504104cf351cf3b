use chrono::Local;
use std::{fs, path::Path};

use crate::snapshot::{import_json, to_json};
use crate::state::TournamentState;

/// Writes the snapshot envelope to `path`, creating parent folders.
pub fn save_snapshot(path: &Path, state: &TournamentState) -> Result<(), String> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)
      .map_err(|e| format!("create state folder {}: {e}", parent.display()))?;
  }
  let payload = to_json(state, Local::now())?;
  let tmp_path = path.with_extension("json.tmp");
  fs::write(&tmp_path, payload).map_err(|e| format!("write state {}: {e}", tmp_path.display()))?;
  fs::rename(&tmp_path, path).map_err(|e| format!("replace state {}: {e}", path.display()))
}

/// Persistence never fails a mutation; problems only end up in the log.
pub fn persist(path: Option<&Path>, state: &TournamentState) {
  let Some(path) = path else {
    return;
  };
  if let Err(err) = save_snapshot(path, state) {
    tracing::warn!("state not persisted: {err}");
  }
}

/// Stored state from a previous run. `Ok(None)` when nothing was stored yet.
pub fn load_snapshot(path: &Path) -> Result<Option<TournamentState>, String> {
  if !path.is_file() {
    return Ok(None);
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read state {}: {e}", path.display()))?;
  import_json(&data)
    .map(Some)
    .map_err(|e| format!("parse state {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::PilotInput;
  use tempfile::TempDir;

  fn state_with_pilot() -> TournamentState {
    let mut state = TournamentState::new();
    state
      .roster
      .add(
        PilotInput {
          name: "Nova".to_string(),
          image_url: "https://img.example/nova.png".to_string(),
          instagram_handle: Some("nova".to_string()),
        },
        60,
      )
      .unwrap();
    state
  }

  #[test]
  fn save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("tournament.json");
    save_snapshot(&path, &state_with_pilot()).unwrap();
    let loaded = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(loaded.roster.len(), 1);
    assert_eq!(loaded.roster.all()[0].instagram_handle.as_deref(), Some("@nova"));
    assert!(!path.with_extension("json.tmp").exists());
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(load_snapshot(&dir.path().join("none.json")).unwrap().is_none());
  }

  #[test]
  fn corrupt_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tournament.json");
    fs::write(&path, "{\"state\": {}}").unwrap();
    let err = load_snapshot(&path).unwrap_err();
    assert!(err.contains("pilots"));
  }

  #[test]
  fn persist_without_path_is_a_no_op() {
    persist(None, &state_with_pilot());
  }
}
