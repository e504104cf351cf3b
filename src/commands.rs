use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::bracket::Tournament;
use crate::csv_export::export_csv;
use crate::csv_import::PilotImport;
use crate::errors::TournamentResult;
use crate::placement::Placement;
use crate::qualification::HeatAssignment;
use crate::results::HeatOutcome;
use crate::snapshot::{export_file_name, export_state, import_json, to_json, SnapshotState};
use crate::storage::persist;
use crate::types::*;

// ── Helpers ─────────────────────────────────────────────────────────────

/// Lock the store, run `f` against the tournament and persist on success.
/// Failed operations leave both memory and disk untouched.
pub fn with_tournament<F, R>(store: &SharedTournament, f: F) -> Result<R, String>
where
    F: FnOnce(&mut Tournament) -> TournamentResult<R>,
{
    let mut guard = store.lock().map_err(|e| e.to_string())?;
    let result = f(&mut guard.tournament).map_err(|e| e.to_string())?;
    persist(guard.state_path.as_deref(), guard.tournament.state());
    Ok(result)
}

/// Lock the store for a read-only query.
pub fn read_tournament<F, R>(store: &SharedTournament, f: F) -> Result<R, String>
where
    F: FnOnce(&Tournament) -> R,
{
    let guard = store.lock().map_err(|e| e.to_string())?;
    Ok(f(&guard.tournament))
}

/// A download: suggested file name plus body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: String,
    pub content: String,
}

// ── Queries ─────────────────────────────────────────────────────────────

pub fn get_state(store: &SharedTournament) -> Result<SnapshotState, String> {
    read_tournament(store, |t| export_state(t.state(), Local::now()).state)
}

pub fn get_rules(store: &SharedTournament) -> Result<TournamentRules, String> {
    read_tournament(store, |t| t.rules())
}

pub fn get_top4(store: &SharedTournament) -> Result<Option<Vec<Placement>>, String> {
    read_tournament(store, |t| t.top4())
}

pub fn get_rank_groups(store: &SharedTournament) -> Result<BTreeMap<String, String>, String> {
    read_tournament(store, |t| {
        t.rank_groups()
            .into_iter()
            .map(|(pilot_id, group)| (pilot_id, group.to_string()))
            .collect()
    })
}

pub fn get_next_recommended_heat(store: &SharedTournament) -> Result<Option<Heat>, String> {
    read_tournament(store, |t| t.next_recommended_heat().cloned())
}

pub fn can_generate_loser_heat(store: &SharedTournament) -> Result<bool, String> {
    read_tournament(store, |t| t.can_generate_loser_heat())
}

// ── Roster commands ─────────────────────────────────────────────────────

pub fn add_pilot(input: PilotInput, store: &SharedTournament) -> Result<Pilot, String> {
    with_tournament(store, |t| t.add_pilot(input))
}

pub fn update_pilot(pilot_id: &str, input: PilotInput, store: &SharedTournament) -> Result<Pilot, String> {
    with_tournament(store, |t| t.update_pilot(pilot_id, input))
}

pub fn delete_pilot(pilot_id: &str, store: &SharedTournament) -> Result<Pilot, String> {
    with_tournament(store, |t| t.delete_pilot(pilot_id))
}

pub fn mark_pilot_dropped_out(pilot_id: &str, store: &SharedTournament) -> Result<bool, String> {
    with_tournament(store, |t| t.mark_dropped_out(pilot_id))
}

pub fn delete_all_pilots(store: &SharedTournament) -> Result<(), String> {
    with_tournament(store, |t| t.delete_all_pilots())
}

pub fn import_pilots_csv(data: &str, store: &SharedTournament) -> Result<PilotImport, String> {
    with_tournament(store, |t| t.import_pilots_csv(data))
}

// ── Heat assignment commands ────────────────────────────────────────────

pub fn start_heat_assignment(store: &SharedTournament) -> Result<HeatAssignment, String> {
    with_tournament(store, |t| t.start_heat_assignment().cloned())
}

pub fn shuffle_heats(store: &SharedTournament) -> Result<HeatAssignment, String> {
    with_tournament(store, |t| t.shuffle_heats().cloned())
}

pub fn move_pilot_to_heat(pilot_id: &str, target: usize, store: &SharedTournament) -> Result<HeatAssignment, String> {
    with_tournament(store, |t| t.move_pilot_to_heat(pilot_id, target).cloned())
}

pub fn confirm_heat_assignment(store: &SharedTournament) -> Result<Vec<String>, String> {
    with_tournament(store, |t| t.confirm_heat_assignment())
}

pub fn cancel_heat_assignment(store: &SharedTournament) -> Result<(), String> {
    with_tournament(store, |t| t.cancel_heat_assignment())
}

// ── Bracket commands ────────────────────────────────────────────────────

pub fn activate_heat(heat_id: &str, store: &SharedTournament) -> Result<Heat, String> {
    with_tournament(store, |t| t.activate_heat(heat_id).cloned())
}

pub fn submit_heat_results(
    heat_id: &str,
    rankings: Vec<Ranking>,
    store: &SharedTournament,
) -> Result<HeatOutcome, String> {
    with_tournament(store, |t| t.submit_heat_results(heat_id, rankings))
}

/// `None` when the pool is not ready; that is not an error.
pub fn generate_loser_heat(store: &SharedTournament) -> Result<Option<String>, String> {
    with_tournament(store, |t| Ok(t.generate_loser_heat()))
}

pub fn build_grand_finale(store: &SharedTournament) -> Result<Option<String>, String> {
    with_tournament(store, |t| Ok(t.build_grand_finale()))
}

// ── Reset commands ──────────────────────────────────────────────────────

pub fn reset_tournament(store: &SharedTournament) -> Result<(), String> {
    with_tournament(store, |t| {
        t.reset_tournament();
        Ok(())
    })
}

pub fn reset_all(store: &SharedTournament) -> Result<(), String> {
    with_tournament(store, |t| {
        t.reset_all();
        Ok(())
    })
}

// ── Import / export commands ────────────────────────────────────────────

pub fn export_state_json(store: &SharedTournament) -> Result<ExportFile, String> {
    let now = Local::now();
    let content = read_tournament(store, |t| to_json(t.state(), now))??;
    Ok(ExportFile {
        file_name: export_file_name("json", now),
        content_type: "application/json".to_string(),
        content,
    })
}

pub fn export_standings_csv(store: &SharedTournament) -> Result<ExportFile, String> {
    let now = Local::now();
    let content = read_tournament(store, |t| export_csv(t.state()))??;
    Ok(ExportFile {
        file_name: export_file_name("csv", now),
        content_type: "text/csv; charset=utf-8".to_string(),
        content,
    })
}

/// Replaces the whole tournament with a snapshot; a rejected snapshot leaves
/// the current one in place.
pub fn import_state_json(data: &str, store: &SharedTournament) -> Result<SnapshotState, String> {
    with_tournament(store, |t| {
        let state = import_json(data)?;
        t.replace_state(state);
        Ok(export_state(t.state(), Local::now()).state)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn store(path: Option<std::path::PathBuf>) -> SharedTournament {
        Arc::new(Mutex::new(TournamentStore::new(
            Tournament::with_seed(TournamentRules::default(), 5),
            path,
        )))
    }

    fn pilot(i: usize) -> PilotInput {
        PilotInput {
            name: format!("Command Pilot {i}"),
            image_url: format!("https://img.example/{i}.png"),
            instagram_handle: None,
        }
    }

    #[test]
    fn mutations_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let shared = store(Some(path.clone()));
        add_pilot(pilot(1), &shared).unwrap();
        let stored = crate::storage::load_snapshot(&path).unwrap().unwrap();
        assert_eq!(stored.roster.len(), 1);
    }

    #[test]
    fn failures_come_back_as_messages() {
        let shared = store(None);
        let err = start_heat_assignment(&shared).unwrap_err();
        assert!(err.contains("0 active pilots"));
        let err = add_pilot(
            PilotInput {
                name: "Xy".to_string(),
                ..pilot(0)
            },
            &shared,
        )
        .unwrap_err();
        assert!(err.contains("name"));
        assert!(get_state(&shared).unwrap().pilots.is_empty());
    }

    #[test]
    fn sentinel_commands_return_none() {
        let shared = store(None);
        assert_eq!(generate_loser_heat(&shared).unwrap(), None);
        assert_eq!(build_grand_finale(&shared).unwrap(), None);
        assert_eq!(get_top4(&shared).unwrap(), None);
        assert!(!can_generate_loser_heat(&shared).unwrap());
    }

    #[test]
    fn assignment_flow_and_exports() {
        let shared = store(None);
        for i in 0..8 {
            add_pilot(pilot(i), &shared).unwrap();
        }
        let proposal = start_heat_assignment(&shared).unwrap();
        assert_eq!(proposal.heats.len(), 2);
        let heat_ids = confirm_heat_assignment(&shared).unwrap();
        assert_eq!(heat_ids, vec!["heat-1", "heat-2"]);
        assert_eq!(
            get_next_recommended_heat(&shared).unwrap().map(|heat| heat.id),
            Some("heat-1".to_string())
        );

        let json = export_state_json(&shared).unwrap();
        assert!(json.file_name.starts_with("heats_") && json.file_name.ends_with(".json"));
        reset_all(&shared).unwrap();
        assert!(get_state(&shared).unwrap().pilots.is_empty());

        let restored = import_state_json(&json.content, &shared).unwrap();
        assert_eq!(restored.pilots.len(), 8);
        assert_eq!(restored.heats.len(), 2);

        let csv = export_standings_csv(&shared).unwrap();
        assert_eq!(csv.content.lines().count(), 9);
    }

    #[test]
    fn rejected_import_keeps_state() {
        let shared = store(None);
        add_pilot(pilot(1), &shared).unwrap();
        assert!(import_state_json(r#"{"state": {}}"#, &shared).is_err());
        assert_eq!(get_state(&shared).unwrap().pilots.len(), 1);
    }
}
