use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::bracket::Tournament;

// ── Constants ──────────────────────────────────────────────────────────

pub const PLANNER_MIN_PILOTS: usize = 7;
pub const PLANNER_MAX_PILOTS: usize = 60;
pub const MIN_HEAT_SIZE: usize = 3;
pub const MAX_HEAT_SIZE: usize = 4;
pub const MIN_PILOT_NAME_LEN: usize = 3;
/// Ranks at or above this value count as "top" finishes in every bracket.
pub const ADVANCING_RANK: u32 = 2;
pub const SNAPSHOT_VERSION: u32 = 1;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedTournament = Arc<Mutex<TournamentStore>>;

/// The single owner of the live tournament plus where it gets persisted.
pub struct TournamentStore {
    pub tournament: Tournament,
    pub state_path: Option<PathBuf>,
}

impl TournamentStore {
    pub fn new(tournament: Tournament, state_path: Option<PathBuf>) -> Self {
        TournamentStore {
            tournament,
            state_path,
        }
    }
}

// ── Pilot types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pilot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_handle: Option<String>,
    #[serde(default)]
    pub dropped_out: bool,
}

/// Editable pilot fields, as submitted by a form or a CSV row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotInput {
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub instagram_handle: Option<String>,
}

// ── Heat types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketType {
    #[default]
    Qualification,
    Winner,
    Loser,
    GrandFinale,
}

impl BracketType {
    pub fn label(self) -> &'static str {
        match self {
            BracketType::Qualification => "Quali",
            BracketType::Winner => "WB",
            BracketType::Loser => "LB",
            BracketType::GrandFinale => "GF",
        }
    }

    /// Qualification heats feed the winner bracket the same way WB heats do.
    pub fn is_winner_side(self) -> bool {
        matches!(self, BracketType::Qualification | BracketType::Winner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub pilot_id: String,
    pub rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lap_time_ms: Option<u64>,
}

impl Ranking {
    pub fn new(pilot_id: impl Into<String>, rank: u32) -> Self {
        Ranking {
            pilot_id: pilot_id.into(),
            rank,
            lap_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatResults {
    pub rankings: Vec<Ranking>,
    #[serde(default)]
    pub completed_at: u64,
}

impl HeatResults {
    pub fn rank_of(&self, pilot_id: &str) -> Option<u32> {
        self.rankings
            .iter()
            .find(|ranking| ranking.pilot_id == pilot_id)
            .map(|ranking| ranking.rank)
    }

    /// Pilot ids ranked `1..=ADVANCING_RANK`, best first.
    pub fn top_pilots(&self) -> Vec<String> {
        let mut top: Vec<&Ranking> = self
            .rankings
            .iter()
            .filter(|ranking| ranking.rank <= ADVANCING_RANK)
            .collect();
        top.sort_by_key(|ranking| ranking.rank);
        top.into_iter().map(|ranking| ranking.pilot_id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heat {
    pub id: String,
    pub heat_number: u32,
    pub pilot_ids: Vec<String>,
    pub status: HeatStatus,
    #[serde(default)]
    pub bracket_type: BracketType,
    #[serde(default)]
    pub round_number: u32,
    #[serde(default)]
    pub is_finale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<HeatResults>,
}

impl Heat {
    pub fn new(
        heat_number: u32,
        bracket_type: BracketType,
        round_number: u32,
        pilot_ids: Vec<String>,
        is_finale: bool,
    ) -> Self {
        Heat {
            id: heat_id_for(heat_number),
            heat_number,
            pilot_ids,
            status: HeatStatus::Pending,
            bracket_type,
            round_number,
            is_finale,
            results: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == HeatStatus::Completed
    }

    /// Pending or active, i.e. not flown yet.
    pub fn is_open(&self) -> bool {
        matches!(self.status, HeatStatus::Pending | HeatStatus::Active)
    }

    pub fn contains(&self, pilot_id: &str) -> bool {
        self.pilot_ids.iter().any(|id| id == pilot_id)
    }

    /// `LB-R2-H5` style label used in exports.
    pub fn label(&self) -> String {
        format!(
            "{}-R{}-H{}",
            self.bracket_type.label(),
            self.round_number,
            self.heat_number
        )
    }
}

pub fn heat_id_for(heat_number: u32) -> String {
    format!("heat-{heat_number}")
}

// ── Tournament phase & bracket provenance ──────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TournamentPhase {
    #[default]
    Setup,
    HeatAssignment,
    Running,
    Finale,
    Completed,
}

impl TournamentPhase {
    pub fn is_started(self) -> bool {
        matches!(
            self,
            TournamentPhase::Running | TournamentPhase::Finale | TournamentPhase::Completed
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            TournamentPhase::Setup => "setup",
            TournamentPhase::HeatAssignment => "heat-assignment",
            TournamentPhase::Running => "running",
            TournamentPhase::Finale => "finale",
            TournamentPhase::Completed => "completed",
        }
    }
}

impl fmt::Display for TournamentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PilotBracket {
    Winner,
    Loser,
    Eliminated,
    GrandFinale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BracketOrigin {
    Wb,
    Lb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotBracketState {
    pub bracket: PilotBracket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bracket_origin: Option<BracketOrigin>,
}

// ── Rules & config types ───────────────────────────────────────────────

/// Roster limits enforced by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRules {
    pub min_pilots: usize,
    pub max_pilots: usize,
}

impl Default for TournamentRules {
    fn default() -> Self {
        TournamentRules {
            min_pilots: PLANNER_MIN_PILOTS,
            max_pilots: PLANNER_MAX_PILOTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub state_path: String,
    pub static_dir: String,
    pub log_dir: String,
    pub min_pilots: usize,
    pub max_pilots: usize,
    pub shuffle_seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:17880".to_string(),
            state_path: "data/tournament.json".to_string(),
            static_dir: String::new(),
            log_dir: "logs".to_string(),
            min_pilots: PLANNER_MIN_PILOTS,
            max_pilots: PLANNER_MAX_PILOTS,
            shuffle_seed: None,
        }
    }
}
