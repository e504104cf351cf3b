use serde::Serialize;
use thiserror::Error;

use crate::types::TournamentPhase;

/// One field-level validation message, e.g. `name: must be at least 3 characters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// State-machine guard failures. Expected in normal use; nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("not allowed while the tournament is in phase {0}")]
    WrongPhase(TournamentPhase),
    #[error("roster is full ({0} pilots)")]
    RosterFull(usize),
    #[error("{count} active pilots registered, {min}-{max} required to start")]
    PilotCountOutOfRange { count: usize, min: usize, max: usize },
    #[error("pilot {0} not found")]
    UnknownPilot(String),
    #[error("heat {0} not found")]
    UnknownHeat(String),
    #[error("heat {0} is already completed")]
    HeatLocked(String),
    #[error("heat {0} is already active")]
    HeatAlreadyActive(String),
    #[error("heat {0} is not pending")]
    HeatNotPending(String),
    #[error("no heat assignment in progress")]
    NoHeatAssignment,
    #[error("proposed heat {0} does not exist")]
    UnknownProposedHeat(usize),
    #[error("proposed heat {heat} has {size} pilots")]
    InvalidProposal { heat: usize, size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TournamentError {
    #[error("{}", describe_fields(.0))]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Precondition(#[from] Precondition),
    #[error("import rejected: {0}")]
    Import(String),
    #[error("pilot count {0} is outside the supported range 7-60")]
    PlanOutOfRange(usize),
}

impl TournamentError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        TournamentError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, TournamentError::Precondition(_))
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            TournamentError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

pub type TournamentResult<T> = Result<T, TournamentError>;

fn describe_fields(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return "invalid input".to_string();
    }
    errors
        .iter()
        .map(|error| format!("{}: {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}
