pub mod types;
pub mod config;
pub mod errors;
pub mod planner;
pub mod pool;
pub mod roster;
pub mod qualification;
pub mod state;
pub mod results;
pub mod winner_bracket;
pub mod loser_bracket;
pub mod grand_finale;
pub mod placement;
pub mod recommendation;
pub mod bracket;
pub mod snapshot;
pub mod csv_import;
pub mod csv_export;
pub mod storage;
pub mod commands;

use types::*;
use config::*;
use bracket::Tournament;
use commands::ExportFile;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use axum::{
    extract::{Path as AxumPath, State as AxumState},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;

// ── Request bodies ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovePilotBody {
    pilot_id: String,
    target_heat: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResultsBody {
    rankings: Vec<Ranking>,
}

// ── Responses ──────────────────────────────────────────────────────────

fn json_result<T: Serialize>(result: Result<T, String>) -> Response {
    match result {
        Ok(value) => (
            StatusCode::OK,
            [("Cache-Control", "no-store")],
            Json(value),
        )
            .into_response(),
        Err(message) => (
            StatusCode::BAD_REQUEST,
            [("Cache-Control", "no-store")],
            Json(json!({ "error": message })),
        )
            .into_response(),
    }
}

fn file_result(result: Result<ExportFile, String>) -> Response {
    match result {
        Ok(file) => (
            [
                (header::CONTENT_TYPE, file.content_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file.file_name),
                ),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            file.content,
        )
            .into_response(),
        Err(message) => json_result::<()>(Err(message)),
    }
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn get_state(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::get_state(&store))
}

async fn get_rules(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::get_rules(&store))
}

async fn add_pilot(
    AxumState(store): AxumState<SharedTournament>,
    Json(input): Json<PilotInput>,
) -> Response {
    json_result(commands::add_pilot(input, &store))
}

async fn update_pilot(
    AxumState(store): AxumState<SharedTournament>,
    AxumPath(pilot_id): AxumPath<String>,
    Json(input): Json<PilotInput>,
) -> Response {
    json_result(commands::update_pilot(&pilot_id, input, &store))
}

async fn delete_pilot(
    AxumState(store): AxumState<SharedTournament>,
    AxumPath(pilot_id): AxumPath<String>,
) -> Response {
    json_result(commands::delete_pilot(&pilot_id, &store))
}

async fn mark_dropped_out(
    AxumState(store): AxumState<SharedTournament>,
    AxumPath(pilot_id): AxumPath<String>,
) -> Response {
    json_result(commands::mark_pilot_dropped_out(&pilot_id, &store))
}

async fn delete_all_pilots(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::delete_all_pilots(&store))
}

async fn import_pilots_csv(AxumState(store): AxumState<SharedTournament>, body: String) -> Response {
    json_result(commands::import_pilots_csv(&body, &store))
}

async fn start_heat_assignment(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::start_heat_assignment(&store))
}

async fn shuffle_heats(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::shuffle_heats(&store))
}

async fn move_pilot_to_heat(
    AxumState(store): AxumState<SharedTournament>,
    Json(body): Json<MovePilotBody>,
) -> Response {
    json_result(commands::move_pilot_to_heat(&body.pilot_id, body.target_heat, &store))
}

async fn confirm_heat_assignment(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::confirm_heat_assignment(&store))
}

async fn cancel_heat_assignment(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::cancel_heat_assignment(&store))
}

async fn activate_heat(
    AxumState(store): AxumState<SharedTournament>,
    AxumPath(heat_id): AxumPath<String>,
) -> Response {
    json_result(commands::activate_heat(&heat_id, &store))
}

async fn submit_heat_results(
    AxumState(store): AxumState<SharedTournament>,
    AxumPath(heat_id): AxumPath<String>,
    Json(body): Json<SubmitResultsBody>,
) -> Response {
    json_result(commands::submit_heat_results(&heat_id, body.rankings, &store))
}

async fn next_recommended_heat(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::get_next_recommended_heat(&store))
}

async fn can_generate_loser_heat(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::can_generate_loser_heat(&store))
}

async fn generate_loser_heat(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::generate_loser_heat(&store))
}

async fn build_grand_finale(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::build_grand_finale(&store))
}

async fn top4(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::get_top4(&store))
}

async fn rank_groups(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::get_rank_groups(&store))
}

async fn reset_tournament(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::reset_tournament(&store))
}

async fn reset_all(AxumState(store): AxumState<SharedTournament>) -> Response {
    json_result(commands::reset_all(&store))
}

async fn export_json(AxumState(store): AxumState<SharedTournament>) -> Response {
    file_result(commands::export_state_json(&store))
}

async fn export_csv(AxumState(store): AxumState<SharedTournament>) -> Response {
    file_result(commands::export_standings_csv(&store))
}

async fn import_state(AxumState(store): AxumState<SharedTournament>, body: String) -> Response {
    json_result(commands::import_state_json(&body, &store))
}

// ── HTTP server ────────────────────────────────────────────────────────

pub fn api_router(store: SharedTournament, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/api/state", get(get_state))
        .route("/api/rules", get(get_rules))
        .route("/api/pilots", post(add_pilot).delete(delete_all_pilots))
        .route("/api/pilots/:id", put(update_pilot).delete(delete_pilot))
        .route("/api/pilots/:id/drop-out", post(mark_dropped_out))
        .route("/api/import/pilots-csv", post(import_pilots_csv))
        .route("/api/heat-assignment", post(start_heat_assignment))
        .route("/api/heat-assignment/shuffle", post(shuffle_heats))
        .route("/api/heat-assignment/move", post(move_pilot_to_heat))
        .route("/api/heat-assignment/confirm", post(confirm_heat_assignment))
        .route("/api/heat-assignment/cancel", post(cancel_heat_assignment))
        .route("/api/heats/recommended", get(next_recommended_heat))
        .route("/api/heats/:id/activate", post(activate_heat))
        .route("/api/heats/:id/results", post(submit_heat_results))
        .route("/api/loser-bracket/can-generate", get(can_generate_loser_heat))
        .route("/api/loser-bracket/generate", post(generate_loser_heat))
        .route("/api/grand-finale", post(build_grand_finale))
        .route("/api/placements/top4", get(top4))
        .route("/api/placements/rank-groups", get(rank_groups))
        .route("/api/reset", post(reset_tournament))
        .route("/api/reset-all", post(reset_all))
        .route("/api/export/json", get(export_json))
        .route("/api/export/csv", get(export_csv))
        .route("/api/import/state", post(import_state))
        .with_state(store);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

async fn start_api_server(store: SharedTournament, static_dir: Option<PathBuf>, addr: String) {
    let app = api_router(store, static_dir);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("api server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("api server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("api server error: {e}");
    }
}

fn restore_tournament(config: &AppConfig, rules: TournamentRules, state_path: Option<&std::path::Path>) -> Tournament {
    let stored = match state_path.map(storage::load_snapshot) {
        Some(Ok(stored)) => stored,
        Some(Err(e)) => {
            warn!("stored state ignored: {e}");
            None
        }
        None => None,
    };
    match stored {
        Some(state) => {
            info!(
                "restored tournament: phase={} pilots={} heats={}",
                state.phase,
                state.roster.len(),
                state.heats.len()
            );
            Tournament::from_state(state, rules, config.shuffle_seed)
        }
        None => match config.shuffle_seed {
            Some(seed) => Tournament::with_seed(rules, seed),
            None => Tournament::new(rules),
        },
    }
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    let env = EnvLayer::load();
    let config_result = load_config_inner(&env);
    let config = config_result.clone().unwrap_or_else(|_| AppConfig::default());

    // Initialize tracing with a daily rolling file
    let logs_dir = log_dir(&config);
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "heats.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Heat Bracket starting");
    if let Err(e) = config_result {
        error!("config not loaded, using defaults: {e}");
    }
    log_env_warnings(&config);

    let rules = rules_from_config(&config);
    let state_path = state_path(&config);
    let tournament = restore_tournament(&config, rules, state_path.as_deref());
    let store: SharedTournament = Arc::new(Mutex::new(TournamentStore::new(tournament, state_path)));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            return;
        }
    };
    runtime.block_on(start_api_server(store, static_dir(&config), config.bind_addr.clone()));
}
