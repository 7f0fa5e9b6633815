use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, EditError};
use crate::pipeline::edit;
use crate::pipeline::locate::PointQuery;
use crate::routes::activity::load;
use crate::state::AppState;
use crate::types::activity::Activity;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/activities/:id/points/remove", post(remove_point))
        .route("/api/activities/:id/laps/split", post(split_lap))
        .route("/api/activities/:id/laps/join", post(join_laps))
        .route("/api/activities/:id/laps/remove", post(remove_laps))
        .route("/api/activities/:id/laps/colors", post(set_colors))
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    index_left: usize,
    index_right: usize,
}

#[derive(Debug, Deserialize)]
struct RemoveLapsRequest {
    #[serde(default)]
    start_times: Vec<DateTime<Utc>>,
    #[serde(default)]
    indexes: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct ColorsRequest {
    data: String,
}

/// Loads, edits and stores in one go; nothing is stored when the edit fails.
fn apply(
    state: &AppState,
    id: &str,
    operation: &str,
    op: impl FnOnce(&Activity) -> Result<Activity, EditError>,
) -> Result<Json<Activity>, AppError> {
    let activity = load(state, id)?;
    let edited = op(&activity).map_err(|err| {
        tracing::debug!("{} on activity {} rejected: {}", operation, id, err);
        err
    })?;
    tracing::info!("Applied {} to activity {}", operation, id);
    Ok(Json(state.save(edited)))
}

async fn remove_point(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(query): Json<PointQuery>,
) -> Result<Json<Activity>, AppError> {
    apply(&state, &id, "remove_point", |activity| {
        edit::remove_point(activity, &query)
    })
}

async fn split_lap(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(query): Json<PointQuery>,
) -> Result<Json<Activity>, AppError> {
    apply(&state, &id, "split_lap", |activity| {
        edit::split_lap(activity, &query)
    })
}

async fn join_laps(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<Activity>, AppError> {
    apply(&state, &id, "join_laps", |activity| {
        edit::join_laps(activity, req.index_left, req.index_right)
    })
}

async fn remove_laps(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RemoveLapsRequest>,
) -> Result<Json<Activity>, AppError> {
    apply(&state, &id, "remove_laps", |activity| {
        edit::remove_laps(activity, &req.start_times, &req.indexes)
    })
}

async fn set_colors(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ColorsRequest>,
) -> Result<Json<Activity>, AppError> {
    apply(&state, &id, "set_color_lap", |activity| {
        edit::set_color_lap(activity, &req.data)
    })
}
