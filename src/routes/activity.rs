use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::error::AppError;
use crate::pipeline::codec;
use crate::routes::upload::ActivitySummary;
use crate::state::AppState;
use crate::types::activity::{Activity, FileFormat};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/activities/:id", get(get_activity).delete(delete_activity))
        .route("/api/activities/:id/export/:format", get(export_activity))
        .route("/api/users/:user_id/activities", get(list_activities))
        .route("/api/files/:name", get(original_file))
}

pub(crate) fn load(state: &AppState, id: &str) -> Result<Activity, AppError> {
    state
        .activities()
        .find(id)
        .ok_or_else(|| AppError::ActivityNotFound(id.to_string()))
}

async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Activity>, AppError> {
    load(&state, &id).map(Json)
}

async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.activities().delete(&id) {
        return Err(AppError::ActivityNotFound(id));
    }
    tracing::info!("Deleted activity {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_activities(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<ActivitySummary>> {
    let activities = state.activities().list_for_user(&user_id);
    Json(activities.iter().map(ActivitySummary::from).collect())
}

async fn export_activity(
    State(state): State<AppState>,
    Path((id, format)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let format = codec::format_named(&format)?;
    let activity = load(&state, &id)?;
    let bytes = codec::export(&activity, format)?;

    tracing::info!(
        "Exported activity {} as {} ({} bytes)",
        id,
        format.as_str(),
        bytes.len()
    );

    let disposition = format!("attachment; filename=\"{}.{}\"", id, format.as_str());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn original_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state
        .blobs()
        .get(&name)
        .ok_or_else(|| AppError::FileNotFound(name.clone()))?;
    let content_type = FileFormat::from_filename(&name)
        .map(|format| format.content_type())
        .unwrap_or("application/octet-stream");

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}
