use axum::extract::Multipart;
use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, CodecError};
use crate::pipeline::codec;
use crate::pipeline::elevation::backfill_altitude;
use crate::state::AppState;
use crate::types::activity::{Activity, FileFormat};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: String,
    pub name: Option<String>,
    pub sport: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub laps: usize,
    pub points: usize,
    pub distance_m: f64,
}

impl From<&Activity> for ActivitySummary {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id.clone(),
            name: activity.name.clone(),
            sport: activity.sport.clone(),
            date: activity.date,
            laps: activity.laps.len(),
            points: activity.point_count(),
            distance_m: activity.total_distance(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct UploadResponse {
    file_name: String,
    file_type: String,
    activities: Vec<ActivitySummary>,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            AppError::BadRequest(format!("Failed to read file bytes: {}", e))
                        })?
                        .to_vec(),
                );
            }
            "user_id" => {
                let value = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read user_id: {}", e))
                })?;
                user_id = Some(value.trim().to_string()).filter(|id| !id.is_empty());
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;
    let filename = filename.ok_or_else(|| AppError::BadRequest("No filename provided".to_string()))?;

    let format = FileFormat::from_filename(&filename)
        .ok_or_else(|| CodecError::UnsupportedFormat(filename.clone()))?;
    let user_id = user_id.unwrap_or_else(|| state.config().default_user_id.clone());

    tracing::info!("Parsing {} file: {}", format.as_str(), filename);

    let activities = codec::import(&bytes, format)?;

    let file_name = format!("{}.{}", Uuid::new_v4(), format.as_str());
    state.blobs().put(&file_name, bytes);

    let mut summaries = Vec::with_capacity(activities.len());
    for mut activity in activities {
        activity.id = Uuid::new_v4().to_string();
        activity.user_id = user_id.clone();

        let filled = backfill_altitude(
            &mut activity,
            state.elevation(),
            state.config().elevation_batch_size,
        )
        .await;
        if filled > 0 {
            tracing::debug!("Filled {} altitudes for activity {}", filled, activity.id);
        }

        let saved = state.save(activity);
        summaries.push(ActivitySummary::from(&saved));
    }

    tracing::info!(
        "Uploaded file {} as {} ({} activities)",
        filename,
        file_name,
        summaries.len()
    );

    Ok(Json(UploadResponse {
        file_name,
        file_type: format.as_str().to_string(),
        activities: summaries,
    }))
}
