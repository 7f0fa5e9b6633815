use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("Track point not found")]
    PointNotFound,
    #[error("Lap not found")]
    LapNotFound,
    #[error("Operation not executed: {0}")]
    OperationNotExecuted(&'static str),
    #[error("Colors not assigned ({groups} color groups for {laps} laps)")]
    ColorsNotAssigned { groups: usize, laps: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("No activities found in document")]
    EmptyDocument,
    #[error("XML write failed: {0}")]
    Write(#[from] quick_xml::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    #[error("Elevation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Elevation response had {got} results for {expected} locations")]
    ResultCount { expected: usize, got: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Activity not found: {0}")]
    ActivityNotFound(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ActivityNotFound(_) | AppError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Edit(EditError::PointNotFound | EditError::LapNotFound) => {
                StatusCode::NOT_FOUND
            }
            AppError::Edit(EditError::OperationNotExecuted(_)) => StatusCode::CONFLICT,
            AppError::Edit(EditError::ColorsNotAssigned { .. }) => StatusCode::BAD_REQUEST,
            AppError::Codec(CodecError::UnsupportedFormat(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            AppError::Codec(CodecError::Write(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Codec(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
