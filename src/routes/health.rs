use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::pipeline::elevation::ElevationSource;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let elevation = match state.elevation() {
        ElevationSource::Disabled => "disabled",
        ElevationSource::Http(_) => "http",
        ElevationSource::Fixed(_) => "fixed",
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "formats": ["gpx", "tcx"],
        "elevation": elevation
    }))
}
