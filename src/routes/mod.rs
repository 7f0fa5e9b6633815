pub mod activity;
pub mod edit;
pub mod health;
pub mod upload;

use axum::Router;

use crate::state::AppState;

/// Every API route, without middleware.
pub fn api() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(upload::router())
        .merge(activity::router())
        .merge(edit::router())
}
