//! Route modules for the highlight server

pub mod health;
pub mod highlights;
pub mod preferences;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/api/v1", highlights::router())
        .nest("/api/v1/preferences", preferences::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
