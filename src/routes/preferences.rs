//! Per-user preference routes

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::session::{user_from_headers, PreferenceRepository, Preferences, USER_HEADER};
use crate::state::AppState;

/// Create the preferences router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_preferences).put(update_preferences))
        .route("/toggle-scope", post(toggle_scope))
}

fn require_user(headers: &HeaderMap) -> Result<String> {
    user_from_headers(headers)
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", USER_HEADER)))
}

async fn get_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Preferences>> {
    let user = require_user(&headers)?;
    let prefs = PreferenceRepository::new(state.db()).get(&user).await?;
    Ok(Json(prefs))
}

async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(prefs): Json<Preferences>,
) -> Result<Json<Preferences>> {
    let user = require_user(&headers)?;
    let saved = PreferenceRepository::new(state.db()).save(&user, &prefs).await?;
    Ok(Json(saved))
}

/// Switch between "my highlights" and "all public highlights"
async fn toggle_scope(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Preferences>> {
    let user = require_user(&headers)?;
    let prefs = PreferenceRepository::new(state.db())
        .toggle_listing_scope(&user)
        .await?;
    Ok(Json(prefs))
}
