//! Highlights API routes

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{AppError, Result};
use crate::highlights::{
    identifier_for, Bounds, Comment, HighlightRegion, HighlightRepository, HighlightScope,
    NewHighlight, ScopeFilter, VisiblePageSet,
};
use crate::session::Session;
use crate::state::AppState;

/// Default and maximum size of the recent listing
const DEFAULT_RECENT_LIMIT: u32 = 20;
const MAX_RECENT_LIMIT: u32 = 100;

/// Create the highlights router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/highlights/identifier", get(identifier))
        .route(
            "/books/:book_id/highlights",
            get(list_highlights).post(create_highlight),
        )
        .route("/books/:book_id/highlights/recent", get(recent_highlights))
        .route("/books/:book_id/highlights/match", post(match_highlight))
        .route("/books/:book_id/highlights/events", get(highlight_events))
        .route(
            "/books/:book_id/highlights/:id",
            get(get_highlight).delete(delete_highlight),
        )
        .route("/books/:book_id/highlights/:id/comments", post(add_comment))
        .route("/books/:book_id/highlights/:id/visibility", put(set_visibility))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub scope: Option<HighlightScope>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub scope: Option<HighlightScope>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub scope: Option<HighlightScope>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifierQuery {
    #[serde(default)]
    pub text: String,
    pub page: u32,
}

#[derive(Debug, Serialize)]
pub struct IdentifierResponse {
    pub id: String,
}

/// New highlight, optionally with its first comment
#[derive(Debug, Deserialize)]
pub struct CreateHighlightRequest {
    pub text: String,
    pub page: u32,
    pub bounds: Bounds,
    pub comment: Option<String>,
}

/// Tapped or selected rectangle to resolve
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub page: u32,
    pub bounds: Bounds,
    pub scope: Option<HighlightScope>,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub is_public: bool,
}

/// Missing and private-to-someone-else highlights look the same
fn hidden(id: &str) -> AppError {
    AppError::NotFound(format!("Highlight not found: {}", id))
}

/// Identifier a highlight of `text` on `page` would get
async fn identifier(Query(query): Query<IdentifierQuery>) -> Json<IdentifierResponse> {
    Json(IdentifierResponse {
        id: identifier_for(&query.text, query.page),
    })
}

/// List a book's highlights in the requested (or preferred) scope
async fn list_highlights(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<HighlightRegion>>> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let Some(filter) = session.filter(query.scope) else {
        return Ok(Json(Vec::new()));
    };

    let repo = HighlightRepository::new(state.db());
    let highlights = match query.page {
        Some(page) => repo.list_for_page(&book_id, page, &filter).await?,
        None => repo.list(&book_id, &filter).await?,
    };
    Ok(Json(highlights))
}

/// Most recently updated highlights first
async fn recent_highlights(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(query): Query<RecentQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<HighlightRegion>>> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let Some(filter) = session.filter(query.scope) else {
        return Ok(Json(Vec::new()));
    };

    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(MAX_RECENT_LIMIT);
    let repo = HighlightRepository::new(state.db());
    Ok(Json(repo.recent(&book_id, &filter, limit).await?))
}

/// Create a highlight; the same text on the same page merges into one record
async fn create_highlight(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateHighlightRequest>,
) -> Result<(StatusCode, Json<HighlightRegion>)> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let mut region = NewHighlight::new(&req.text, req.page, req.bounds).into_region(&book_id, &session)?;

    if let Some(text) = req.comment.as_deref().filter(|t| !t.trim().is_empty()) {
        region.comments.push(Comment::new(text, session.user_id()));
    }

    let repo = HighlightRepository::new(state.db());
    let previous = repo.get(&book_id, &region.id).await?;
    if previous
        .as_ref()
        .is_some_and(|p| !p.is_visible_to(session.user_id()))
    {
        return Err(hidden(&region.id));
    }
    let saved = repo.save(&region).await?;
    state.listeners().publish(previous.as_ref(), &saved).await;

    tracing::info!(
        book_id = %book_id,
        highlight_id = %saved.id,
        page = saved.page,
        merged = previous.is_some(),
        "Highlight saved"
    );

    let status = if previous.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(saved)))
}

/// Resolve a rectangle on a page to an existing highlight
async fn match_highlight(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MatchRequest>,
) -> Result<Json<HighlightRegion>> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let no_match = || AppError::NotFound(format!("No highlight at the given bounds on page {}", req.page));
    let filter = session.filter(req.scope).ok_or_else(no_match)?;

    let repo = HighlightRepository::new(state.db());
    let mut visible = VisiblePageSet::new();
    visible.replay(req.page, repo.list_for_page(&book_id, req.page, &filter).await?);

    visible
        .tapped(&req.bounds)
        .cloned()
        .map(Json)
        .ok_or_else(no_match)
}

/// Stream listing changes as server-sent events
async fn highlight_events(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let filter: ScopeFilter = session.filter(query.scope).ok_or_else(|| {
        AppError::BadRequest("A user id is required to follow your own highlights".to_string())
    })?;

    let receiver = state.listeners().subscribe(&book_id, filter).await;

    let events = stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(change) => match Event::default().event("highlight").json_data(&change) {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode highlight change"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Highlight listener lagged behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Get a specific highlight
async fn get_highlight(
    State(state): State<AppState>,
    Path((book_id, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<HighlightRegion>> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let repo = HighlightRepository::new(state.db());

    repo.get(&book_id, &id)
        .await?
        .filter(|h| h.is_visible_to(session.user_id()))
        .map(Json)
        .ok_or_else(|| hidden(&id))
}

/// Delete a highlight (owner only)
async fn delete_highlight(
    State(state): State<AppState>,
    Path((book_id, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let repo = HighlightRepository::new(state.db());

    let existing = repo
        .get(&book_id, &id)
        .await?
        .filter(|h| h.is_visible_to(session.user_id()))
        .ok_or_else(|| hidden(&id))?;
    if !existing.can_be_changed_by(session.user_id()) {
        return Err(AppError::Forbidden(
            "Only the owner can delete a highlight".to_string(),
        ));
    }

    if repo.delete(&book_id, &id).await? {
        state.listeners().publish_removed(&existing).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Append a comment to a highlight
async fn add_comment(
    State(state): State<AppState>,
    Path((book_id, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<HighlightRegion>)> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Comment text is empty".to_string()));
    }

    let session = Session::from_headers(state.db(), &headers).await?;
    let repo = HighlightRepository::new(state.db());

    if !repo
        .get(&book_id, &id)
        .await?
        .is_some_and(|h| h.is_visible_to(session.user_id()))
    {
        return Err(hidden(&id));
    }

    let comment = Comment::new(&req.text, session.user_id());
    let updated = repo.add_comment(&book_id, &id, &comment).await?;
    state.listeners().publish(None, &updated).await;

    Ok((StatusCode::CREATED, Json(updated)))
}

/// Make a highlight public or private (owner only)
async fn set_visibility(
    State(state): State<AppState>,
    Path((book_id, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<HighlightRegion>> {
    let session = Session::from_headers(state.db(), &headers).await?;
    let repo = HighlightRepository::new(state.db());

    let previous = repo.get(&book_id, &id).await?;
    let updated = repo
        .set_visibility(&book_id, &id, req.is_public, session.user_id())
        .await?;
    state.listeners().publish(previous.as_ref(), &updated).await;

    Ok(Json(updated))
}
