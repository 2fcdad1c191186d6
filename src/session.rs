//! Session context: the current user and their reading preferences

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::highlights::{HighlightScope, ScopeFilter};

/// Header carrying the caller's user id
pub const USER_HEADER: &str = "x-user-id";

/// Per-user preferences
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// List everyone's public highlights instead of only mine
    pub show_others_highlights: bool,
    /// New highlights start out private
    pub private_activity: bool,
}

/// Explicit current-user context, passed to whatever needs it
#[derive(Debug, Clone, Default)]
pub struct Session {
    user_id: Option<String>,
    preferences: Preferences,
}

impl Session {
    pub fn new(user_id: Option<String>, preferences: Preferences) -> Self {
        Self {
            user_id,
            preferences,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Load the session for the user named in the request headers
    pub async fn from_headers(pool: &SqlitePool, headers: &HeaderMap) -> Result<Self> {
        let user_id = user_from_headers(headers);
        let preferences = match &user_id {
            Some(user) => PreferenceRepository::new(pool).get(user).await?,
            None => Preferences::default(),
        };

        Ok(Self::new(user_id, preferences))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Scope picked by the user's listing toggle
    pub fn default_scope(&self) -> HighlightScope {
        if self.preferences.show_others_highlights {
            HighlightScope::AllPublic
        } else {
            HighlightScope::Mine
        }
    }

    /// Resolve a scope (or the default one) for this user
    pub fn filter(&self, scope: Option<HighlightScope>) -> Option<ScopeFilter> {
        scope
            .unwrap_or_else(|| self.default_scope())
            .filter_for(self.user_id())
    }
}

/// Read the user id from the request headers, ignoring blank values
pub fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// Preference persistence
pub struct PreferenceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PreferenceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored preferences, or the defaults for a user who never saved any
    pub async fn get(&self, user_id: &str) -> Result<Preferences> {
        let prefs = sqlx::query_as::<_, Preferences>(
            r#"
            SELECT show_others_highlights, private_activity
            FROM user_preferences
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(prefs.unwrap_or_default())
    }

    pub async fn save(&self, user_id: &str, prefs: &Preferences) -> Result<Preferences> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, show_others_highlights, private_activity, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                show_others_highlights = excluded.show_others_highlights,
                private_activity = excluded.private_activity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(prefs.show_others_highlights)
        .bind(prefs.private_activity)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        tracing::debug!(user_id, ?prefs, "Saved preferences");
        self.get(user_id).await
    }

    /// Flip the "my highlights only" / "all public highlights" toggle
    pub async fn toggle_listing_scope(&self, user_id: &str) -> Result<Preferences> {
        let mut prefs = self.get(user_id).await?;
        prefs.show_others_highlights = !prefs.show_others_highlights;
        self.save(user_id, &prefs).await
    }
}
