//! Highlight data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geometry::Bounds;
use super::matcher::identifier_for;
use crate::error::ValidationError;
use crate::session::Session;

/// A highlighted text region on one page of a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRegion {
    /// Content-derived identifier, see [`identifier_for`]
    pub id: String,
    pub book_id: String,
    /// Selected text (may be empty)
    pub text: String,
    /// Zero-based page index
    pub page: u32,
    pub bounds: Bounds,
    /// Authoring user, `None` for anonymous creations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub is_public: bool,
    /// Append-only, insertion order
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A free-text note attached to a highlight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A text selection about to become a highlight
#[derive(Debug, Clone, Deserialize)]
pub struct NewHighlight {
    pub text: String,
    pub page: u32,
    pub bounds: Bounds,
}

/// Which highlights a listing shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightScope {
    /// Only the current user's highlights, private ones included
    Mine,
    /// Every public highlight, plus the current user's own
    #[serde(rename = "all")]
    AllPublic,
}

/// A scope resolved against a concrete viewer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeFilter {
    Owner(String),
    Public { viewer: Option<String> },
}

impl HighlightRegion {
    /// Build a region without validating `bounds`.
    ///
    /// Callers outside this crate go through [`NewHighlight::into_region`].
    pub(crate) fn new(
        book_id: &str,
        text: &str,
        page: u32,
        bounds: Bounds,
        owner_id: Option<&str>,
        is_public: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: identifier_for(text, page),
            book_id: book_id.to_string(),
            text: text.to_string(),
            page,
            bounds,
            owner_id: owner_id.map(|s| s.to_string()),
            is_public,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` authored this highlight
    pub fn is_owned_by(&self, user_id: Option<&str>) -> bool {
        match (self.owner_id.as_deref(), user_id) {
            (Some(owner), Some(user)) => owner == user,
            _ => false,
        }
    }

    /// Owners may change their highlights; ownerless ones are open to anyone
    pub fn can_be_changed_by(&self, user_id: Option<&str>) -> bool {
        self.owner_id.is_none() || self.is_owned_by(user_id)
    }

    /// Public highlights are visible to everyone, private ones to whoever may change them
    pub fn is_visible_to(&self, user_id: Option<&str>) -> bool {
        self.is_public || self.can_be_changed_by(user_id)
    }

    /// All comments, each followed by a newline; `None` when there are none
    pub fn comment_text(&self) -> Option<String> {
        if self.comments.is_empty() {
            return None;
        }

        let mut text = String::new();
        for comment in &self.comments {
            text.push_str(&comment.text);
            text.push('\n');
        }
        Some(text)
    }
}

impl Comment {
    pub fn new(text: &str, author_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            author_id: author_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        }
    }
}

impl NewHighlight {
    pub fn new(text: &str, page: u32, bounds: Bounds) -> Self {
        Self {
            text: text.to_string(),
            page,
            bounds,
        }
    }

    /// Check the selection bounds: finite, with non-negative size
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.bounds.is_finite() {
            return Err(ValidationError::NonFiniteBounds);
        }
        if self.bounds.width < 0.0 || self.bounds.height < 0.0 {
            return Err(ValidationError::NegativeSize {
                width: self.bounds.width,
                height: self.bounds.height,
            });
        }
        Ok(())
    }

    /// Turn the selection into a region owned by the session user.
    ///
    /// The region is public unless the user has private activity turned on.
    pub fn into_region(self, book_id: &str, session: &Session) -> Result<HighlightRegion, ValidationError> {
        self.validate()?;

        Ok(HighlightRegion::new(
            book_id,
            &self.text,
            self.page,
            self.bounds,
            session.user_id(),
            !session.preferences().private_activity,
        ))
    }
}

impl HighlightScope {
    /// Resolve against a viewer; `Mine` without a user resolves to nothing
    pub fn filter_for(self, user_id: Option<&str>) -> Option<ScopeFilter> {
        match self {
            HighlightScope::Mine => user_id.map(|u| ScopeFilter::Owner(u.to_string())),
            HighlightScope::AllPublic => Some(ScopeFilter::Public {
                viewer: user_id.map(|u| u.to_string()),
            }),
        }
    }
}

impl ScopeFilter {
    /// Whether a region is visible under this filter
    pub fn admits(&self, region: &HighlightRegion) -> bool {
        match self {
            ScopeFilter::Owner(user) => region.is_owned_by(Some(user)),
            ScopeFilter::Public { viewer } => {
                region.is_public || region.is_owned_by(viewer.as_deref())
            }
        }
    }
}
