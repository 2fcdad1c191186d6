//! Reader view model
//!
//! Tracks the page being read and the highlights drawn on it. The page's
//! highlight set is rebuilt from the store on every page change. Saves
//! are fire-and-forget: a failed write is logged and the highlight simply
//! does not appear.

use crate::error::Result;
use crate::highlights::{
    Bounds, Comment, HighlightRegion, HighlightRepository, NewHighlight, VisiblePageSet,
};
use crate::session::Session;

/// One reader's view of a book: the current page and the highlights drawn on it
pub struct ReaderSession {
    book_id: String,
    session: Session,
    current_page: u32,
    visible: VisiblePageSet,
}

impl ReaderSession {
    pub fn new(book_id: &str, session: Session) -> Self {
        Self {
            book_id: book_id.to_string(),
            session,
            current_page: 0,
            visible: VisiblePageSet::new(),
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn visible(&self) -> &VisiblePageSet {
        &self.visible
    }

    /// Move to `page` and redraw its highlights from the store.
    ///
    /// Returns how many highlights are now visible.
    pub async fn change_page(&mut self, repo: &HighlightRepository<'_>, page: u32) -> Result<usize> {
        self.current_page = page;
        self.visible.clear();

        let Some(filter) = self.session.filter(None) else {
            tracing::debug!(book_id = %self.book_id, page, "No listing scope for anonymous reader");
            return Ok(0);
        };

        let regions = repo.list_for_page(&self.book_id, page, &filter).await?;
        self.visible.replay(page, regions);

        tracing::debug!(
            book_id = %self.book_id,
            page,
            visible = self.visible.len(),
            "Replayed page highlights"
        );
        Ok(self.visible.len())
    }

    /// The drawn highlight under a tapped annotation, if any
    pub fn tapped(&self, bounds: &Bounds) -> Option<&HighlightRegion> {
        self.visible.tapped(bounds)
    }

    /// Build an unsaved highlight for the comment-first flow
    pub fn prepare_highlight(&self, text: &str, page: u32, bounds: Bounds) -> Option<HighlightRegion> {
        match NewHighlight::new(text, page, bounds).into_region(&self.book_id, &self.session) {
            Ok(region) => Some(region),
            Err(e) => {
                tracing::warn!(book_id = %self.book_id, page, error = %e, "Rejected selection");
                None
            }
        }
    }

    /// Highlight the current selection on the current page
    pub async fn highlight_selection(
        &mut self,
        repo: &HighlightRepository<'_>,
        text: &str,
        bounds: Bounds,
    ) -> Option<HighlightRegion> {
        let region = self.prepare_highlight(text, self.current_page, bounds)?;
        self.persist(repo, region).await
    }

    /// Save a prepared highlight together with its first comment
    pub async fn commit_with_comment(
        &mut self,
        repo: &HighlightRepository<'_>,
        mut region: HighlightRegion,
        comment: &str,
    ) -> Option<HighlightRegion> {
        region
            .comments
            .push(Comment::new(comment, self.session.user_id()));
        self.persist(repo, region).await
    }

    async fn persist(
        &mut self,
        repo: &HighlightRepository<'_>,
        region: HighlightRegion,
    ) -> Option<HighlightRegion> {
        let existing = match repo.get(&self.book_id, &region.id).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(book_id = %self.book_id, highlight_id = %region.id, error = %e, "Failed to load highlight");
                return None;
            }
        };
        if existing.is_some_and(|h| !h.is_visible_to(self.session.user_id())) {
            tracing::debug!(book_id = %self.book_id, highlight_id = %region.id, "Selection matches a private highlight");
            return None;
        }

        match repo.save(&region).await {
            Ok(saved) => {
                if saved.page == self.current_page {
                    self.visible.insert(saved.clone());
                }
                Some(saved)
            }
            Err(e) => {
                tracing::warn!(
                    book_id = %self.book_id,
                    highlight_id = %region.id,
                    error = %e,
                    "Failed to save highlight"
                );
                None
            }
        }
    }
}
