//! SQLite storage for highlights
//!
//! Records are keyed by book and content-derived identifier, so the same
//! selection saved from two devices collapses into one row. Comments live
//! in their own append-only table.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use super::geometry::Bounds;
use super::types::{Comment, HighlightRegion, ScopeFilter};
use crate::error::{AppError, Result};

/// Repository for highlight persistence
pub struct HighlightRepository<'a> {
    pool: &'a SqlitePool,
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    /// Oldest first, ties by insertion
    Created,
    /// Most recently touched first
    RecentlyUpdated,
}

const HIGHLIGHT_COLUMNS: &str = r#"
    id, book_id, text, page, origin_x, origin_y, width, height,
    owner_id, is_public, created_at, updated_at
"#;

impl<'a> HighlightRepository<'a> {
    /// Create a new repository
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or update a highlight keyed by its identifier.
    ///
    /// An existing record keeps its bounds, owner, visibility and creation
    /// time; only `updated_at` moves. Comments carried on `region` that are
    /// not stored yet are appended in order.
    pub async fn save(&self, region: &HighlightRegion) -> Result<HighlightRegion> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO highlights (
                id, book_id, text, page, origin_x, origin_y, width, height,
                owner_id, is_public, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(book_id, id) DO UPDATE SET
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&region.id)
        .bind(&region.book_id)
        .bind(&region.text)
        .bind(i64::from(region.page))
        .bind(region.bounds.x)
        .bind(region.bounds.y)
        .bind(region.bounds.width)
        .bind(region.bounds.height)
        .bind(&region.owner_id)
        .bind(region.is_public)
        .bind(timestamp(&region.created_at))
        .bind(timestamp(&region.updated_at))
        .execute(&mut *tx)
        .await?;

        for comment in &region.comments {
            sqlx::query(
                r#"
                INSERT INTO highlight_comments (id, book_id, highlight_id, text, author_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&comment.id)
            .bind(&region.book_id)
            .bind(&region.id)
            .bind(&comment.text)
            .bind(&comment.author_id)
            .bind(timestamp(&comment.created_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            book_id = %region.book_id,
            highlight_id = %region.id,
            page = region.page,
            "Saved highlight"
        );

        self.get(&region.book_id, &region.id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch saved highlight".to_string()))
    }

    /// Get a highlight with its comments
    pub async fn get(&self, book_id: &str, id: &str) -> Result<Option<HighlightRegion>> {
        let sql = format!(
            "SELECT {} FROM highlights WHERE book_id = ? AND id = ?",
            HIGHLIGHT_COLUMNS
        );
        let row = sqlx::query_as::<_, HighlightRow>(&sql)
            .bind(book_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let comments = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT highlight_id, id, text, author_id, created_at
            FROM highlight_comments
            WHERE book_id = ? AND highlight_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(book_id)
        .bind(id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(CommentRow::into_comment)
        .collect::<Result<Vec<_>>>()?;

        row.into_region(comments).map(Some)
    }

    /// List a book's highlights visible under `filter`, oldest first
    pub async fn list(&self, book_id: &str, filter: &ScopeFilter) -> Result<Vec<HighlightRegion>> {
        self.fetch(book_id, None, filter, Order::Created, None).await
    }

    /// Highlights on one page, oldest first
    pub async fn list_for_page(
        &self,
        book_id: &str,
        page: u32,
        filter: &ScopeFilter,
    ) -> Result<Vec<HighlightRegion>> {
        self.fetch(book_id, Some(page), filter, Order::Created, None).await
    }

    /// Most recently updated highlights first
    pub async fn recent(
        &self,
        book_id: &str,
        filter: &ScopeFilter,
        limit: u32,
    ) -> Result<Vec<HighlightRegion>> {
        self.fetch(book_id, None, filter, Order::RecentlyUpdated, Some(limit))
            .await
    }

    /// Count highlights visible under `filter`
    pub async fn count(&self, book_id: &str, filter: &ScopeFilter) -> Result<i64> {
        let (clause, bind) = filter_clause(filter);
        let sql = format!(
            "SELECT COUNT(*) FROM highlights WHERE book_id = ? AND {}",
            clause
        );

        let mut q = sqlx::query_as::<_, (i64,)>(&sql).bind(book_id);
        if let Some(value) = bind {
            q = q.bind(value);
        }

        Ok(q.fetch_one(self.pool).await?.0)
    }

    /// Append a comment; the highlight's `updated_at` moves forward
    pub async fn add_comment(
        &self,
        book_id: &str,
        highlight_id: &str,
        comment: &Comment,
    ) -> Result<HighlightRegion> {
        let mut region = self
            .get(book_id, highlight_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Highlight not found: {}", highlight_id)))?;

        region.comments.push(comment.clone());
        region.updated_at = Utc::now();
        self.save(&region).await
    }

    /// Change visibility. Only the owner may do this; ownerless highlights
    /// can be changed by anyone.
    pub async fn set_visibility(
        &self,
        book_id: &str,
        id: &str,
        is_public: bool,
        user_id: Option<&str>,
    ) -> Result<HighlightRegion> {
        let region = self
            .get(book_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Highlight not found: {}", id)))?;

        if !region.can_be_changed_by(user_id) {
            return Err(AppError::Forbidden(
                "Only the owner can change a highlight's visibility".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE highlights SET is_public = ?, updated_at = ? WHERE book_id = ? AND id = ?",
        )
        .bind(is_public)
        .bind(timestamp(&Utc::now()))
        .bind(book_id)
        .bind(id)
        .execute(self.pool)
        .await?;

        self.get(book_id, id)
            .await?
            .ok_or_else(|| AppError::Internal("Highlight vanished during update".to_string()))
    }

    /// Delete a highlight and its comments
    pub async fn delete(&self, book_id: &str, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM highlight_comments WHERE book_id = ? AND highlight_id = ?")
            .bind(book_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM highlights WHERE book_id = ? AND id = ?")
            .bind(book_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch(
        &self,
        book_id: &str,
        page: Option<u32>,
        filter: &ScopeFilter,
        order: Order,
        limit: Option<u32>,
    ) -> Result<Vec<HighlightRegion>> {
        let (clause, bind) = filter_clause(filter);

        let mut sql = format!(
            "SELECT {} FROM highlights WHERE book_id = ? AND {}",
            HIGHLIGHT_COLUMNS, clause
        );
        if page.is_some() {
            sql.push_str(" AND page = ?");
        }
        sql.push_str(match order {
            Order::Created => " ORDER BY created_at ASC, rowid ASC",
            Order::RecentlyUpdated => " ORDER BY updated_at DESC, rowid DESC",
        });
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query_as::<_, HighlightRow>(&sql).bind(book_id);
        if let Some(value) = bind {
            q = q.bind(value);
        }
        if let Some(page) = page {
            q = q.bind(i64::from(page));
        }

        let rows = q.fetch_all(self.pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut comments = self.comments_for_book(book_id).await?;
        rows.into_iter()
            .map(|row| {
                let own = comments.remove(&row.id).unwrap_or_default();
                row.into_region(own)
            })
            .collect()
    }

    /// All comments of a book grouped by highlight, in insertion order
    async fn comments_for_book(&self, book_id: &str) -> Result<HashMap<String, Vec<Comment>>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT highlight_id, id, text, author_id, created_at
            FROM highlight_comments
            WHERE book_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.pool)
        .await?;

        let mut grouped: HashMap<String, Vec<Comment>> = HashMap::new();
        for row in rows {
            let highlight_id = row.highlight_id.clone();
            grouped
                .entry(highlight_id)
                .or_default()
                .push(row.into_comment()?);
        }
        Ok(grouped)
    }
}

/// SQL condition for a scope filter plus its bound value
fn filter_clause(filter: &ScopeFilter) -> (&'static str, Option<&str>) {
    match filter {
        ScopeFilter::Owner(user) => ("owner_id = ?", Some(user.as_str())),
        ScopeFilter::Public { viewer: Some(viewer) } => {
            ("(is_public = 1 OR owner_id = ?)", Some(viewer.as_str()))
        }
        ScopeFilter::Public { viewer: None } => ("is_public = 1", None),
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Bad stored timestamp {:?}: {}", value, e)))
}

/// Internal row type for SQLite queries
#[derive(sqlx::FromRow)]
struct HighlightRow {
    id: String,
    book_id: String,
    text: String,
    page: i64,
    origin_x: f64,
    origin_y: f64,
    width: f64,
    height: f64,
    owner_id: Option<String>,
    is_public: bool,
    created_at: String,
    updated_at: String,
}

impl HighlightRow {
    fn into_region(self, comments: Vec<Comment>) -> Result<HighlightRegion> {
        let page = u32::try_from(self.page)
            .map_err(|_| AppError::Internal(format!("Bad stored page index: {}", self.page)))?;

        Ok(HighlightRegion {
            id: self.id,
            book_id: self.book_id,
            text: self.text,
            page,
            bounds: Bounds::new(self.origin_x, self.origin_y, self.width, self.height),
            owner_id: self.owner_id,
            is_public: self.is_public,
            comments,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    highlight_id: String,
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: String,
}

impl CommentRow {
    fn into_comment(self) -> Result<Comment> {
        Ok(Comment {
            id: self.id,
            text: self.text,
            author_id: self.author_id,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::highlights::HighlightScope;

    fn region(book: &str, text: &str, page: u32, owner: Option<&str>, is_public: bool) -> HighlightRegion {
        HighlightRegion::new(book, text, page, Bounds::new(10.0, 10.0, 100.0, 20.0), owner, is_public)
    }

    fn everyone() -> ScopeFilter {
        ScopeFilter::Public { viewer: None }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let r = region("book-1", "It was a dark and stormy night", 0, Some("alice"), true);
        let saved = repo.save(&r).await.unwrap();

        assert_eq!(saved.id, r.id);
        assert_eq!(saved.bounds, r.bounds);
        assert_eq!(saved.owner_id.as_deref(), Some("alice"));

        let loaded = repo.get("book-1", &r.id).await.unwrap().unwrap();
        assert_eq!(loaded.text, "It was a dark and stormy night");
        assert!(repo.get("book-2", &r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_selection_collapses() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let first = region("book-1", "same words", 3, Some("alice"), true);
        repo.save(&first).await.unwrap();

        // Same text and page from another device, different bounds and owner
        let mut second = region("book-1", "same words", 3, Some("bob"), false);
        second.bounds = Bounds::new(500.0, 500.0, 1.0, 1.0);
        let stored = repo.save(&second).await.unwrap();

        assert_eq!(repo.count("book-1", &everyone()).await.unwrap(), 1);
        assert_eq!(stored.bounds, first.bounds);
        assert_eq!(stored.owner_id.as_deref(), Some("alice"));
        assert!(stored.is_public);
        assert!(stored.updated_at >= first.updated_at);

        // The owner's tap on the original rectangle still resolves
        let page = repo.list_for_page("book-1", 3, &everyone()).await.unwrap();
        assert!(crate::highlights::find(&page, &first.bounds).is_some());
    }

    #[tokio::test]
    async fn test_same_selection_in_two_books() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        repo.save(&region("book-1", "chapter one", 0, None, true)).await.unwrap();
        repo.save(&region("book-2", "chapter one", 0, None, true)).await.unwrap();

        assert_eq!(repo.count("book-1", &everyone()).await.unwrap(), 1);
        assert_eq!(repo.count("book-2", &everyone()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_scopes() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        repo.save(&region("b", "alice public", 0, Some("alice"), true)).await.unwrap();
        repo.save(&region("b", "alice private", 0, Some("alice"), false)).await.unwrap();
        repo.save(&region("b", "bob public", 1, Some("bob"), true)).await.unwrap();
        repo.save(&region("b", "bob private", 1, Some("bob"), false)).await.unwrap();

        let texts = |list: Vec<HighlightRegion>| list.into_iter().map(|r| r.text).collect::<Vec<_>>();

        let mine = HighlightScope::Mine.filter_for(Some("alice")).unwrap();
        assert_eq!(
            texts(repo.list("b", &mine).await.unwrap()),
            ["alice public", "alice private"]
        );

        let all = HighlightScope::AllPublic.filter_for(Some("alice")).unwrap();
        assert_eq!(
            texts(repo.list("b", &all).await.unwrap()),
            ["alice public", "alice private", "bob public"]
        );

        assert_eq!(
            texts(repo.list("b", &everyone()).await.unwrap()),
            ["alice public", "bob public"]
        );
    }

    #[tokio::test]
    async fn test_list_for_page() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        repo.save(&region("b", "p0", 0, None, true)).await.unwrap();
        repo.save(&region("b", "p1 a", 1, None, true)).await.unwrap();
        repo.save(&region("b", "p1 b", 1, None, true)).await.unwrap();

        let page = repo.list_for_page("b", 1, &everyone()).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|r| r.page == 1));
        assert_eq!(page[0].text, "p1 a");
    }

    #[tokio::test]
    async fn test_comments_keep_order() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let r = repo.save(&region("b", "quote", 0, Some("alice"), true)).await.unwrap();
        repo.add_comment("b", &r.id, &Comment::new("first", Some("alice")))
            .await
            .unwrap();
        let updated = repo
            .add_comment("b", &r.id, &Comment::new("second", Some("bob")))
            .await
            .unwrap();

        assert_eq!(updated.comment_text().unwrap(), "first\nsecond\n");
        assert!(updated.updated_at >= r.updated_at);

        let listed = repo.list("b", &everyone()).await.unwrap();
        assert_eq!(listed[0].comments.len(), 2);
        assert_eq!(listed[0].comments[1].author_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_comment_on_missing_highlight() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let err = repo
            .add_comment("b", "nope", &Comment::new("hi", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_saving_again_does_not_duplicate_comments() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let mut r = region("b", "quote", 0, None, true);
        r.comments.push(Comment::new("note", None));
        repo.save(&r).await.unwrap();
        let again = repo.save(&r).await.unwrap();

        assert_eq!(again.comments.len(), 1);
    }

    #[tokio::test]
    async fn test_set_visibility_owner_only() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let r = repo.save(&region("b", "quote", 0, Some("alice"), true)).await.unwrap();

        let err = repo
            .set_visibility("b", &r.id, false, Some("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let hidden = repo
            .set_visibility("b", &r.id, false, Some("alice"))
            .await
            .unwrap();
        assert!(!hidden.is_public);
    }

    #[tokio::test]
    async fn test_ownerless_visibility() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let r = repo.save(&region("b", "quote", 0, None, true)).await.unwrap();
        let hidden = repo.set_visibility("b", &r.id, false, None).await.unwrap();
        assert!(!hidden.is_public);
    }

    #[tokio::test]
    async fn test_recent_order_and_limit() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let a = repo.save(&region("b", "a", 0, None, true)).await.unwrap();
        repo.save(&region("b", "b", 0, None, true)).await.unwrap();
        repo.save(&region("b", "c", 0, None, true)).await.unwrap();
        repo.add_comment("b", &a.id, &Comment::new("bump", None))
            .await
            .unwrap();

        let recent = repo.recent("b", &everyone(), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "a");
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = db::connect_in_memory().await.unwrap();
        let repo = HighlightRepository::new(&pool);

        let r = repo.save(&region("b", "quote", 0, None, true)).await.unwrap();
        repo.add_comment("b", &r.id, &Comment::new("note", None))
            .await
            .unwrap();

        assert!(repo.delete("b", &r.id).await.unwrap());
        assert!(repo.get("b", &r.id).await.unwrap().is_none());
        assert!(!repo.delete("b", &r.id).await.unwrap());
    }
}
