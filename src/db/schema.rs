//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Highlights; the content-derived id covers text and page, not the book
CREATE TABLE IF NOT EXISTS highlights (
    book_id TEXT NOT NULL,
    id TEXT NOT NULL,
    text TEXT NOT NULL,
    -- Zero-based page index
    page INTEGER NOT NULL,
    origin_x REAL NOT NULL,
    origin_y REAL NOT NULL,
    width REAL NOT NULL,
    height REAL NOT NULL,
    owner_id TEXT,
    is_public INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (book_id, id)
);

CREATE INDEX IF NOT EXISTS idx_highlights_book_page ON highlights(book_id, page);
CREATE INDEX IF NOT EXISTS idx_highlights_owner_id ON highlights(owner_id);

-- Comments, append-only; seq preserves insertion order
CREATE TABLE IF NOT EXISTS highlight_comments (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    book_id TEXT NOT NULL,
    highlight_id TEXT NOT NULL,
    text TEXT NOT NULL,
    author_id TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_highlight_id ON highlight_comments(book_id, highlight_id);

-- Per-user preferences
CREATE TABLE IF NOT EXISTS user_preferences (
    user_id TEXT PRIMARY KEY,
    show_others_highlights INTEGER NOT NULL DEFAULT 0,
    private_activity INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
"#;
