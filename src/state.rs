//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::highlights::ListenerRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: SqlitePool,
    listeners: ListenerRegistry,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: &Config, db: SqlitePool) -> Self {
        let listeners = ListenerRegistry::new(config.sync.listener_capacity);

        Self {
            inner: Arc::new(AppStateInner { db, listeners }),
        }
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the highlight listener registry
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }
}
