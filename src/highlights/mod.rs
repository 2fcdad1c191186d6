//! Highlight module
//!
//! Spatial matching and identity for PDF text highlights, plus the
//! persistence and change fan-out that keep devices in sync.
//!
//! # Matching
//!
//! A tap or new selection is resolved to an existing highlight in two
//! phases: exact bounds first, then the first highlight whose bounds
//! enclose the query. Multi-line selections are stored as one bounding
//! box, so tapping a single line still finds its parent.
//!
//! # Identity
//!
//! A highlight's id is a SHA-1 digest of its text and page number. Two
//! devices highlighting the same words on the same page produce the same
//! id, and the store merges them into one record.

mod geometry;
mod listener;
mod matcher;
mod store;
mod types;
mod visible;

pub use geometry::Bounds;
pub use listener::{HighlightChange, ListenerRegistry};
pub use matcher::{find, identifier_for};
pub use store::HighlightRepository;
pub use types::{Comment, HighlightRegion, HighlightScope, NewHighlight, ScopeFilter};
pub use visible::VisiblePageSet;
