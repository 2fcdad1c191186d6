//! Highlight Server Library
//!
//! Highlight matching and multi-device sync for a PDF reader. The server
//! binary is in main.rs.
//!
//! # Modules
//!
//! - `highlights`: identity, hit-testing, persistence and change fan-out
//! - `reader`: per-reader view model (current page, visible highlights)
//! - `session`: explicit current-user context and preferences
//! - `routes`: HTTP API

pub mod config;
pub mod db;
pub mod error;
pub mod highlights;
pub mod reader;
pub mod routes;
pub mod session;
pub mod state;
