//! # Huddle Common Library
//!
//! Shared code for the huddle real-time pairing engine:
//! - Database initialization, models and queries
//! - SSE event names and payload types
//! - Vector math used by the graph/matching engines
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod vecmath;

pub use error::{Error, Result};
