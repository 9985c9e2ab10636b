//! Shared database schema, migrations, and query builders.

pub mod migrations;
pub mod oauth;
pub mod tables;
pub mod users;

// Re-export tables for convenience
pub use tables::*;

/// A built statement: SQL text plus bound values.
pub type Built = (String, sea_query::Values);
