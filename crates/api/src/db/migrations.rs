//! Canonical migration definitions.

/// A named migration: `(name, sql)`.
pub type Migration = (&'static str, &'static str);

/// Server schema migrations, applied in order.
pub const MIGRATIONS: &[Migration] = &[(
    "0001_schema",
    include_str!("../../../../migrations/0001_schema.sql"),
)];
