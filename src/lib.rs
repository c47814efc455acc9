//! # Waveprint - audio-fingerprint catalog persistence
//!
//! A minimal persistence layer for an audio-fingerprint catalog: a `songs`
//! table (one row per track) and a `fingerprints` table (many hash+offset
//! rows per track, keyed back to the song by foreign key).
//!
//! Waveprint provides:
//! - A generic access layer over a single SQLite connection: parameterized
//!   single/multi-row execution, a dynamic equality query builder,
//!   single-row insert, and chunked bulk insert with duplicate suppression
//! - Idempotent schema creation on open
//! - Typed `Song`/`Fingerprint` models with catalog helpers built on the
//!   generic primitives
//!
//! Fingerprint extraction and match scoring live outside this crate; callers
//! hand in rows and get rows back.

pub mod models;
pub mod storage;

// Re-exports for convenient access
pub use models::{Fingerprint, Song};
pub use storage::SqliteStore;
pub use storage::schema::Table;

/// Result type alias for Waveprint operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Waveprint operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Engine errors pass through verbatim: constraint violations, malformed
    /// SQL, parameter-count mismatches.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("No constraints supplied for query on table {0}")]
    EmptyConstraints(&'static str),

    #[error("Row has {actual} values but {expected} columns were declared")]
    ArityMismatch { expected: usize, actual: usize },
}
