//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - songs(id, name, filehash)
//! - fingerprints(id, song_fk, hash, offset)
//!
//! `songs.filehash` is unique; `fingerprints.song_fk` references `songs.id`.

pub mod schema;
pub mod sqlite;

pub use schema::Table;
pub use sqlite::{INSERT_CHUNK_SIZE, SqliteStore};
