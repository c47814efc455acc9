//! Typed catalog rows and convenience operations
//!
//! Thin layer over the generic access primitives in
//! [`storage::sqlite`](crate::storage::sqlite): the structs here map `SELECT *`
//! rows from the two catalog tables, and the helper methods cover the
//! registration path (insert a song, bulk-store its fingerprints, look a song
//! up by file hash).

use rusqlite::types::Value;
use rusqlite::{Row, ToSql};

use crate::Result;
use crate::storage::schema::Table;
use crate::storage::sqlite::SqliteStore;

/// One catalog track. Identity is `filehash`; `id` is the surrogate key
/// fingerprints join against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub id: i64,
    pub name: String,
    pub filehash: String,
}

impl Song {
    /// Map a `SELECT * FROM songs` row
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            filehash: row.get(2)?,
        })
    }
}

/// One (hash, offset) pair tied to a song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub id: i64,
    pub song_fk: i64,
    pub hash: String,
    pub offset: i64,
}

impl Fingerprint {
    /// Map a `SELECT * FROM fingerprints` row
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            song_fk: row.get(1)?,
            hash: row.get(2)?,
            offset: row.get(3)?,
        })
    }
}

impl SqliteStore {
    /// Insert a song and return its generated id.
    ///
    /// A duplicate `filehash` surfaces as a constraint-violation error.
    pub fn insert_song(&self, name: &str, filehash: &str) -> Result<i64> {
        let fields: [(&str, &dyn ToSql); 2] = [("name", &name), ("filehash", &filehash)];
        self.insert(Table::Songs, &fields)
    }

    /// Look a song up by its file hash
    pub fn song_by_filehash(&self, filehash: &str) -> Result<Option<Song>> {
        let constraints: [(&str, &dyn ToSql); 1] = [("filehash", &filehash)];
        self.find_one(Table::Songs, &constraints, Song::from_row)
    }

    /// All fingerprints sharing a hash, across every song
    pub fn fingerprints_by_hash(&self, hash: &str) -> Result<Vec<Fingerprint>> {
        let constraints: [(&str, &dyn ToSql); 1] = [("hash", &hash)];
        self.find_all(Table::Fingerprints, &constraints, Fingerprint::from_row)
    }

    /// Bulk-store (hash, offset) pairs for one song.
    ///
    /// Re-storing pairs the catalog already holds is a no-op.
    pub fn insert_fingerprints(&self, song_id: i64, pairs: &[(String, i64)]) -> Result<()> {
        let rows: Vec<Vec<Value>> = pairs
            .iter()
            .map(|(hash, offset)| {
                vec![
                    Value::from(song_id),
                    Value::from(hash.clone()),
                    Value::from(*offset),
                ]
            })
            .collect();
        self.insert_many(Table::Fingerprints, &["song_fk", "hash", "offset"], &rows)
    }
}
