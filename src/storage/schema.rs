//! Database schema definitions

/// SQL to create the songs table
pub const CREATE_SONGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS songs (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    filehash TEXT NOT NULL UNIQUE
)
"#;

/// SQL to create the fingerprints table
///
/// The composite UNIQUE constraint defines the natural key of a fingerprint
/// row; it is what makes `INSERT OR IGNORE` bulk loads idempotent.
pub const CREATE_FINGERPRINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fingerprints (
    id INTEGER PRIMARY KEY,
    song_fk INTEGER NOT NULL,
    hash TEXT NOT NULL,
    offset INTEGER NOT NULL,
    FOREIGN KEY(song_fk) REFERENCES songs(id),
    UNIQUE(song_fk, hash, offset)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_fingerprints_hash ON fingerprints(hash)",
    "CREATE INDEX IF NOT EXISTS idx_fingerprints_song ON fingerprints(song_fk)",
];

/// All schema creation statements, in dependency order
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_SONGS_TABLE, CREATE_FINGERPRINTS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// The tables this crate persists.
///
/// SQL parameters cannot bind identifiers, so every interpolated table name
/// in the access layer comes from this enumeration, never from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Songs,
    Fingerprints,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Songs => "songs",
            Table::Fingerprints => "fingerprints",
        }
    }
}
