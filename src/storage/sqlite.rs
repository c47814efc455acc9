//! SQLite storage implementation

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params_from_iter};
use tracing::{debug, warn};

use super::schema::{self, Table};
use crate::{Error, Result};

/// Rows per batch in [`SqliteStore::insert_many`].
pub const INSERT_CHUNK_SIZE: usize = 1000;

/// SQLite-backed store for the fingerprint catalog.
///
/// Owns the single connection for its whole lifetime. All operations are
/// synchronous; if several processes share one database file, SQLite's own
/// locking governs serialization - no retry-on-busy logic is layered on top.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    ///
    /// Schema creation failure is reported but not fatal: the store is still
    /// returned, and calls against the missing tables fail individually.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Self { conn };
        if let Err(e) = store.ensure_schema() {
            warn!(error = %e, "schema creation failed; store is unusable until fixed");
        }
        debug!("sqlite connection opened");
        Ok(store)
    }

    /// Create the catalog tables if they are missing.
    ///
    /// Idempotent: safe on every startup, never touches existing rows.
    pub fn ensure_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        debug!("sqlite tables ensured");
        Ok(())
    }

    /// Close the connection, surfacing any close-time error.
    ///
    /// Consumes the store, so it runs at most once. Dropping the store
    /// without calling this still releases the connection; statements outside
    /// a transaction are autocommitted, so there is no pending work to flush.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))?;
        debug!("sqlite connection closed");
        Ok(())
    }

    // ========== Raw Execution Primitives ==========

    /// Run a parameterized query and map the first result row, if any.
    ///
    /// Thin pass-through: no retry, caching, or transaction logic. Engine
    /// errors (including placeholder/value count mismatches) propagate
    /// unchanged.
    pub fn execute_one<T, F>(&self, sql: &str, params: &[&dyn ToSql], f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.conn
            .query_row(sql, params, f)
            .optional()
            .map_err(Into::into)
    }

    /// Run a parameterized query and map every result row, in query order.
    pub fn execute_all<T, F>(&self, sql: &str, params: &[&dyn ToSql], f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    // ========== Dynamic Query Builder ==========

    /// Find the first row matching the conjunction of all equality constraints
    pub fn find_one<T, F>(
        &self,
        table: Table,
        constraints: &[(&str, &dyn ToSql)],
        f: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let (sql, values) = build_select(table, constraints)?;
        self.execute_one(&sql, &values, f)
    }

    /// Find every row matching the conjunction of all equality constraints
    pub fn find_all<T, F>(
        &self,
        table: Table,
        constraints: &[(&str, &dyn ToSql)],
        f: F,
    ) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let (sql, values) = build_select(table, constraints)?;
        self.execute_all(&sql, &values, f)
    }

    // ========== Inserts ==========

    /// Insert one row and return its generated rowid.
    ///
    /// Column list and positional values both come from the single ordered
    /// `fields` slice, so they cannot drift apart. Constraint violations
    /// (e.g. a duplicate `filehash`) propagate to the caller.
    pub fn insert(&self, table: Table, fields: &[(&str, &dyn ToSql)]) -> Result<i64> {
        let columns: Vec<&str> = fields.iter().map(|(column, _)| *column).collect();
        let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.as_str(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let values: Vec<&dyn ToSql> = fields.iter().map(|(_, value)| *value).collect();
        self.conn.execute(&sql, &values[..])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Bulk-insert rows with INSERT OR IGNORE semantics.
    ///
    /// Rows whose natural key already exists are silently skipped, which is
    /// what makes re-inserting known fingerprints idempotent. The placeholder
    /// arity is derived from `columns`; every row is validated against it
    /// before any write happens. Rows are applied in chunks of
    /// [`INSERT_CHUNK_SIZE`] inside one transaction committed at the end, so
    /// a failure mid-call leaves none of the call's rows behind.
    pub fn insert_many(&self, table: Table, columns: &[&str], rows: &[Vec<Value>]) -> Result<()> {
        for row in rows {
            if row.len() != columns.len() {
                return Err(Error::ArityMismatch {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            table.as_str(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                for row in chunk {
                    stmt.execute(params_from_iter(row.iter()))?;
                }
                debug!(rows = chunk.len(), "bulk insert chunk applied");
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ========== Aggregates ==========

    /// Count fingerprint rows for a song; 0 for an unknown id.
    pub fn count_fingerprints_for_song(&self, song_id: i64) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE song_fk = ?1",
            Table::Fingerprints.as_str()
        );
        let count: i64 = self.conn.query_row(&sql, [song_id], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Build `SELECT * FROM <table> WHERE c1 = ?1 AND c2 = ?2 ...` plus the bound
/// values in constraint order.
///
/// Folds over *every* supplied pair before assembling the statement; an empty
/// constraint set is rejected rather than producing a malformed query.
fn build_select<'a>(
    table: Table,
    constraints: &[(&str, &'a dyn ToSql)],
) -> Result<(String, Vec<&'a dyn ToSql>)> {
    if constraints.is_empty() {
        return Err(Error::EmptyConstraints(table.as_str()));
    }

    let mut conditions = Vec::with_capacity(constraints.len());
    let mut values = Vec::with_capacity(constraints.len());
    for (i, (column, value)) in constraints.iter().enumerate() {
        conditions.push(format!("{} = ?{}", column, i + 1));
        values.push(*value);
    }

    let sql = format!(
        "SELECT * FROM {} WHERE {}",
        table.as_str(),
        conditions.join(" AND ")
    );
    Ok((sql, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_song(name: &str, filehash: &str) -> (SqliteStore, i64) {
        let store = SqliteStore::open_in_memory().unwrap();
        let fields: [(&str, &dyn ToSql); 2] = [("name", &name), ("filehash", &filehash)];
        let id = store.insert(Table::Songs, &fields).unwrap();
        (store, id)
    }

    fn fingerprint_rows(song_id: i64, n: usize) -> Vec<Vec<Value>> {
        (0..n)
            .map(|k| {
                vec![
                    Value::from(song_id),
                    Value::from(format!("hash{k}")),
                    Value::from(k as i64),
                ]
            })
            .collect()
    }

    #[test]
    fn test_schema_is_idempotent() {
        let (store, _) = store_with_song("Track1", "h1");

        for _ in 0..3 {
            store.ensure_schema().unwrap();
        }

        let count: i64 = store
            .execute_one("SELECT COUNT(*) FROM songs", &[], |row| row.get(0))
            .unwrap()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_song_round_trip() {
        let (store, id) = store_with_song("Track1", "h1");

        let constraints: [(&str, &dyn ToSql); 1] = [("filehash", &"h1")];
        let found = store
            .find_one(Table::Songs, &constraints, |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(2)?))
            })
            .unwrap()
            .unwrap();
        assert_eq!(found, (id, "h1".to_string()));
    }

    #[test]
    fn test_find_one_absent_row_is_none() {
        let store = SqliteStore::open_in_memory().unwrap();

        let constraints: [(&str, &dyn ToSql); 1] = [("filehash", &"missing")];
        let found = store
            .find_one(Table::Songs, &constraints, |row| row.get::<_, i64>(0))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_duplicate_filehash_rejected() {
        let (store, _) = store_with_song("Track1", "h1");

        let fields: [(&str, &dyn ToSql); 2] = [("name", &"Other"), ("filehash", &"h1")];
        let err = store.insert(Table::Songs, &fields).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        let count: i64 = store
            .execute_one(
                "SELECT COUNT(*) FROM songs WHERE filehash = ?1",
                &[&"h1"],
                |row| row.get(0),
            )
            .unwrap()
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_find_all_applies_every_constraint() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (name, filehash) in [("foo", "abc123"), ("foo", "zzz999"), ("bar", "abc456")] {
            let fields: [(&str, &dyn ToSql); 2] = [("name", &name), ("filehash", &filehash)];
            store.insert(Table::Songs, &fields).unwrap();
        }

        let constraints: [(&str, &dyn ToSql); 2] = [("name", &"foo"), ("filehash", &"abc123")];
        let rows = store
            .find_all(Table::Songs, &constraints, |row| {
                row.get::<_, String>(2)
            })
            .unwrap();
        assert_eq!(rows, vec!["abc123".to_string()]);
    }

    #[test]
    fn test_empty_constraints_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();

        let err = store
            .find_all(Table::Songs, &[], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(matches!(err, Error::EmptyConstraints("songs")));
    }

    #[test]
    fn test_build_select_joins_all_conditions() {
        let constraints: [(&str, &dyn ToSql); 2] = [("name", &"foo"), ("filehash", &"abc123")];
        let (sql, values) = build_select(Table::Songs, &constraints).unwrap();
        assert_eq!(sql, "SELECT * FROM songs WHERE name = ?1 AND filehash = ?2");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_insert_many_partial_final_chunk() {
        let (store, id) = store_with_song("Track1", "h1");

        // 1500 rows: one full chunk plus a short one
        let rows = fingerprint_rows(id, 1500);
        store
            .insert_many(Table::Fingerprints, &["song_fk", "hash", "offset"], &rows)
            .unwrap();
        assert_eq!(store.count_fingerprints_for_song(id).unwrap(), 1500);
    }

    #[test]
    fn test_insert_many_is_idempotent() {
        let (store, id) = store_with_song("Track1", "h1");

        let rows = fingerprint_rows(id, 2500);
        let columns = ["song_fk", "hash", "offset"];
        store.insert_many(Table::Fingerprints, &columns, &rows).unwrap();
        assert_eq!(store.count_fingerprints_for_song(id).unwrap(), 2500);

        store.insert_many(Table::Fingerprints, &columns, &rows).unwrap();
        assert_eq!(store.count_fingerprints_for_song(id).unwrap(), 2500);
    }

    #[test]
    fn test_insert_many_arity_mismatch() {
        let (store, id) = store_with_song("Track1", "h1");

        let rows = vec![vec![Value::from(id), Value::from("hash0".to_string())]];
        let err = store
            .insert_many(Table::Fingerprints, &["song_fk", "hash", "offset"], &rows)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ArityMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn test_count_unknown_song_is_zero() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.count_fingerprints_for_song(42).unwrap(), 0);
    }

    #[test]
    fn test_close_and_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");

        let store = SqliteStore::open(&path).unwrap();
        let fields: [(&str, &dyn ToSql); 2] = [("name", &"Track1"), ("filehash", &"h1")];
        store.insert(Table::Songs, &fields).unwrap();
        store.close().unwrap();

        let store = SqliteStore::open(&path).unwrap();
        let constraints: [(&str, &dyn ToSql); 1] = [("filehash", &"h1")];
        let name = store
            .find_one(Table::Songs, &constraints, |row| row.get::<_, String>(1))
            .unwrap()
            .unwrap();
        assert_eq!(name, "Track1");
    }
}
