//! Small helpers over the SQLite connection
//!
//! Schema probing, identifier quoting and metadata row I/O shared by the
//! lifecycle and CRUD code. Everything here operates on a borrowed
//! connection; locking is the caller's concern.

use crate::error::Result;
use crate::meta::Meta;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::error;

/// Tuples per statement for chunked id-list operations, chosen to stay
/// well under SQLite's bound-parameter limit
pub const BATCH_CHUNK_SIZE: usize = 1024;

/// Check whether a table exists in the main schema
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Check whether a table has a column of the given name
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Quote an identifier for embedding into DDL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Read the single `info` row into a metadata map
///
/// Column names become keys; non-text values are rendered textually, which
/// matches how legacy writers stored integers into text columns.
pub fn read_meta(conn: &Connection) -> Result<Meta> {
    let mut meta = Meta::new();

    let mut stmt = conn.prepare("SELECT * FROM info LIMIT 1")?;
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = stmt.query([])?;
    if let Some(row) = rows.next()? {
        for (index, name) in column_names.iter().enumerate() {
            let value = match row.get_ref(index)? {
                ValueRef::Null => continue,
                ValueRef::Integer(v) => v.to_string(),
                ValueRef::Real(v) => v.to_string(),
                ValueRef::Text(v) => String::from_utf8_lossy(v).into_owned(),
                ValueRef::Blob(v) => String::from_utf8_lossy(v).into_owned(),
            };
            meta.set(name.clone(), value);
        }
    }

    Ok(meta)
}

/// Replace the `info` table with one shaped by the given metadata
///
/// The table is dropped and recreated with one TEXT column per key, then a
/// single row is inserted. The row is replaced, never merged.
pub fn write_meta(conn: &Connection, meta: &Meta) -> Result<()> {
    if let Err(e) = conn.execute_batch("DROP TABLE IF EXISTS info") {
        error!(error = %e, "failed to drop info table");
        return Err(e.into());
    }

    if meta.is_empty() {
        // Zero columns would make the CREATE statement invalid; the old
        // row is gone, which is the replacement an empty map asks for
        return Ok(());
    }

    let columns: Vec<&str> = meta.values.keys().map(String::as_str).collect();
    let typed_columns: Vec<String> = columns
        .iter()
        .map(|name| format!("{} TEXT", quote_ident(name)))
        .collect();
    conn.execute_batch(&format!("CREATE TABLE info ({})", typed_columns.join(", ")))?;

    let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    let quoted: Vec<String> = columns.iter().map(|name| quote_ident(name)).collect();
    let insert = format!(
        "INSERT INTO info ({}) VALUES ({})",
        quoted.join(", "),
        placeholders.join(", ")
    );
    conn.execute(
        &insert,
        rusqlite::params_from_iter(meta.values.values().map(String::as_str)),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("minzoom"), "\"minzoom\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_meta_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        let mut meta = Meta::new();
        meta.set_title("Test dataset");
        meta.set_min_zoom(3);
        meta.set_max_zoom(12);

        write_meta(&conn, &meta).unwrap();
        assert!(table_exists(&conn, "info").unwrap());
        assert_eq!(read_meta(&conn).unwrap(), meta);

        // A second store replaces the row and the column set
        let mut smaller = Meta::new();
        smaller.set_url("https://tiles.example.com");
        write_meta(&conn, &smaller).unwrap();
        assert_eq!(read_meta(&conn).unwrap(), smaller);
    }

    #[test]
    fn test_empty_meta_is_not_persisted() {
        let conn = Connection::open_in_memory().unwrap();
        write_meta(&conn, &Meta::new()).unwrap();
        assert!(!table_exists(&conn, "info").unwrap());
    }

    #[test]
    fn test_empty_meta_replaces_existing_row() {
        let conn = Connection::open_in_memory().unwrap();
        let mut meta = Meta::new();
        meta.set_title("old");
        write_meta(&conn, &meta).unwrap();
        assert!(table_exists(&conn, "info").unwrap());

        write_meta(&conn, &Meta::new()).unwrap();
        assert!(!table_exists(&conn, "info").unwrap());
    }

    #[test]
    fn test_column_exists() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE tiles (x INTEGER, y INTEGER, z INTEGER, image BLOB)")
            .unwrap();
        assert!(column_exists(&conn, "tiles", "image").unwrap());
        assert!(!column_exists(&conn, "tiles", "time").unwrap());
    }
}
