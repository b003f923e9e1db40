//! Existence guards over the live schema.
//!
//! A missing legacy table means the owning plugin was never installed; the
//! caller skips that domain entirely instead of treating it as a failure.

use crate::error::MigrateError;
use rusqlite::Connection;

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, MigrateError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, MigrateError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::{column_exists, table_exists};
    use rusqlite::Connection;

    #[test]
    fn reports_presence_and_absence() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE streams (id INTEGER PRIMARY KEY, uuid TEXT)")
            .expect("schema");

        assert!(table_exists(&conn, "streams").expect("probe"));
        assert!(!table_exists(&conn, "alpr_lists").expect("probe"));
        assert!(column_exists(&conn, "streams", "uuid").expect("probe"));
        assert!(!column_exists(&conn, "streams", "parent_id").expect("probe"));
    }
}
