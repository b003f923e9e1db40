//! Platform-wide reshapes that are not tied to any analytics domain.

use crate::error::MigrateError;
use crate::probe;
use rusqlite::{params, Connection};
use tracing::info;

const RETENTION_DEFAULT_DAYS: i64 = 30;

/// Legacy retention keys and the cleaning category each one becomes.
const RETENTION_KEYS: &[(&str, &str)] = &[
    ("metadata_history_days", "metadata"),
    ("alerts_history_days", "alerts"),
    ("image_history_days", "storage_data"),
];

/// Splits the legacy key/value `settings` table into `system_settings` and
/// `cleaning_settings`, then drops it. One transaction; any failure leaves
/// the legacy table untouched.
pub fn split_system_settings(conn: &mut Connection) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;

    tx.execute(
        "CREATE TABLE system_settings (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             variable_name TEXT NOT NULL,
             value TEXT
         )",
        [],
    )?;
    info!("platform: 'system_settings' table created");

    tx.execute(
        "CREATE TABLE cleaning_settings (
             category_id TEXT NOT NULL UNIQUE,
             retention_period INTEGER NOT NULL
         )",
        [],
    )?;
    info!("platform: 'cleaning_settings' table created");

    let entries = {
        let mut stmt = tx.prepare("SELECT Variable_name, Value FROM settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    for (name, value) in &entries {
        if RETENTION_KEYS.iter().any(|(key, _)| key == name) {
            continue;
        }
        tx.execute(
            "INSERT INTO system_settings (variable_name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        info!(
            "platform: 'system_settings' populated with variable {name} and value {}",
            value.as_deref().unwrap_or("NULL")
        );
    }

    for (key, category) in RETENTION_KEYS {
        let retention = match entries.iter().find(|(name, _)| name == key) {
            Some((_, Some(value))) => value.parse::<i64>().map_err(|e| {
                MigrateError::Validation(format!("retention setting '{key}' is not a number: {e}"))
            })?,
            _ => RETENTION_DEFAULT_DAYS,
        };
        tx.execute(
            "INSERT INTO cleaning_settings (category_id, retention_period) VALUES (?1, ?2)",
            params![category, retention],
        )?;
        info!(
            "platform: 'cleaning_settings' populated category {category} \
             with retention period {retention} days"
        );
    }

    tx.execute("DROP TABLE settings", [])?;
    tx.commit()?;
    Ok(())
}

/// Widens the single `role_id` on `users` into a JSON `role_ids` list.
pub fn widen_user_roles(conn: &mut Connection) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;
    tx.execute(
        "ALTER TABLE users ADD COLUMN role_ids TEXT NOT NULL DEFAULT '[]'",
        [],
    )?;
    tx.execute("UPDATE users SET role_ids = '[' || role_id || ']'", [])?;
    tx.execute("ALTER TABLE users DROP COLUMN role_id", [])?;
    tx.commit()?;
    info!("platform: role_id replaced by role_ids in 'users' table");
    Ok(())
}

/// Drops the bookkeeping table left behind by the previous migration tool.
/// Returns whether the table was present.
pub fn drop_legacy_changelog(conn: &Connection) -> Result<bool, MigrateError> {
    if !probe::table_exists(conn, "databasechangelog")? {
        return Ok(false);
    }
    conn.execute("DROP TABLE databasechangelog", [])?;
    info!("platform: dropped 'databasechangelog' table");
    Ok(true)
}
