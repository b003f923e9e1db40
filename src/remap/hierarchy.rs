use crate::error::MigrateError;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// Per-domain result of a reconcile pass, for log lines and assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub assigned: usize,
    pub created_groups: usize,
    pub skipped: usize,
}

/// One-time schema prep for group reconciliation: the group-id column on the
/// canonical table and the group table itself.
pub fn prepare_group_schema(conn: &mut Connection) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;
    tx.execute(
        "ALTER TABLE analytics ADD COLUMN group_id INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    tx.execute(
        "CREATE TABLE analytics_groups (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL,
             parent_id INTEGER NOT NULL,
             plugin_name TEXT NOT NULL,
             client_id INTEGER NOT NULL
         )",
        [],
    )?;
    tx.commit()?;
    info!("hierarchy: group_id column added to 'analytics', 'analytics_groups' table created");
    Ok(())
}

/// Walks every canonical record of one domain and derives its group from the
/// legacy parent chain.
///
/// A record whose stream has no parent, or whose parent group row is gone,
/// is left ungrouped; that is a skip, not an error. Groups are deduplicated
/// by (name, domain, owner) with a lookup before every insert, so re-running
/// the pass against unmodified legacy state creates no second group for the
/// same key. The whole domain runs in one transaction and rolls back on the
/// first store error.
pub fn reconcile(conn: &mut Connection, domain: &str) -> Result<ReconcileOutcome, MigrateError> {
    let tx = conn.transaction()?;
    let mut outcome = ReconcileOutcome::default();

    let records = {
        let mut stmt =
            tx.prepare("SELECT id, stream_id FROM analytics WHERE plugin_name = ?1")?;
        let rows = stmt.query_map([domain], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    for (analytics_id, stream_id) in records {
        let parent_id = match stream_id {
            Some(sid) => legacy_parent_id(&tx, sid)?,
            None => None,
        };
        let Some(parent_id) = parent_id else {
            outcome.skipped += 1;
            continue;
        };

        let Some((name, group_parent_id, client_id)) = legacy_group(&tx, parent_id)? else {
            outcome.skipped += 1;
            continue;
        };

        let group_id = match group_id_for(&tx, &name, domain, client_id)? {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO analytics_groups (name, parent_id, plugin_name, client_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![name, group_parent_id, domain, client_id],
                )?;
                let id = tx.last_insert_rowid();
                outcome.created_groups += 1;
                info!(
                    "hierarchy: group created with id: {id}, name: {name}, \
                     parent id: {group_parent_id}, domain: {domain}, client id: {client_id}"
                );
                id
            }
        };

        tx.execute(
            "UPDATE analytics SET group_id = ?1 WHERE id = ?2",
            params![group_id, analytics_id],
        )?;
        outcome.assigned += 1;
    }

    tx.commit()?;
    Ok(outcome)
}

fn legacy_parent_id(conn: &Connection, stream_id: i64) -> Result<Option<i64>, MigrateError> {
    let parent: Option<Option<i64>> = conn
        .query_row(
            "SELECT parent_id FROM streams WHERE id = ?1",
            [stream_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(parent.flatten())
}

fn legacy_group(
    conn: &Connection,
    group_id: i64,
) -> Result<Option<(String, i64, i64)>, MigrateError> {
    let row = conn
        .query_row(
            "SELECT name, parent_id, client_id FROM stream_groups WHERE id = ?1",
            [group_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    Ok(row)
}

fn group_id_for(
    conn: &Connection,
    name: &str,
    domain: &str,
    client_id: i64,
) -> Result<Option<i64>, MigrateError> {
    let id = conn
        .query_row(
            "SELECT id FROM analytics_groups
             WHERE name = ?1 AND plugin_name = ?2 AND client_id = ?3",
            params![name, domain, client_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}
