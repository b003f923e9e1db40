use crate::error::MigrateError;
use crate::probe;
use crate::remap::index::IdentifierIndex;
use crate::remap::{ColumnShape, RefColumn, RemapTable, Strategy, WriteMode};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::info;

/// Sentinel written when a legacy reference has no canonical counterpart, so
/// orphaned references stay detectable instead of surviving as stale ids or
/// turning into NULLs.
pub const UNRESOLVED_REF: i64 = -1;

/// Applies a built index to one dependent table.
///
/// The column rename (for in-place columns) is always the final step, so a
/// reader observing mid-migration state never sees a renamed column holding
/// legacy values.
pub fn remap(
    conn: &mut Connection,
    spec: &RemapTable,
    index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    spec.validate()?;
    match spec.strategy {
        Strategy::Transactional => remap_transactional(conn, spec, index)?,
        Strategy::BatchedByEntry => remap_batched(conn, spec, index)?,
    }
    info!(
        "remap: rewrote legacy references in '{}' for domain {}",
        spec.table,
        index.domain()
    );
    Ok(())
}

fn remap_transactional(
    conn: &mut Connection,
    spec: &RemapTable,
    index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    let key = spec.key_column.as_deref().ok_or_else(|| {
        MigrateError::Validation(format!(
            "transactional remap of '{}' requires a key column",
            spec.table
        ))
    })?;

    let tx = conn.transaction()?;

    for column in &spec.columns {
        add_target_column(&tx, &spec.table, column)?;
    }

    let source_list = spec
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let select_sql = format!("SELECT {key}, {source_list} FROM {}", spec.table);

    let rows = {
        let mut stmt = tx.prepare(&select_sql)?;
        let mapped = stmt.query_map([], |row| {
            let key_value: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(spec.columns.len());
            for idx in 0..spec.columns.len() {
                values.push(row.get::<_, Value>(idx + 1)?);
            }
            Ok((key_value, values))
        })?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };

    let set_list = spec
        .columns
        .iter()
        .map(|c| format!("{} = ?", c.target()))
        .collect::<Vec<_>>()
        .join(", ");
    let update_sql = format!(
        "UPDATE {} SET {set_list} WHERE {key} = ?{}",
        spec.table,
        spec.columns.len() + 1
    );

    for (key_value, old_values) in rows {
        let mut params: Vec<Value> = Vec::with_capacity(spec.columns.len() + 1);
        for (column, old) in spec.columns.iter().zip(old_values) {
            params.push(rewrite_value(column, old, index)?);
        }
        params.push(Value::Integer(key_value));
        tx.execute(&update_sql, rusqlite::params_from_iter(params))?;
    }

    for column in &spec.columns {
        if let WriteMode::InPlaceRenamed { new_name } = &column.write {
            tx.execute(
                &format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {new_name}",
                    spec.table, column.name
                ),
                [],
            )?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Computes the replacement value for one cell.
///
/// Scalar: resolved canonical id, or the sentinel when the reference (NULL
/// included) has no mapping. Id list: every element mapped, unresolved
/// elements dropped, order and duplicates preserved; a NULL list stays NULL.
fn rewrite_value(
    column: &RefColumn,
    old: Value,
    index: &IdentifierIndex,
) -> Result<Value, MigrateError> {
    match column.shape {
        ColumnShape::Scalar => {
            let resolved = match old {
                Value::Integer(legacy) => index.get(legacy).unwrap_or(UNRESOLVED_REF),
                Value::Null => UNRESOLVED_REF,
                other => {
                    return Err(MigrateError::Validation(format!(
                        "column '{}' holds a non-integer reference: {other:?}",
                        column.name
                    )))
                }
            };
            Ok(Value::Integer(resolved))
        }
        ColumnShape::IdList => match old {
            Value::Text(raw) => Ok(Value::Text(rewrite_id_list(column, &raw, index)?)),
            Value::Null => Ok(Value::Null),
            other => Err(MigrateError::Validation(format!(
                "column '{}' holds a non-text id list: {other:?}",
                column.name
            ))),
        },
    }
}

fn rewrite_id_list(
    column: &RefColumn,
    raw: &str,
    index: &IdentifierIndex,
) -> Result<String, MigrateError> {
    let legacy_ids: Vec<i64> = serde_json::from_str(raw).map_err(|e| {
        MigrateError::Validation(format!(
            "malformed id list in column '{}': {e}",
            column.name
        ))
    })?;
    let canonical_ids: Vec<i64> = legacy_ids
        .into_iter()
        .filter_map(|id| index.get(id))
        .collect();
    serde_json::to_string(&canonical_ids).map_err(|e| MigrateError::Encode(e.to_string()))
}

fn remap_batched(
    conn: &mut Connection,
    spec: &RemapTable,
    index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    for column in &spec.columns {
        if matches!(column.write, WriteMode::NewColumn { .. })
            && !probe::column_exists(conn, &spec.table, column.target())?
        {
            add_target_column(conn, &spec.table, column)?;
        }

        let orphans = match &column.write {
            WriteMode::InPlaceRenamed { .. } => orphan_values(conn, spec, column, index)?,
            WriteMode::NewColumn { .. } => Vec::new(),
        };

        for statement in batched_statements(spec, column, index, &orphans) {
            conn.execute(&statement, [])?;
        }

        if let WriteMode::InPlaceRenamed { new_name } = &column.write {
            conn.execute(
                &format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {new_name}",
                    spec.table, column.name
                ),
                [],
            )?;
        }
    }
    Ok(())
}

/// Distinct in-place values with no mapping: neither a known legacy id nor
/// an already-written canonical id (the sentinel is also excluded).
/// Snapshotting them before the per-entry updates keeps the sweep from
/// clobbering freshly written canonical values and lets a crashed pass
/// re-run safely.
fn orphan_values(
    conn: &Connection,
    spec: &RemapTable,
    column: &RefColumn,
    index: &IdentifierIndex,
) -> Result<Vec<i64>, MigrateError> {
    let known: BTreeSet<i64> = index
        .legacy_ids()
        .chain(index.canonical_ids())
        .chain(std::iter::once(UNRESOLVED_REF))
        .collect();

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {} FROM {} WHERE {} IS NOT NULL",
        column.name, spec.table, column.name
    ))?;
    let values = stmt.query_map([], |row| row.get::<_, i64>(0))?;

    let mut orphans = Vec::new();
    for value in values {
        let value = value?;
        if !known.contains(&value) {
            orphans.push(value);
        }
    }
    orphans.sort_unstable();
    Ok(orphans)
}

/// The bulk UPDATE texts for one column: one per index entry in ascending
/// legacy-id order, then a single sentinel sweep. Never more than
/// `index.len() + 1` statements, regardless of row count.
fn batched_statements(
    spec: &RemapTable,
    column: &RefColumn,
    index: &IdentifierIndex,
    orphans: &[i64],
) -> Vec<String> {
    let target = column.target();
    let mut statements = Vec::with_capacity(index.len() + 1);

    for (legacy, canonical) in index.entries() {
        statements.push(format!(
            "UPDATE {} SET {target} = {canonical} WHERE {} = {legacy}",
            spec.table, column.name
        ));
    }

    match &column.write {
        WriteMode::InPlaceRenamed { .. } => {
            if !orphans.is_empty() {
                let list = join_ids(orphans.iter().copied());
                statements.push(format!(
                    "UPDATE {} SET {target} = {UNRESOLVED_REF} WHERE {target} IN ({list})",
                    spec.table
                ));
            }
        }
        WriteMode::NewColumn { .. } => {
            let sweep = if index.is_empty() {
                format!("UPDATE {} SET {target} = {UNRESOLVED_REF}", spec.table)
            } else {
                let list = join_ids(index.legacy_ids());
                format!(
                    "UPDATE {} SET {target} = {UNRESOLVED_REF} WHERE {} NOT IN ({list})",
                    spec.table, column.name
                )
            };
            statements.push(sweep);
        }
    }

    statements
}

fn add_target_column(
    conn: &Connection,
    table: &str,
    column: &RefColumn,
) -> Result<(), MigrateError> {
    if let WriteMode::NewColumn { name } = &column.write {
        conn.execute(
            &format!(
                "ALTER TABLE {table} ADD COLUMN {name} {}",
                column.shape.sql_type()
            ),
            [],
        )?;
    }
    Ok(())
}

fn join_ids(ids: impl Iterator<Item = i64>) -> String {
    ids.map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
