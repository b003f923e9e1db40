//! Per-domain migration rules.
//!
//! Every plugin's migration is data: a guard table, plus a list of steps
//! that are either declarative remap descriptors or named custom functions.
//! The runner below is the only piece of control flow; it is exercised once
//! against synthetic rules in the tests and then trusted for every domain.

use crate::blob;
use crate::error::MigrateError;
use crate::probe;
use crate::remap::{self, IdentifierIndex, RemapTable, Strategy};
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

type StepFn = fn(&mut Connection, &IdentifierIndex) -> Result<(), MigrateError>;

pub enum Step {
    Remap(RemapTable),
    Custom { name: &'static str, run: StepFn },
}

pub struct DomainMigration {
    pub domain: &'static str,
    /// Absence of this table means the plugin was never installed; the whole
    /// domain is skipped.
    pub guard_table: &'static str,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainOutcome {
    Completed,
    Skipped,
}

pub fn domain_rules() -> Vec<DomainMigration> {
    vec![
        DomainMigration {
            domain: "alpr",
            guard_table: "alpr_lists",
            steps: vec![
                Step::Remap(
                    RemapTable::new("alpr_lists", Strategy::Transactional)
                        .key_column("id")
                        .id_list_renamed("streams", "analytics_ids"),
                ),
                Step::Remap(
                    RemapTable::new("alpr_speed_rules", Strategy::Transactional)
                        .key_column("id")
                        .scalar_renamed("stream_id1", "analytics_id1")
                        .scalar_renamed("stream_id2", "analytics_id2"),
                ),
                // event-volume table; statement count must stay bounded by
                // the index, not the row count
                Step::Remap(
                    RemapTable::new("alpr_stats_hourly", Strategy::BatchedByEntry)
                        .scalar_renamed("stream_id", "analytics_id"),
                ),
            ],
        },
        DomainMigration {
            domain: "face",
            guard_table: "face_detections",
            steps: vec![
                Step::Remap(
                    RemapTable::new("face_lists", Strategy::Transactional)
                        .key_column("id")
                        .id_list_renamed("streams", "analytics_ids"),
                ),
                Step::Custom {
                    name: "rewrite detection box format",
                    run: rewrite_detection_boxes,
                },
                Step::Custom {
                    name: "backfill detection uuids",
                    run: backfill_detection_uuids,
                },
                Step::Custom {
                    name: "explode expiration settings",
                    run: explode_expiration_settings,
                },
            ],
        },
        DomainMigration {
            domain: "smart_va",
            guard_table: "smart_va_lists",
            steps: vec![
                Step::Remap(
                    RemapTable::new("smart_va_lists", Strategy::Transactional)
                        .key_column("id")
                        .id_list_renamed("streams", "analytics"),
                ),
                Step::Custom {
                    name: "fold presence action types",
                    run: fold_presence_action_types,
                },
            ],
        },
        DomainMigration {
            domain: "traffic",
            guard_table: "stats_traffic_hourly",
            steps: vec![Step::Custom {
                name: "drop deprecated hourly stats",
                run: drop_hourly_stats,
            }],
        },
        DomainMigration {
            domain: "railroad",
            guard_table: "railroad_numbers",
            steps: vec![
                Step::Remap(
                    RemapTable::new("railroad_numbers", Strategy::BatchedByEntry)
                        .scalar_into("stream_id", "analytics_id"),
                ),
                Step::Custom {
                    name: "add zone column",
                    run: add_zone_column,
                },
            ],
        },
        DomainMigration {
            domain: "person_reid",
            guard_table: "smart_tracking_frame_reid",
            steps: vec![Step::Remap(
                RemapTable::new("smart_tracking_frame_reid", Strategy::BatchedByEntry)
                    .scalar_into("stream_id", "analytics_id"),
            )],
        },
    ]
}

pub fn run_domain(
    conn: &mut Connection,
    rule: &DomainMigration,
) -> Result<DomainOutcome, MigrateError> {
    if !probe::table_exists(conn, rule.guard_table)? {
        info!(
            "no '{}' table found, skipping migration for domain {}",
            rule.guard_table, rule.domain
        );
        return Ok(DomainOutcome::Skipped);
    }

    let index = IdentifierIndex::build(conn, rule.domain)?;
    for step in &rule.steps {
        match step {
            Step::Remap(spec) => remap::remap(conn, spec, &index)?,
            Step::Custom { name, run } => {
                run(conn, &index)?;
                info!("domain {}: {name}", rule.domain);
            }
        }
    }
    Ok(DomainOutcome::Completed)
}

/// Fallback written when a detection box blob cannot be decoded.
const DEFAULT_BOX: &str = "[0.1,0.1,0.9,0.9]";

/// Converts binary detection boxes to JSON float arrays. Not wrapped in a
/// transaction: detection counts can exceed any reasonable transaction size,
/// and every write is a plain set, so an interrupted pass re-runs cleanly.
fn rewrite_detection_boxes(
    conn: &mut Connection,
    _index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    if !probe::column_exists(conn, "face_detections", "box_temp")? {
        conn.execute("ALTER TABLE face_detections ADD COLUMN box_temp TEXT", [])?;
    }

    let rows = {
        let mut stmt = conn.prepare("SELECT id, box FROM face_detections")?;
        let mapped = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<Vec<u8>>>(1)?))
        })?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };

    for (id, raw) in rows {
        let json = match raw.as_deref().and_then(blob::decode_f64_array) {
            Some(values) => {
                serde_json::to_string(&values).map_err(|e| MigrateError::Encode(e.to_string()))?
            }
            None => DEFAULT_BOX.to_string(),
        };
        conn.execute(
            "UPDATE face_detections SET box_temp = ?1 WHERE id = ?2",
            params![json, id],
        )?;
    }

    conn.execute("ALTER TABLE face_detections DROP COLUMN box", [])?;
    conn.execute(
        "ALTER TABLE face_detections RENAME COLUMN box_temp TO box",
        [],
    )?;
    info!("format of data in 'box' column of 'face_detections' table is changed");
    Ok(())
}

fn backfill_detection_uuids(
    conn: &mut Connection,
    _index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;
    tx.execute("ALTER TABLE face_detections ADD COLUMN uuid TEXT", [])?;

    let ids = {
        let mut stmt = tx.prepare("SELECT id FROM face_detections")?;
        let mapped = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };
    for id in ids {
        tx.execute(
            "UPDATE face_detections SET uuid = ?1 WHERE id = ?2",
            params![Uuid::new_v4().to_string(), id],
        )?;
    }

    tx.commit()?;
    info!("uuid added to 'face_detections' table");
    Ok(())
}

/// Explodes the `expiration_settings` JSON on face list items into typed
/// columns and indexes the expiration date.
fn explode_expiration_settings(
    conn: &mut Connection,
    _index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "ALTER TABLE face_list_items
             ADD COLUMN expiration_settings_enabled INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE face_list_items
             ADD COLUMN expiration_settings_action TEXT NOT NULL DEFAULT 'none';
         ALTER TABLE face_list_items ADD COLUMN expiration_settings_list_id INTEGER;
         ALTER TABLE face_list_items ADD COLUMN expiration_settings_date INTEGER;
         ALTER TABLE face_list_items ADD COLUMN expiration_settings_events_holder TEXT;",
    )?;

    let rows = {
        let mut stmt = tx.prepare(
            "SELECT id, expiration_settings FROM face_list_items
             WHERE expiration_settings IS NOT NULL",
        )?;
        let mapped =
            stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };

    for (id, raw) in rows {
        let parsed: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            MigrateError::Validation(format!(
                "malformed expiration settings on face list item {id}: {e}"
            ))
        })?;

        let enabled = parsed["enabled"].as_bool().unwrap_or(false);
        let action = parsed["action"].as_str().ok_or_else(|| {
            MigrateError::Validation(format!(
                "expiration settings on face list item {id} have no action"
            ))
        })?;
        let expires_at = parsed["expires_at"].as_i64().unwrap_or(0);
        let list_id = parsed["list_id"].as_i64();
        let events_holder = match &parsed["events_holder"] {
            serde_json::Value::Null => None,
            value => Some(value.to_string()),
        };

        let date = if action == "none" { None } else { Some(expires_at) };
        let list_id = if action == "move" { list_id } else { None };

        tx.execute(
            "UPDATE face_list_items SET
                 expiration_settings = NULL,
                 expiration_settings_enabled = ?1,
                 expiration_settings_action = ?2,
                 expiration_settings_date = ?3,
                 expiration_settings_list_id = ?4,
                 expiration_settings_events_holder = ?5
             WHERE id = ?6",
            params![enabled, action, date, list_id, events_holder, id],
        )?;
    }

    tx.execute(
        "CREATE INDEX idx__face_list_items__expiration_settings_date
         ON face_list_items (expiration_settings_date)",
        [],
    )?;
    tx.commit()?;
    info!("expiration settings of 'face_list_items' table migrated to separate columns");
    Ok(())
}

/// Folds the presence action side table into a column on the notifications
/// table and drops it.
fn fold_presence_action_types(
    conn: &mut Connection,
    _index: &IdentifierIndex,
) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;
    tx.execute(
        "ALTER TABLE smart_va_notifications ADD COLUMN action_type TEXT",
        [],
    )?;
    tx.execute(
        "UPDATE smart_va_notifications SET action_type =
             (SELECT action_type FROM notifications_presence_action_types
              WHERE notification_id = smart_va_notifications.id)",
        [],
    )?;
    tx.execute("DROP TABLE notifications_presence_action_types", [])?;
    tx.commit()?;
    info!(
        "folded 'notifications_presence_action_types' into an action_type column \
         on 'smart_va_notifications'"
    );
    Ok(())
}

fn drop_hourly_stats(conn: &mut Connection, _index: &IdentifierIndex) -> Result<(), MigrateError> {
    conn.execute("DROP TABLE stats_traffic_hourly", [])?;
    info!("dropped deprecated table 'stats_traffic_hourly'");
    Ok(())
}

fn add_zone_column(conn: &mut Connection, _index: &IdentifierIndex) -> Result<(), MigrateError> {
    conn.execute("ALTER TABLE railroad_numbers ADD COLUMN zone TEXT", [])?;
    info!("added zone column to 'railroad_numbers'");
    Ok(())
}
