//! Canonical-space stage: runs before any domain migration.
//!
//! Order matters here. Group reconciliation reads `analytics.stream_id`, so
//! it runs first; the stream reference swap then replaces that column with
//! `stream_uuid`, which is the join key every [`crate::remap::IdentifierIndex`]
//! build relies on afterwards.

use crate::error::MigrateError;
use crate::remap::hierarchy;
use crate::settings;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::info;

pub fn migrate_canonical(conn: &mut Connection) -> Result<(), MigrateError> {
    hierarchy::prepare_group_schema(conn)?;
    for domain in domain_tags(conn)? {
        let outcome = hierarchy::reconcile(conn, &domain)?;
        info!(
            "canonical: domain {domain} groups reconciled \
             (assigned: {}, created: {}, ungrouped: {})",
            outcome.assigned, outcome.created_groups, outcome.skipped
        );
    }

    swap_stream_reference(conn)?;
    repair_modules(conn)?;
    Ok(())
}

/// Distinct domain tags present in the canonical table, in stable order.
pub fn domain_tags(conn: &Connection) -> Result<Vec<String>, MigrateError> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT plugin_name FROM analytics ORDER BY plugin_name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }
    Ok(tags)
}

/// Replaces the legacy integer stream reference with the stable stream uuid.
fn swap_stream_reference(conn: &mut Connection) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;
    tx.execute("ALTER TABLE analytics ADD COLUMN stream_uuid TEXT", [])?;
    tx.execute(
        "UPDATE analytics SET stream_uuid =
             (SELECT uuid FROM streams WHERE streams.id = analytics.stream_id)",
        [],
    )?;
    tx.execute("ALTER TABLE analytics DROP COLUMN stream_id", [])?;
    tx.commit()?;
    info!("canonical: stream_id column replaced with stream_uuid in 'analytics' table");
    Ok(())
}

/// Rewrites each governed domain's module settings through the pure reshape,
/// updating only rows whose JSON actually changed. One transaction per
/// domain group, matching the reconcile granularity.
fn repair_modules(conn: &mut Connection) -> Result<(), MigrateError> {
    let groups: [&[&str]; 3] = [
        &[settings::PLATE_DOMAIN],
        settings::SAFETY_DOMAINS,
        settings::DETECTOR_DOMAINS,
    ];
    for domains in groups {
        repair_module_group(conn, domains)?;
    }
    Ok(())
}

fn repair_module_group(conn: &mut Connection, domains: &[&str]) -> Result<(), MigrateError> {
    let placeholders = (1..=domains.len())
        .map(|n| format!("?{n}"))
        .collect::<Vec<_>>()
        .join(", ");

    let tx = conn.transaction()?;
    let rows = {
        let mut stmt = tx.prepare(&format!(
            "SELECT id, plugin_name, module FROM analytics
             WHERE plugin_name IN ({placeholders}) AND module IS NOT NULL"
        ))?;
        let mapped = stmt.query_map(rusqlite::params_from_iter(domains), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };

    let mut updated = 0usize;
    for (id, domain, raw) in rows {
        let module: Value = serde_json::from_str(&raw).map_err(|e| {
            MigrateError::Validation(format!("malformed module JSON on analytics {id}: {e}"))
        })?;
        let reshaped = settings::reshape(&domain, &module)?;
        if reshaped == module {
            continue;
        }
        let encoded =
            serde_json::to_string(&reshaped).map_err(|e| MigrateError::Encode(e.to_string()))?;
        tx.execute(
            "UPDATE analytics SET module = ?1 WHERE id = ?2",
            params![encoded, id],
        )?;
        info!("canonical: updated module settings for analytics with id: {id}");
        updated += 1;
    }
    tx.commit()?;

    if updated > 0 {
        info!(
            "canonical: repaired {updated} module settings for domains [{}]",
            domains.join(", ")
        );
    }
    Ok(())
}
