use crate::error::MigrateError;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// Immutable legacy-id to canonical-id lookup for one domain.
///
/// Several analytics rows can exist for a single stream; the build orders by
/// stream id then analytics id and keeps the first match, so a duplicated
/// legacy id always resolves to the lowest canonical id and repeated builds
/// of an unmodified dataset agree.
///
/// Must be built after the canonical stage has replaced `stream_id` with
/// `stream_uuid` in the `analytics` table: the join runs on the shared uuid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierIndex {
    domain: String,
    map: BTreeMap<i64, i64>,
}

impl IdentifierIndex {
    pub fn build(conn: &Connection, domain: &str) -> Result<Self, MigrateError> {
        let mut stmt = conn.prepare(
            "SELECT streams.id, analytics.id FROM streams
             INNER JOIN analytics ON streams.uuid = analytics.stream_uuid
             WHERE analytics.plugin_name = ?1
             ORDER BY streams.id ASC, analytics.id ASC",
        )?;
        let rows = stmt.query_map([domain], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?))
        })?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (legacy, canonical) = row?;
            let Some(canonical) = canonical else { continue };
            map.entry(legacy).or_insert(canonical);
        }

        Ok(Self {
            domain: domain.to_string(),
            map,
        })
    }

    /// Builds an index from literal entries; used by tests and synthetic rules.
    pub fn from_entries(
        domain: impl Into<String>,
        entries: impl IntoIterator<Item = (i64, i64)>,
    ) -> Self {
        Self {
            domain: domain.into(),
            map: entries.into_iter().collect(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn get(&self, legacy: i64) -> Option<i64> {
        self.map.get(&legacy).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries in ascending legacy-id order.
    pub fn entries(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.map.iter().map(|(l, c)| (*l, *c))
    }

    pub fn legacy_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.map.keys().copied()
    }

    pub fn canonical_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.map.values().copied()
    }
}
