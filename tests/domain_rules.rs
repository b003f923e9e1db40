use relift::domains::{domain_rules, run_domain, DomainMigration, DomainOutcome, Step};
use relift::probe;
use relift::remap::{RemapTable, Strategy};
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Canonical-stage output shape: the analytics table already joined to
/// streams through the shared uuid.
fn canonical_fixture() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory store");
    conn.execute_batch(
        "CREATE TABLE streams (
             id INTEGER PRIMARY KEY, uuid TEXT NOT NULL, parent_id INTEGER
         );
         CREATE TABLE analytics (
             id INTEGER PRIMARY KEY, stream_uuid TEXT, plugin_name TEXT NOT NULL
         );",
    )
    .expect("schema");
    conn
}

fn rule(domain: &str) -> DomainMigration {
    domain_rules()
        .into_iter()
        .find(|r| r.domain == domain)
        .expect("rule exists")
}

fn encode_f64_array(values: &[f64]) -> Vec<u8> {
    let mut out = vec![0xAC, 0xED, 0x00, 0x05, 0x75, 0x72, 0x00, 0x02, b'[', b'D'];
    out.extend_from_slice(&[0x3E, 0xA6, 0x8C, 0x14, 0xAB, 0x63, 0x5A, 0x1E]);
    out.push(0x02);
    out.extend_from_slice(&[0x00, 0x00]);
    out.push(0x78);
    out.push(0x70);
    out.extend_from_slice(&(values.len() as i32).to_be_bytes());
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

#[test]
fn absent_guard_table_skips_the_domain() {
    let mut conn = canonical_fixture();
    let outcome = run_domain(&mut conn, &rule("alpr")).expect("run");
    assert_eq!(outcome, DomainOutcome::Skipped);
}

#[test]
fn synthetic_rule_drives_remap_and_custom_steps_in_order() {
    let mut conn = canonical_fixture();
    conn.execute_batch(
        "INSERT INTO streams (id, uuid) VALUES (10, 'u-10');
         INSERT INTO analytics (id, stream_uuid, plugin_name) VALUES (500, 'u-10', 'synth');
         CREATE TABLE synth_rules (id INTEGER PRIMARY KEY, stream_id INTEGER);
         INSERT INTO synth_rules VALUES (1, 10), (2, 30);",
    )
    .expect("fixture");

    fn stamp(conn: &mut Connection, _: &relift::remap::IdentifierIndex) -> Result<(), relift::error::MigrateError> {
        conn.execute("ALTER TABLE synth_rules ADD COLUMN stamped INTEGER", [])?;
        Ok(())
    }

    let rule = DomainMigration {
        domain: "synth",
        guard_table: "synth_rules",
        steps: vec![
            Step::Remap(
                RemapTable::new("synth_rules", Strategy::Transactional)
                    .key_column("id")
                    .scalar_renamed("stream_id", "analytics_id"),
            ),
            Step::Custom {
                name: "stamp",
                run: stamp,
            },
        ],
    };

    let outcome = run_domain(&mut conn, &rule).expect("run");
    assert_eq!(outcome, DomainOutcome::Completed);

    let values: Vec<i64> = {
        let mut stmt = conn
            .prepare("SELECT analytics_id FROM synth_rules ORDER BY id")
            .expect("prepare");
        let rows = stmt.query_map([], |row| row.get(0)).expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("rows")
    };
    assert_eq!(values, vec![500, -1]);
    assert!(probe::column_exists(&conn, "synth_rules", "stamped").expect("probe"));
}

#[test]
fn face_domain_rewrites_boxes_uuids_and_expiration_settings() {
    let mut conn = canonical_fixture();
    conn.execute_batch(
        "CREATE TABLE face_lists (id INTEGER PRIMARY KEY, streams TEXT);
         CREATE TABLE face_list_items (
             id INTEGER PRIMARY KEY, expiration_settings TEXT
         );
         CREATE TABLE face_detections (id INTEGER PRIMARY KEY, box BLOB);
         INSERT INTO face_lists VALUES (1, '[10, 77]');
         INSERT INTO face_list_items VALUES
             (1, '{\"enabled\": true, \"action\": \"move\", \"expires_at\": 1700000000000,
                   \"list_id\": 4, \"events_holder\": {\"kept\": 1}}'),
             (2, '{\"enabled\": false, \"action\": \"none\"}'),
             (3, NULL);
         INSERT INTO streams (id, uuid) VALUES (10, 'u-10');
         INSERT INTO analytics (id, stream_uuid, plugin_name) VALUES (600, 'u-10', 'face');",
    )
    .expect("fixture");

    conn.execute(
        "INSERT INTO face_detections (id, box) VALUES (1, ?1), (2, NULL), (3, x'0102')",
        [encode_f64_array(&[0.2, 0.3, 0.8, 0.9])],
    )
    .expect("blobs");

    let outcome = run_domain(&mut conn, &rule("face")).expect("run");
    assert_eq!(outcome, DomainOutcome::Completed);

    let lists: String = conn
        .query_row("SELECT analytics_ids FROM face_lists WHERE id = 1", [], |r| r.get(0))
        .expect("lists");
    assert_eq!(lists, "[600]");

    let boxes: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT box FROM face_detections ORDER BY id")
            .expect("prepare");
        let rows = stmt.query_map([], |row| row.get(0)).expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("rows")
    };
    assert_eq!(boxes[0], "[0.2,0.3,0.8,0.9]");
    // undecodable blobs fall back to the fixed default box
    assert_eq!(boxes[1], "[0.1,0.1,0.9,0.9]");
    assert_eq!(boxes[2], "[0.1,0.1,0.9,0.9]");

    let uuids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT uuid FROM face_detections")
            .expect("prepare");
        let rows = stmt.query_map([], |row| row.get(0)).expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("rows")
    };
    assert_eq!(uuids.len(), 3);
    assert_eq!(uuids.iter().collect::<BTreeSet<_>>().len(), 3);

    let exploded = conn
        .query_row(
            "SELECT expiration_settings, expiration_settings_enabled,
                    expiration_settings_action, expiration_settings_date,
                    expiration_settings_list_id, expiration_settings_events_holder
             FROM face_list_items WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .expect("row");
    assert_eq!(
        exploded,
        (
            None,
            true,
            "move".to_string(),
            Some(1_700_000_000_000),
            Some(4),
            Some("{\"kept\":1}".to_string()),
        )
    );

    let none_action = conn
        .query_row(
            "SELECT expiration_settings_action, expiration_settings_date,
                    expiration_settings_list_id
             FROM face_list_items WHERE id = 2",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )
        .expect("row");
    assert_eq!(none_action, ("none".to_string(), None, None));
}

#[test]
fn smart_va_domain_folds_presence_action_types() {
    let mut conn = canonical_fixture();
    conn.execute_batch(
        "CREATE TABLE smart_va_lists (id INTEGER PRIMARY KEY, streams TEXT);
         CREATE TABLE smart_va_notifications (id INTEGER PRIMARY KEY);
         CREATE TABLE notifications_presence_action_types (
             notification_id INTEGER, action_type TEXT
         );
         INSERT INTO smart_va_lists VALUES (1, '[10]');
         INSERT INTO smart_va_notifications VALUES (1), (2);
         INSERT INTO notifications_presence_action_types VALUES (1, 'enter');
         INSERT INTO streams (id, uuid) VALUES (10, 'u-10');
         INSERT INTO analytics (id, stream_uuid, plugin_name) VALUES (700, 'u-10', 'smart_va');",
    )
    .expect("fixture");

    run_domain(&mut conn, &rule("smart_va")).expect("run");

    let lists: String = conn
        .query_row("SELECT analytics FROM smart_va_lists WHERE id = 1", [], |r| r.get(0))
        .expect("lists");
    assert_eq!(lists, "[700]");

    let actions: Vec<Option<String>> = {
        let mut stmt = conn
            .prepare("SELECT action_type FROM smart_va_notifications ORDER BY id")
            .expect("prepare");
        let rows = stmt.query_map([], |row| row.get(0)).expect("query");
        rows.collect::<Result<Vec<_>, _>>().expect("rows")
    };
    assert_eq!(actions, vec![Some("enter".into()), None]);
    assert!(!probe::table_exists(&conn, "notifications_presence_action_types").expect("probe"));
}

#[test]
fn traffic_domain_drops_the_deprecated_stats_table() {
    let mut conn = canonical_fixture();
    conn.execute_batch("CREATE TABLE stats_traffic_hourly (stream_id INTEGER)")
        .expect("fixture");

    run_domain(&mut conn, &rule("traffic")).expect("run");
    assert!(!probe::table_exists(&conn, "stats_traffic_hourly").expect("probe"));
}

#[test]
fn railroad_domain_adds_canonical_ids_and_zone() {
    let mut conn = canonical_fixture();
    conn.execute_batch(
        "CREATE TABLE railroad_numbers (id INTEGER PRIMARY KEY, stream_id INTEGER);
         INSERT INTO railroad_numbers VALUES (1, 10), (2, 55);
         INSERT INTO streams (id, uuid) VALUES (10, 'u-10');
         INSERT INTO analytics (id, stream_uuid, plugin_name) VALUES (800, 'u-10', 'railroad');",
    )
    .expect("fixture");

    run_domain(&mut conn, &rule("railroad")).expect("run");

    let rows: Vec<(i64, i64)> = {
        let mut stmt = conn
            .prepare("SELECT stream_id, analytics_id FROM railroad_numbers ORDER BY id")
            .expect("prepare");
        let mapped = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query");
        mapped.collect::<Result<Vec<_>, _>>().expect("rows")
    };
    assert_eq!(rows, vec![(10, 800), (55, -1)]);
    assert!(probe::column_exists(&conn, "railroad_numbers", "zone").expect("probe"));
}
