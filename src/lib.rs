//! One-shot, in-place upgrade of the analytics database between releases.
//!
//! Legacy per-stream identifiers are replaced everywhere by canonical
//! analytics identifiers, grouping is rebuilt from the legacy parent chain,
//! and dependent tables are rewritten under either a transactional or a
//! batched-by-mapping-entry strategy depending on their size. A run is
//! strictly sequential and either completes or raises a fatal error;
//! re-running after a crash converges because every rewrite is an
//! idempotent set.

pub mod blob;
pub mod canonical;
pub mod config;
pub mod domains;
pub mod error;
pub mod platform;
pub mod probe;
pub mod remap;
pub mod settings;

use crate::config::MigrateConfig;
use crate::domains::DomainOutcome;
use crate::error::MigrateError;
use rusqlite::Connection;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed { stage: String },
    Skipped { stage: String, reason: String },
}

impl StageOutcome {
    pub fn stage(&self) -> &str {
        match self {
            StageOutcome::Completed { stage } | StageOutcome::Skipped { stage, .. } => stage,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub stages: Vec<StageOutcome>,
}

impl RunReport {
    pub fn skipped(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages
            .iter()
            .filter(|s| matches!(s, StageOutcome::Skipped { .. }))
    }
}

pub fn run(config: &MigrateConfig) -> Result<RunReport, MigrateError> {
    let mut conn = config.open()?;
    run_with_connection(&mut conn)
}

/// Executes every stage in fixed order against an open store connection.
pub fn run_with_connection(conn: &mut Connection) -> Result<RunReport, MigrateError> {
    let mut report = RunReport::default();

    run_stage(&mut report, conn, "system settings", |conn| {
        platform::split_system_settings(conn)?;
        Ok(None)
    })?;

    run_stage(&mut report, conn, "canonical records", |conn| {
        canonical::migrate_canonical(conn)?;
        Ok(None)
    })?;

    run_stage(&mut report, conn, "user roles", |conn| {
        platform::widen_user_roles(conn)?;
        Ok(None)
    })?;

    for rule in domains::domain_rules() {
        let stage = format!("domain {}", rule.domain);
        run_stage(&mut report, conn, &stage, |conn| {
            match domains::run_domain(conn, &rule)? {
                DomainOutcome::Completed => Ok(None),
                DomainOutcome::Skipped => Ok(Some(format!(
                    "legacy table '{}' is absent",
                    rule.guard_table
                ))),
            }
        })?;
    }

    run_stage(&mut report, conn, "legacy changelog", |conn| {
        if platform::drop_legacy_changelog(conn)? {
            Ok(None)
        } else {
            Ok(Some("no changelog table present".into()))
        }
    })?;

    info!("migration completed successfully");
    Ok(report)
}

/// Wraps one stage with start/outcome logging. A `Some(reason)` return marks
/// a skip; errors propagate unchanged to the top-level run.
fn run_stage<F>(
    report: &mut RunReport,
    conn: &mut Connection,
    stage: &str,
    body: F,
) -> Result<(), MigrateError>
where
    F: FnOnce(&mut Connection) -> Result<Option<String>, MigrateError>,
{
    info!("starting migration for {stage}");
    match body(conn) {
        Ok(None) => {
            info!("migration for {stage} completed successfully");
            report.stages.push(StageOutcome::Completed {
                stage: stage.to_string(),
            });
            Ok(())
        }
        Ok(Some(reason)) => {
            info!("migration for {stage} skipped: {reason}");
            report.stages.push(StageOutcome::Skipped {
                stage: stage.to_string(),
                reason,
            });
            Ok(())
        }
        Err(e) => {
            error!("migration for {stage} failed: {e}");
            Err(e)
        }
    }
}
