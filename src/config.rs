use crate::error::MigrateError;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for a migration run.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub db_path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("analytics.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    db: DbSection,
}

#[derive(Debug, Deserialize)]
struct DbSection {
    #[serde(rename = "type")]
    db_type: String,
    path: String,
}

impl MigrateConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Loads the operator-provided `config.json` with a `db` section.
    pub fn from_file(path: &Path) -> Result<Self, MigrateError> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: ConfigFile =
            serde_json::from_str(&raw).map_err(|e| MigrateError::Decode(e.to_string()))?;
        if parsed.db.db_type != "sqlite" {
            return Err(MigrateError::InvalidConfig {
                message: format!("unsupported database type: {}", parsed.db.db_type),
            });
        }
        Ok(Self::new(parsed.db.path))
    }

    pub fn open(&self) -> Result<Connection, MigrateError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))?;
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::MigrateConfig;
    use crate::error::MigrateErrorCode;
    use std::io::Write;

    #[test]
    fn config_file_round_trips_db_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).expect("create");
        write!(
            file,
            r#"{{"db": {{"type": "sqlite", "path": "/var/lib/analytics.db"}}}}"#
        )
        .expect("write");

        let config = MigrateConfig::from_file(&path).expect("load");
        assert_eq!(config.db_path, std::path::Path::new("/var/lib/analytics.db"));
    }

    #[test]
    fn unsupported_store_type_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).expect("create");
        write!(
            file,
            r#"{{"db": {{"type": "mysql", "path": "ignored"}}}}"#
        )
        .expect("write");

        let err = MigrateConfig::from_file(&path).expect_err("must reject");
        assert_eq!(err.code(), MigrateErrorCode::InvalidConfig);
    }
}
