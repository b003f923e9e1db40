use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateErrorCode {
    Io,
    Store,
    Encode,
    Decode,
    Validation,
    InvalidConfig,
    Constraint,
}

impl MigrateErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrateErrorCode::Io => "io",
            MigrateErrorCode::Store => "store",
            MigrateErrorCode::Encode => "encode",
            MigrateErrorCode::Decode => "decode",
            MigrateErrorCode::Validation => "validation",
            MigrateErrorCode::InvalidConfig => "invalid_config",
            MigrateErrorCode::Constraint => "constraint",
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(rusqlite::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("constraint violation: {0}")]
    Constraint(String),
}

impl MigrateError {
    pub fn code(&self) -> MigrateErrorCode {
        match self {
            MigrateError::Io(_) => MigrateErrorCode::Io,
            MigrateError::Store(_) => MigrateErrorCode::Store,
            MigrateError::Encode(_) => MigrateErrorCode::Encode,
            MigrateError::Decode(_) => MigrateErrorCode::Decode,
            MigrateError::Validation(_) => MigrateErrorCode::Validation,
            MigrateError::InvalidConfig { .. } => MigrateErrorCode::InvalidConfig,
            MigrateError::Constraint(_) => MigrateErrorCode::Constraint,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

impl From<rusqlite::Error> for MigrateError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(e, detail)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                MigrateError::Constraint(detail.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => MigrateError::Store(value),
        }
    }
}
