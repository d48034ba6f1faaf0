//! Error types for the seed pipeline
//!
//! Table-scoped and row-scoped failures are carried as [`SeedError`] values and
//! recorded in summaries; only step-level failures escalate as `anyhow` errors.

use thiserror::Error;

/// PostgreSQL truncates identifiers beyond `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Result type alias for seed operations
pub type Result<T> = std::result::Result<T, SeedError>;

#[derive(Error, Debug)]
pub enum SeedError {
    /// A generated table or column name does not fit PostgreSQL's identifier limit
    #[error("Identifier too long ({len} > {max} bytes): {name}. Shorten the source file name or manifest table_name.", max = MAX_IDENTIFIER_LEN)]
    IdentifierTooLong { name: String, len: usize },

    /// An identifier contains characters outside the allowed set
    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    /// Column-mapping or value-override configuration is invalid
    #[error("Column mapping error: {0}")]
    Registry(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),
}

impl SeedError {
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when PostgreSQL aborted the statement to break a lock cycle or
    /// lock wait; the same work can succeed once the other side commits
    pub fn is_lock_conflict(&self) -> bool {
        match self {
            SeedError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40P01" | "40001" | "55P03"))
            },
            _ => false,
        }
    }

    /// True for errors caused by configuration rather than data or infrastructure
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SeedError::IdentifierTooLong { .. }
                | SeedError::InvalidIdentifier(_)
                | SeedError::Registry(_)
                | SeedError::Manifest(_)
                | SeedError::Config(_)
        )
    }
}
