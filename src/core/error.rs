use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Source '{name}' not found (looked for {tried})")]
    SourceNotFound { name: String, tried: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Migration log not found: {0}")]
    MigrationLogNotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, MigrateError>;

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

