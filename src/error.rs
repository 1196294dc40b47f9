use thiserror::Error;

/// Every failure the sync loop can hit. All of them are fatal: the process
/// exits and relies on an external supervisor plus cursor recovery to resume.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl SyncError {
    pub fn persistence(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        SyncError::Persistence(format!("{}: {}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
