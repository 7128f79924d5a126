use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Database(_) => "database",
            SyncError::Rpc(_) => "rpc",
            SyncError::Decode(_) => "decode",
            SyncError::NotFound(_) => "not_found",
            SyncError::Checkpoint(_) => "checkpoint",
            SyncError::Config(_) => "config",
        }
    }

    /// Transport failures abort the whole sync cycle; everything else is
    /// scoped to the event that raised it.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Rpc(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
