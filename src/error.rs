use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("match not found: {0}")]
    MatchNotFound(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Predictions are frozen once their match has a result.
    #[error("match {0} is completed; predictions are locked")]
    PredictionLocked(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend refused the batch. Nothing from it was applied.
    #[error("commit rejected: {0}")]
    CommitRejected(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// A rejected commit left stored state untouched, so the whole pass can be rerun.
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, EngineError::CommitRejected(_))
    }
}
