use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// Post-decision state corruption (e.g. the email lookup failing after
    /// delivery was already decided). Always surfaced, never swallowed.
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("database error: {0}")]
    Database(#[from] stride_db::DbError),
}
