use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProgressionError>;

/// Error kinds surfaced by the progression core. All of these are
/// recoverable at the request boundary; none abort the process.
#[derive(Error, Debug)]
pub enum ProgressionError {
    /// Bad input: out-of-range score, word count below the floor,
    /// importance outside 1..=5, cycle-forming prerequisite edge.
    #[error("validation error: {0}")]
    Validation(String),

    /// An event arrived out of order for the current progress status.
    #[error("sequence error: {0}")]
    Sequence(String),

    /// Unknown user, lecture, or entity.
    #[error("not found: {0}")]
    NotFound(String),

    /// Actor lacks the role or ownership the operation requires.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Store failure (wraps sqlx::Error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Inconsistent stored data, e.g. an unknown status code.
    #[error("internal error: {0}")]
    Internal(String),
}
