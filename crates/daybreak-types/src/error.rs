use thiserror::Error;

/// Closed error set for the alarm lifecycle engine. The HTTP boundary maps
/// each variant to a status code; nothing anywhere matches on message text.
///
/// `NotFoundOrForbidden` deliberately covers both "does not exist" and
/// "belongs to someone else" so non-owners cannot probe for existence.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("alarm time must be in the future")]
    InvalidSchedule,

    #[error("alarm not found or access denied")]
    NotFoundOrForbidden,

    #[error("alarm is not active")]
    NotActive,

    #[error("could not process image: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
