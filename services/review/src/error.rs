use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewError>;

/// Errors surfaced by the review engine
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("datastore unavailable: {0}")]
    DatastoreUnavailable(#[from] sqlx::Error),

    #[error("asset not found: {0}")]
    AssetResolutionFailed(String),

    /// Normal end of a review session, not a failure
    ///
    /// The engine reports exhaustion with the placeholder view; this variant
    /// only gives callers a status and code to map it to (204 over HTTP).
    #[error("no more images in this session")]
    SessionExhausted,

    #[error("invalid filter criteria: {0}")]
    InvalidFilterCriteria(String),

    #[error("malformed decision payload: {0}")]
    MalformedDecisionPayload(String),
}

impl ReviewError {
    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ReviewError::DatastoreUnavailable(_) => "DATASTORE_UNAVAILABLE",
            ReviewError::AssetResolutionFailed(_) => "ASSET_NOT_FOUND",
            ReviewError::SessionExhausted => "SESSION_EXHAUSTED",
            ReviewError::InvalidFilterCriteria(_) => "INVALID_FILTER",
            ReviewError::MalformedDecisionPayload(_) => "MALFORMED_DECISION",
        }
    }

    /// Whether the error was raised by input validation, before any datastore access
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReviewError::InvalidFilterCriteria(_) | ReviewError::MalformedDecisionPayload(_)
        )
    }
}
