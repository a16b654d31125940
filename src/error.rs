use crate::store::StoreError;

/// Engine-level failures. Wire responses use `code()` as the stable
/// error code; messages are free-form.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl StatsError {
    pub fn code(&self) -> &'static str {
        match self {
            StatsError::Forbidden(_) => "forbidden",
            StatsError::NotFound(_) => "not_found",
            StatsError::InvalidScope(_) => "invalid_scope",
            StatsError::BadRequest(_) => "bad_params",
            StatsError::DeadlineExceeded => "deadline_exceeded",
            StatsError::Store(_) => "store_error",
        }
    }
}
