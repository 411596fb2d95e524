use thiserror::Error;

/// Failure of a single payment-processor call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("processor error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Worth repeating the same call after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
