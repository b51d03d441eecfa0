//! Remote call error taxonomy.
//!
//! The split that matters to the engine is transient vs rejection:
//! transient failures (transport, 5xx, undecodable payloads) are absorbed
//! by falling back to the mirror, while rejections (the server understood
//! the request and said no) must reach the caller verbatim and must never
//! be queued for blind retry.

use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response: connection refused,
    /// DNS failure, timeout.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a 5xx (or a retryable 4xx like 408/429).
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Validation or business-rule rejection (4xx with a reason body),
    /// e.g. the activity weight-sum rule.
    #[error("rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response arrived but its body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }

    /// Retrying later may succeed without changing the payload.
    pub fn is_transient(&self) -> bool {
        !self.is_rejection()
    }

    /// True when the failure says nothing reached the backend at all,
    /// which is the signal the connectivity monitor cares about.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
