//! Fetch & rewrite service.

use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::util::http::json_error;

pub mod fetch;
pub mod rewrite;

pub use fetch::{PageFetcher, TargetDocument};
pub use rewrite::rewrite_document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    MissingUrl,
    InvalidUrl(String),
    UnsupportedContentType(String),
    Timeout,
    Unreachable(String),
    UpstreamStatus { status: u16, reason: String },
    BodyTooLarge { limit: u64 },
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl | ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Unreachable(_) | ProxyError::BodyTooLarge { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::MissingUrl => write!(f, "Missing URL parameter"),
            ProxyError::InvalidUrl(detail) => write!(f, "Invalid URL: {detail}"),
            ProxyError::UnsupportedContentType(content_type) => write!(
                f,
                "Unsupported content type: {content_type}. Please provide a URL to a web page."
            ),
            ProxyError::Timeout => write!(f, "Request timed out. The target site is too slow."),
            ProxyError::Unreachable(_) => {
                write!(f, "Bad Gateway: No response from target site.")
            }
            ProxyError::UpstreamStatus { status, reason } => {
                write!(f, "Target site returned error: {status} {reason}")
            }
            ProxyError::BodyTooLarge { limit } => {
                write!(f, "Target page exceeds the {limit} byte limit.")
            }
            ProxyError::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        json_error(self.status(), self.to_string())
    }
}
