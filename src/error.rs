use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failure talking to the upstream cricket API. Always recoverable.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network, DNS, TLS or timeout failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Non-2xx status, or a 2xx body flagged `success: 0`.
    #[error("upstream error{}: {message}", .status.map(|s| format!(" {}", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },

    /// Body did not have the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "upstream_transport",
            FetchError::Upstream { .. } => "upstream_error",
            FetchError::Malformed(_) => "upstream_malformed",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Upstream {
                status: Some(status.as_u16()),
                message: e.to_string(),
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Membership and unicast failures in the subscription hub.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("client {0} is not connected")]
    UnknownClient(u64),

    #[error("client {0} outbound buffer is full")]
    Backlogged(u64),
}

/// Errors surfaced by the REST facade.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code; the message text is advisory only.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Fetch(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(FetchError::Transport("x".into()).code(), "upstream_transport");
        assert_eq!(
            FetchError::Upstream { status: Some(500), message: "x".into() }.code(),
            "upstream_error"
        );
        assert_eq!(FetchError::Malformed("x".into()).code(), "upstream_malformed");
        assert_eq!(ApiError::NotFound("x".into()).code(), "not_found");
        assert_eq!(
            ApiError::from(FetchError::Malformed("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_upstream_display_includes_status() {
        let e = FetchError::Upstream { status: Some(503), message: "busy".into() };
        assert_eq!(e.to_string(), "upstream error 503: busy");
        let e = FetchError::Upstream { status: None, message: "Invalid API key".into() };
        assert_eq!(e.to_string(), "upstream error: Invalid API key");
    }
}
