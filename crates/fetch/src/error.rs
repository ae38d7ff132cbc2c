use http::header::{ALLOW, CONTENT_TYPE};
use http::StatusCode;

use common::prelude::ClientError;

use crate::request::Response;

/// Failure kinds surfaced by handlers. Everything a route can go
/// wrong with collapses into one of these before it reaches the
/// caller as a status code and diagnostic body.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("method not supported")]
    MethodNotSupported { allow: Option<&'static str> },
    #[error("request aborted")]
    Aborted,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(msg) => FetchError::NotFound(msg),
            ClientError::InvalidInput(msg) => FetchError::InvalidInput(msg),
            // a block that fails to decode is a caller-visible codec problem
            ClientError::Codec(e) => FetchError::InvalidInput(e.to_string()),
            ClientError::Key(e) => FetchError::Internal(e.into()),
            ClientError::Default(e) => FetchError::Internal(e),
        }
    }
}

impl FetchError {
    pub fn status(&self) -> StatusCode {
        match self {
            FetchError::NotFound(_) => StatusCode::NOT_FOUND,
            FetchError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            FetchError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FetchError::MethodNotSupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
            FetchError::Aborted | FetchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        let response = Response::new(status).with_header(CONTENT_TYPE, "text/plain; charset=utf-8");
        match self {
            FetchError::NotFound(msg) => response.with_body(format!("not found: {}", msg)),
            FetchError::Timeout(msg) => response.with_body(format!("TimeoutError: {}", msg)),
            FetchError::InvalidInput(msg) => response.with_body(format!("invalid input: {}", msg)),
            FetchError::MethodNotSupported { allow } => {
                let response = match allow {
                    Some(allow) => response.with_header(ALLOW, allow),
                    None => response,
                };
                response.with_body("Method Not Supported")
            }
            FetchError::Aborted => response.with_body("request aborted"),
            FetchError::Internal(err) => response.with_body(format!("{:?}", err)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_timeout_body_prefix() {
        let response = FetchError::Timeout("stat".to_string()).into_response();
        assert_eq!(response.status, StatusCode::REQUEST_TIMEOUT);
        let body = response.text().await.unwrap();
        assert!(body.starts_with("TimeoutError:"));
    }

    #[tokio::test]
    async fn test_method_not_supported_carries_allow() {
        let response = FetchError::MethodNotSupported {
            allow: Some("GET, POST"),
        }
        .into_response();
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header("allow"), Some("GET, POST"));
        assert_eq!(response.text().await.unwrap(), "Method Not Supported");
    }

    #[test]
    fn test_client_error_mapping() {
        let err: FetchError = ClientError::NotFound("block".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: FetchError = ClientError::InvalidInput("cid".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
