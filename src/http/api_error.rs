use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::auth::AuthError;
use crate::core::spreadsheet::AppendError;

/// Error returned by HTTP handlers. Rendered as a JSON payload naming the
/// error kind plus any upstream status and body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Append(#[from] AppendError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

/// Upstream bodies are passed through as JSON when they parse, otherwise as text.
fn upstream_details(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<u16>, Option<Value>) {
        match self {
            ApiError::Auth(e) => auth_parts(e),
            ApiError::Append(AppendError::Auth(e)) => auth_parts(e),
            ApiError::Append(AppendError::RangeLookupFailed { status, details }) => (
                StatusCode::BAD_GATEWAY,
                "RangeLookupFailed",
                Some(*status),
                Some(upstream_details(details)),
            ),
            ApiError::Append(AppendError::WriteFailed { status, body }) => (
                StatusCode::BAD_GATEWAY,
                "WriteFailed",
                Some(*status),
                Some(upstream_details(body)),
            ),
            ApiError::Append(AppendError::ReadFailed { status, body }) => (
                StatusCode::BAD_GATEWAY,
                "ReadFailed",
                Some(*status),
                Some(upstream_details(body)),
            ),
            ApiError::Append(AppendError::InvalidRow) => {
                (StatusCode::BAD_REQUEST, "InvalidRow", None, None)
            }
            ApiError::Append(AppendError::Transport(_)) => {
                (StatusCode::BAD_GATEWAY, "WorkbookUnreachable", None, None)
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest", None, None),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal", None, None),
        }
    }
}

fn auth_parts(e: &AuthError) -> (StatusCode, &'static str, Option<u16>, Option<Value>) {
    match e {
        AuthError::AuthorizationMissing => {
            (StatusCode::BAD_REQUEST, "AuthorizationMissing", None, None)
        }
        AuthError::TokenExchangeFailed { status, body } => (
            StatusCode::BAD_GATEWAY,
            "TokenExchangeFailed",
            Some(*status),
            Some(upstream_details(body)),
        ),
        AuthError::TokenCacheMissing => (StatusCode::UNAUTHORIZED, "TokenCacheMissing", None, None),
        AuthError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TokenStoreError", None, None),
        AuthError::Transport(_) => (StatusCode::BAD_GATEWAY, "TokenEndpointUnreachable", None, None),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, upstream_status, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(kind, "Request failed: {}", self);
        }

        let mut payload = json!({
            "error": kind,
            "message": self.to_string(),
        });
        if let Some(upstream_status) = upstream_status {
            payload["status"] = json!(upstream_status);
        }
        if let Some(details) = details {
            payload["details"] = details;
        }

        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_json_bodies_are_embedded() {
        let err = ApiError::from(AppendError::RangeLookupFailed {
            status: 404,
            details: r#"{"error":{"code":"ItemNotFound"}}"#.to_string(),
        });

        let (status, kind, upstream, details) = err.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(kind, "RangeLookupFailed");
        assert_eq!(upstream, Some(404));
        assert_eq!(details.unwrap()["error"]["code"], "ItemNotFound");
    }

    #[test]
    fn auth_errors_keep_their_kind_through_append() {
        let err = ApiError::from(AppendError::Auth(AuthError::TokenCacheMissing));
        let (status, kind, _, _) = err.parts();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(kind, "TokenCacheMissing");
    }

    #[test]
    fn plain_text_bodies_are_passed_as_strings() {
        assert_eq!(upstream_details("Bad Request"), json!("Bad Request"));
    }
}
