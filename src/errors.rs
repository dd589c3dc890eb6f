//! Gateway error types.
//!
//! Every variant maps to an HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(GatewayError::FileNotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::credentials::CredentialError;
use crate::storage::backend::StoreError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors surfaced by gateway handlers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Neither an object nor a prefix exists under the key.
    #[error("Error 404: File not found -- s3://{bucket}/{key}")]
    FileNotFound { bucket: String, key: String },

    /// Report index outside the catalog.
    #[error("report {index} does not exist (catalog has {count} reports)")]
    InvalidReport { index: i64, count: usize },

    /// A required query parameter is absent or malformed.
    #[error("missing or invalid query parameter '{0}'")]
    BadParameter(&'static str),

    /// The database credential could not be resolved.
    #[error("database credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),

    /// A query against the metadata database failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The archive store failed for a reason other than a missing key.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::InvalidReport { .. } => StatusCode::BAD_REQUEST,
            GatewayError::BadParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::Credentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            GatewayError::Store(StoreError::AccessDenied { .. }) => StatusCode::FORBIDDEN,
            GatewayError::Store(StoreError::Transient { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Store(StoreError::Other { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = generate_request_id();

        // Internal details stay in the log; clients get the status text.
        let body = if status.is_server_error() {
            error!(request_id = %request_id, "{}", self);
            format!(
                "Error {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Server Error")
            )
        } else {
            self.to_string()
        };

        (
            status,
            [
                ("content-type", "text/plain; charset=utf-8".to_string()),
                ("x-request-id", request_id),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_message() {
        let err = GatewayError::FileNotFound {
            bucket: "digitalcorpora".to_string(),
            key: "corpora/missing.zip".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            err.to_string(),
            "Error 404: File not found -- s3://digitalcorpora/corpora/missing.zip"
        );
    }

    #[test]
    fn test_invalid_report_is_client_error() {
        let err = GatewayError::InvalidReport { index: 12, count: 8 };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_statuses() {
        let denied = GatewayError::from(StoreError::AccessDenied {
            bucket: "b".into(),
            key: "k".into(),
        });
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
        let transient = GatewayError::from(StoreError::Transient {
            operation: "get_object".into(),
            message: "timeout".into(),
        });
        assert_eq!(transient.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
