//! Error types for the resumable upload server.
//!
//! Two layers, mirroring the protocol's error-handling design:
//!
//! - [`StorageError`] is returned by the `SessionStore`/`StorageService`
//!   traits. It is deliberately low-level so the engine can branch on
//!   *kind* (e.g. an unknown upload handle triggers orphan recovery, not a
//!   client-facing error).
//! - [`UploadError`] is the protocol-level error returned by the engine and
//!   handlers; it knows how to render itself as an HTTP response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

/// Errors surfaced by the storage and session layers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// `bytesUploaded`/`store` referenced an upload handle the storage
    /// layer has no record of (cleaned, expired, or never existed).
    #[error("unknown upload handle")]
    UnknownUploadPath,

    /// `store` finalized while a durable object for the same identifiers
    /// was already committed by a concurrent request.
    #[error("a durable object already exists for these identifiers")]
    AlreadyExists,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Protocol-level errors (§7).
#[derive(Debug, Error)]
pub enum UploadError {
    /// A structurally invalid header/body field.
    #[error("unparsable request: {0}")]
    Unparsable(String),

    /// Syntactically valid but semantically wrong metadata.
    #[error("invalid metadata: {0}")]
    InvalidMetaData(String),

    /// Session state contradicts the request.
    #[error("illegal session: {0}")]
    IllegalSession(String),

    /// Required session state is missing.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Announced or observed size over the configured limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The server deliberately refuses this measurement.
    #[error("upload skipped: {0}")]
    SkipUpload(String),

    /// Resume/restart mismatch with server state.
    #[error("unexpected content range: {0}")]
    UnexpectedContentRange(String),

    /// Storage detected a concurrent completion of the same identifiers.
    #[error("upload already exists")]
    UploadAlreadyExists,

    /// The announced uploadable already exists in durable storage.
    #[error("conflict: uploadable already stored")]
    Conflict,

    /// An attachment's parent measurement does not exist in durable storage.
    #[error("attachment without measurement")]
    AttachmentWithoutMeasurement,

    /// No authenticated user could be resolved from the request context.
    #[error("unauthorized")]
    Unauthorized,

    /// Unknown runtime failure; never destroys session state so clients
    /// can retry.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl UploadError {
    pub fn unparsable(msg: impl Into<String>) -> Self {
        Self::Unparsable(msg.into())
    }

    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetaData(msg.into())
    }

    pub fn illegal_session(msg: impl Into<String>) -> Self {
        Self::IllegalSession(msg.into())
    }

    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::PayloadTooLarge(msg.into())
    }

    pub fn skip_upload(msg: impl Into<String>) -> Self {
        Self::SkipUpload(msg.into())
    }

    pub fn unexpected_content_range(msg: impl Into<String>) -> Self {
        Self::UnexpectedContentRange(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error, surfacing from the chunk handler, should
    /// destroy the session per the fatal taxonomy in §4.5.
    pub fn destroys_session(&self) -> bool {
        matches!(self, Self::SkipUpload(_) | Self::PayloadTooLarge(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unparsable(_)
            | Self::InvalidMetaData(_)
            | Self::IllegalSession(_)
            | Self::PayloadTooLarge(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SkipUpload(_) => StatusCode::PRECONDITION_FAILED,
            Self::SessionExpired(_) | Self::UnexpectedContentRange(_) => StatusCode::NOT_FOUND,
            Self::UploadAlreadyExists | Self::Conflict => StatusCode::CONFLICT,
            Self::AttachmentWithoutMeasurement => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) | Self::Io(_) | Self::Database(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

/// Maps storage-layer failures other than the two the engine must branch
/// on explicitly (`UnknownUploadPath`, `AlreadyExists`) onto the generic
/// internal error; call sites that care about those two kinds match on
/// `StorageError` directly instead of going through this conversion.
impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists => Self::UploadAlreadyExists,
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_server_error() {
            tracing::error!(error = %self, "server error occurred");
        } else {
            tracing::debug!(error = %self, "client error occurred");
        }

        let error_type = match &self {
            Self::Unparsable(_) => "unparsable",
            Self::InvalidMetaData(_) => "invalid_metadata",
            Self::IllegalSession(_) => "illegal_session",
            Self::SessionExpired(_) => "session_expired",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::SkipUpload(_) => "skip_upload",
            Self::UnexpectedContentRange(_) => "unexpected_content_range",
            Self::UploadAlreadyExists => "upload_already_exists",
            Self::Conflict => "conflict",
            Self::AttachmentWithoutMeasurement => "attachment_without_measurement",
            Self::Unauthorized => "unauthorized",
            Self::Internal(_) => "internal_error",
            Self::Io(_) => "io_error",
            Self::Database(_) => "database_error",
            Self::Config(_) => "config_error",
        };

        let message = if self.is_server_error() {
            "An internal error occurred. Please try again later.".to_string()
        } else {
            self.to_string()
        };

        // Several paths (308/201/200/409 without a body) are built directly
        // by the handlers with an empty body; this impl only covers the
        // error-carrying responses (422/412/404/401/500).
        (
            status,
            Json(ErrorResponse {
                error: error_type.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_propagation_policy() {
        assert_eq!(
            UploadError::invalid_metadata("x").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            UploadError::skip_upload("x").status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            UploadError::session_expired("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(UploadError::UploadAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(UploadError::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            UploadError::AttachmentWithoutMeasurement.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(UploadError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn fatal_taxonomy_destroys_session_only_for_skip_and_too_large() {
        assert!(UploadError::skip_upload("x").destroys_session());
        assert!(UploadError::payload_too_large("x").destroys_session());
        assert!(!UploadError::invalid_metadata("x").destroys_session());
        assert!(!UploadError::session_expired("x").destroys_session());
    }

    #[test]
    fn storage_error_already_exists_maps_to_upload_already_exists() {
        let err: UploadError = StorageError::AlreadyExists.into();
        assert!(matches!(err, UploadError::UploadAlreadyExists));
    }
}
