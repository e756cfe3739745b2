//! HTTP error responses.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docqa_rag::{ErrorKind, RagError};
use thiserror::Error;
use tracing::{error, warn};

use crate::protocol::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Upload(#[from] MultipartError),

    #[error("{0}")]
    InvalidRequest(String),
}

/// HTTP status for each error kind of the pipeline.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyQuestion | ErrorKind::EmptyDocument | ErrorKind::ConfigurationError => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NoCorpus | ErrorKind::DocumentNotFound => StatusCode::NOT_FOUND,
        ErrorKind::EmbeddingUnavailable | ErrorKind::GenerationUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::MalformedGenerationOutput => StatusCode::BAD_GATEWAY,
        ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rag(e) => status_for(e.kind()),
            Self::Upload(e) => e.status(),
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable error label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rag(e) => e.kind().as_str(),
            Self::Upload(_) => "invalid_upload",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ErrorBody { error: self.label().to_string(), detail: self.to_string() };
        (status, Json(body)).into_response()
    }
}
