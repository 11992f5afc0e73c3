//! HTTP error surface.
//!
//! Every failure response carries a stable error kind string plus a
//! human-readable message, as `{"error": kind, "message": text}`.

use crate::recommend::{PipelineError, ServiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    CaptioningUnavailable(String),
    ReasonerUnavailable(String),
    CatalogUnavailable(String),
    AnalysisNotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    /// Stable kind string, part of the API contract.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "InvalidInput",
            ApiError::CaptioningUnavailable(_) => "CaptioningUnavailable",
            ApiError::ReasonerUnavailable(_) => "ReasonerUnavailable",
            ApiError::CatalogUnavailable(_) => "CatalogUnavailable",
            ApiError::AnalysisNotFound(_) => "AnalysisNotFound",
            ApiError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::CaptioningUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ReasonerUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::CatalogUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::AnalysisNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::InvalidInput(m)
            | ApiError::CaptioningUnavailable(m)
            | ApiError::ReasonerUnavailable(m)
            | ApiError::CatalogUnavailable(m)
            | ApiError::AnalysisNotFound(m)
            | ApiError::Internal(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            error!("Internal error: {}", self.message());
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::CaptioningUnavailable(m) => ApiError::CaptioningUnavailable(m),
            ServiceError::NotFound(id) => {
                ApiError::AnalysisNotFound(format!("no analysis with id {}", id))
            }
            ServiceError::Pipeline(PipelineError::CatalogUnavailable(m)) => {
                ApiError::CatalogUnavailable(m)
            }
            ServiceError::Pipeline(PipelineError::ReasonerUnavailable(m)) => {
                ApiError::ReasonerUnavailable(m)
            }
            ServiceError::Internal(e) => ApiError::Internal(e.to_string()),
        }
    }
}
