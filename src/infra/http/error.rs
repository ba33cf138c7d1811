use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use vitrine_api_types::ErrorResponse;

use crate::application::content::ContentError;
use crate::application::error::ErrorReport;
use crate::application::refresh::RefreshError;
use crate::application::webhooks::{DispatchError, IngestError};
use crate::infra::images::ImageError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const SECRET_NOT_CONFIGURED: &str = "secret_not_configured";
    pub const ORIGIN_UNAVAILABLE: &str = "origin_unavailable";
    pub const REFRESH_FAILED: &str = "refresh_failed";
    pub const CACHE_WRITE: &str = "cache_write_failed";
    pub const INVALID_SIGNATURE: &str = "invalid_signature";
    pub const QUEUE_FULL: &str = "queue_full";
    pub const IMAGES_DISABLED: &str = "images_disabled";
    pub const IMAGE_STORAGE: &str = "image_storage_failed";
}

/// JSON error envelope plus the diagnostic report for the logging middleware.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        let detail = format!("{code}: {}", hint.as_deref().unwrap_or(message));
        Self {
            status,
            code,
            message,
            hint,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    /// Like [`Self::new`], but the report carries the full error chain.
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        error: &dyn std::error::Error,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint: Some(error.to_string()),
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn bad_request(source: &'static str, message: &'static str, hint: Option<String>) -> Self {
        Self::new(source, StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn unauthorized(source: &'static str) -> Self {
        Self::new(
            source,
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Unauthorized",
            None,
        )
    }

    pub fn not_found(source: &'static str, message: &'static str) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn secret_not_configured(source: &'static str) -> Self {
        Self::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::SECRET_NOT_CONFIGURED,
            "Refresh secret is not configured",
            Some("set CACHE_REFRESH_SECRET or VITRINE__SECURITY__REFRESH_SECRET".to_string()),
        )
    }

    pub fn images_disabled(source: &'static str) -> Self {
        Self::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            codes::IMAGES_DISABLED,
            "Image mirror is disabled",
            None,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message.to_string(),
            code: self.code.to_string(),
            hint: self.hint,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RefreshError> for ApiError {
    fn from(error: RefreshError) -> Self {
        const SOURCE: &str = "infra::http::refresh_error";
        match &error {
            RefreshError::Origin(_) | RefreshError::Abandoned => ApiError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                codes::REFRESH_FAILED,
                "Cache refresh failed",
                &error,
            ),
            RefreshError::Cache(_) => ApiError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::CACHE_WRITE,
                "Cache write failed",
                &error,
            ),
            RefreshError::InvalidPayload(_) => ApiError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "Invalid payload",
                &error,
            ),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(error: ContentError) -> Self {
        const SOURCE: &str = "infra::http::content_error";
        match &error {
            ContentError::Unavailable { .. } => ApiError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                codes::ORIGIN_UNAVAILABLE,
                "Content is unavailable",
                &error,
            ),
            ContentError::ProductNotFound { .. } => {
                ApiError::not_found(SOURCE, "Product not found")
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        const SOURCE: &str = "infra::http::webhook_error";
        match error {
            IngestError::MissingSignature | IngestError::InvalidSignature => ApiError::new(
                SOURCE,
                StatusCode::UNAUTHORIZED,
                codes::INVALID_SIGNATURE,
                "Invalid webhook signature",
                Some(error.to_string()),
            ),
            IngestError::Dispatch(DispatchError::QueueFull) => ApiError::new(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                codes::QUEUE_FULL,
                "Webhook queue is full",
                Some("retry the delivery later".to_string()),
            ),
            IngestError::Dispatch(DispatchError::Closed) => ApiError::new(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                codes::QUEUE_FULL,
                "Service is shutting down",
                None,
            ),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(error: ImageError) -> Self {
        ApiError::from_error(
            "infra::http::image_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::IMAGE_STORAGE,
            "Image storage failed",
            &error,
        )
    }
}
