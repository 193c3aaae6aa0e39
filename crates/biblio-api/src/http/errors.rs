//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use biblio_settings::{FieldViolation, SettingsError};
use biblio_telemetry::current_request_id;
use tracing::{debug, error, warn};

use crate::http::constants::{
    PROBLEM_CONFIG_INVALID, PROBLEM_INTERNAL, PROBLEM_SERVICE_UNAVAILABLE,
};
use crate::models::{ProblemDetails, ProblemInvalidParam};

/// Structured API error with optional RFC9457 fields.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
    pub(crate) invalid_params: Option<Vec<ProblemInvalidParam>>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
            invalid_params: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn with_invalid_params(mut self, params: Vec<ProblemInvalidParam>) -> Self {
        self.invalid_params = Some(params);
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn config_invalid(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            PROBLEM_CONFIG_INVALID,
            "configuration invalid",
        )
        .with_detail(detail)
    }

    pub(crate) fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            PROBLEM_SERVICE_UNAVAILABLE,
            "service unavailable",
        )
        .with_detail(detail)
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        let request_id = current_request_id().unwrap_or_default();
        match err {
            SettingsError::Validation { violations } => {
                debug!(
                    request_id = %request_id,
                    rejected = violations.len(),
                    "settings patch rejected"
                );
                Self::config_invalid("settings patch rejected")
                    .with_invalid_params(violations.iter().map(invalid_param).collect())
            }
            SettingsError::StorageUnavailable { operation, source } => {
                warn!(
                    request_id = %request_id,
                    operation,
                    error = %source,
                    "settings storage unavailable"
                );
                Self::service_unavailable("settings storage is currently unavailable")
            }
            SettingsError::CorruptRecord { field, reason } => {
                error!(
                    request_id = %request_id,
                    field,
                    reason,
                    "stored settings record is corrupt"
                );
                Self::service_unavailable("stored settings could not be read")
            }
            SettingsError::Duplicate => {
                error!(request_id = %request_id, "settings insert conflict escaped the service");
                Self::internal("settings record conflict")
            }
        }
    }
}

fn invalid_param(violation: &FieldViolation) -> ProblemInvalidParam {
    ProblemInvalidParam {
        pointer: format!("/{}", violation.field),
        message: violation.reason.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
            invalid_params: self.invalid_params,
        };
        (self.status, Json(body)).into_response()
    }
}
