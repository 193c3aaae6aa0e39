//! Health and metrics endpoints.

use std::sync::Arc;

use axum::{Json, body::Body, extract::State, http::StatusCode, response::Response};
use biblio_telemetry::build_sha;
use serde::Serialize;
use tracing::{error, warn};

use crate::http::errors::ApiError;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) settings_version: i64,
    pub(crate) build: String,
}

pub(crate) async fn health(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    match state.settings.read().await {
        Ok(settings) => Ok(Json(HealthResponse {
            status: "ok",
            settings_version: settings.version,
            build: build_sha().to_string(),
        })),
        Err(err) => {
            warn!(error = %err, "health check failed to read settings");
            Err(ApiError::service_unavailable(
                "settings store is currently unavailable",
            ))
        }
    }
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal("failed to build metrics response")
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal("failed to render metrics"))
        }
    }
}
