//! Settings read/update handlers.

use std::sync::Arc;

use axum::{Json, extract::State};
use biblio_settings::{SettingsError, SettingsPatch, SystemSettings};
use biblio_telemetry::UpdateOutcome;
use serde_json::Value;
use tracing::debug;

use crate::http::errors::ApiError;
use crate::state::ApiState;

pub(crate) async fn get_settings(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<SystemSettings>, ApiError> {
    let settings = state.settings.read().await?;
    state.telemetry.inc_settings_read();
    Ok(Json(settings))
}

/// Serves both `PATCH` and `PUT`; absent keys are left untouched either way.
pub(crate) async fn patch_settings(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Result<Json<SystemSettings>, ApiError> {
    let patch = match SettingsPatch::from_value(body) {
        Ok(patch) => patch,
        Err(err) => {
            debug!(error = %err, "settings patch body rejected");
            state.telemetry.inc_settings_update(UpdateOutcome::Rejected);
            return Err(ApiError::config_invalid(
                "settings patch must be a JSON object",
            ));
        }
    };

    match state.settings.update(patch).await {
        Ok(settings) => {
            state.telemetry.inc_settings_update(UpdateOutcome::Applied);
            Ok(Json(settings))
        }
        Err(err) => {
            let outcome = if matches!(err, SettingsError::Validation { .. }) {
                UpdateOutcome::Rejected
            } else {
                UpdateOutcome::Failed
            };
            state.telemetry.inc_settings_update(outcome);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use biblio_settings::{
        MemorySettingsStore, SettingsFacade, SettingsResult, SettingsService, TwoFactorAuthMode,
    };
    use biblio_telemetry::Metrics;
    use serde_json::json;
    use std::io;

    fn memory_state() -> Arc<ApiState> {
        let service = SettingsService::new(Arc::new(MemorySettingsStore::new()));
        Arc::new(ApiState::new(
            Arc::new(service),
            Metrics::new().expect("metrics"),
        ))
    }

    struct OfflineSettings;

    #[async_trait]
    impl SettingsFacade for OfflineSettings {
        async fn read(&self) -> SettingsResult<SystemSettings> {
            Err(offline())
        }

        async fn update(&self, _patch: SettingsPatch) -> SettingsResult<SystemSettings> {
            Err(offline())
        }
    }

    fn offline() -> SettingsError {
        SettingsError::StorageUnavailable {
            operation: "fetch settings",
            source: Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "offline")),
        }
    }

    #[tokio::test]
    async fn get_returns_defaults_and_counts_reads() {
        let state = memory_state();
        let Json(first) = get_settings(State(Arc::clone(&state)))
            .await
            .expect("first read");
        let Json(second) = get_settings(State(Arc::clone(&state)))
            .await
            .expect("second read");
        assert_eq!(first, second);
        assert_eq!(first.max_books_per_user, 5);
        assert_eq!(state.telemetry.snapshot().settings_reads_total, 2);
    }

    #[tokio::test]
    async fn patch_merges_and_returns_full_record() {
        let state = memory_state();
        let Json(updated) = patch_settings(
            State(Arc::clone(&state)),
            Json(json!({ "loanPeriodDays": 21, "twoFactorAuthMode": "required" })),
        )
        .await
        .expect("patch applied");
        assert_eq!(updated.loan_period_days, 21);
        assert_eq!(updated.max_books_per_user, 5);
        assert_eq!(updated.two_factor_auth_mode, TwoFactorAuthMode::Required);
        assert_eq!(state.telemetry.snapshot().settings_updates_applied, 1);
    }

    #[tokio::test]
    async fn invalid_patch_is_rejected_with_pointer() {
        let state = memory_state();
        let err = patch_settings(
            State(Arc::clone(&state)),
            Json(json!({ "maxBooksPerUser": -1 })),
        )
        .await
        .expect_err("negative limit rejected");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let params = err.invalid_params.expect("invalid params");
        assert_eq!(params[0].pointer, "/maxBooksPerUser");
        assert_eq!(state.telemetry.snapshot().settings_updates_rejected, 1);

        let Json(current) = get_settings(State(state)).await.expect("read");
        assert_eq!(current.max_books_per_user, 5);
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let state = memory_state();
        let err = patch_settings(State(Arc::clone(&state)), Json(json!([1, 2, 3])))
            .await
            .expect_err("arrays are not patches");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.telemetry.snapshot().settings_updates_rejected, 1);
    }

    #[tokio::test]
    async fn storage_failures_surface_as_unavailable() {
        let state = Arc::new(ApiState::new(
            Arc::new(OfflineSettings),
            Metrics::new().expect("metrics"),
        ));
        let err = get_settings(State(Arc::clone(&state)))
            .await
            .expect_err("read fails");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);

        let err = patch_settings(
            State(Arc::clone(&state)),
            Json(json!({ "libraryName": "Central" })),
        )
        .await
        .expect_err("update fails");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        let snapshot = state.telemetry.snapshot();
        assert_eq!(snapshot.settings_reads_total, 0);
        assert_eq!(snapshot.settings_updates_failed, 1);
    }
}
