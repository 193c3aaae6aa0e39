//! Shared handler state.

use std::sync::Arc;

use biblio_settings::SettingsFacade;
use biblio_telemetry::Metrics;

pub(crate) struct ApiState {
    pub(crate) settings: Arc<dyn SettingsFacade>,
    pub(crate) telemetry: Metrics,
}

impl ApiState {
    pub(crate) fn new(settings: Arc<dyn SettingsFacade>, telemetry: Metrics) -> Self {
        Self {
            settings,
            telemetry,
        }
    }
}
