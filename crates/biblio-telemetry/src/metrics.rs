//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the HTTP counter plus the settings read/update counters.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Outcome label recorded on `settings_updates_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The patch was merged into the record.
    Applied,
    /// Validation rejected the patch.
    Rejected,
    /// The store failed.
    Failed,
}

impl UpdateOutcome {
    /// Label value for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    settings_reads_total: IntCounter,
    settings_updates_total: IntCounterVec,
}

/// Snapshot of the settings counters for health reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Reads served.
    pub settings_reads_total: u64,
    /// Updates merged into the record.
    pub settings_updates_applied: u64,
    /// Updates rejected by validation.
    pub settings_updates_rejected: u64,
    /// Updates that failed in the store.
    pub settings_updates_failed: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )
        .map_err(collector_error("http_requests_total"))?;
        let settings_reads_total = IntCounter::with_opts(Opts::new(
            "settings_reads_total",
            "Settings reads served",
        ))
        .map_err(collector_error("settings_reads_total"))?;
        let settings_updates_total = IntCounterVec::new(
            Opts::new("settings_updates_total", "Settings updates by outcome"),
            &["outcome"],
        )
        .map_err(collector_error("settings_updates_total"))?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "settings_reads_total", &settings_reads_total)?;
        register(&registry, "settings_updates_total", &settings_updates_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                settings_reads_total,
                settings_updates_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Count a settings read.
    pub fn inc_settings_read(&self) {
        self.inner.settings_reads_total.inc();
    }

    /// Count a settings update attempt by outcome.
    pub fn inc_settings_update(&self, outcome: UpdateOutcome) {
        self.inner
            .settings_updates_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the settings counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let updates = |outcome: UpdateOutcome| {
            self.inner
                .settings_updates_total
                .with_label_values(&[outcome.as_str()])
                .get()
        };
        MetricsSnapshot {
            settings_reads_total: self.inner.settings_reads_total.get(),
            settings_updates_applied: updates(UpdateOutcome::Applied),
            settings_updates_rejected: updates(UpdateOutcome::Rejected),
            settings_updates_failed: updates(UpdateOutcome::Failed),
        }
    }
}

fn collector_error(name: &'static str) -> impl FnOnce(prometheus::Error) -> TelemetryError {
    move |source| TelemetryError::MetricsCollector { name, source }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
