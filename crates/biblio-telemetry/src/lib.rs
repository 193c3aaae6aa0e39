#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the Biblio workspace.
//!
//! Layout: `init.rs` (subscriber installation), `context.rs` (application span
//! and task-local request context), `layers.rs` (request-id layers and request
//! spans), `metrics.rs` (Prometheus registry), `error.rs` (`TelemetryError`).

pub mod context;
pub mod error;
pub mod init;
pub mod layers;
pub mod metrics;

pub use context::{GlobalContextGuard, current_request_id, current_route, with_request_context};
pub use error::{Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, UnknownLogFormat, build_sha, init_logging,
};
pub use layers::{REQUEST_ID_HEADER, propagate_request_id_layer, request_span, set_request_id_layer};
pub use metrics::{Metrics, MetricsSnapshot, UpdateOutcome};
