//! HTTP surface modules (router, handlers, middleware).

/// Shared constants and problem URIs.
pub mod constants;
/// Problem response helpers and error types.
pub mod errors;
/// Health and metrics endpoints.
pub mod health;
/// Router construction and server host.
pub mod router;
/// Settings read/update handlers.
pub mod settings;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
