//! HTTP tracing helpers for Tower-compatible stacks.
//!
//! # Design
//! - Dedicated layers for generating and propagating `x-request-id`.
//! - A single request span shape so every HTTP log line carries the same fields.

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Span;

use crate::init::build_sha;

/// Header carrying the request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Factory for the `x-request-id` generator layer.
#[must_use]
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer that copies the request's `x-request-id` onto the response.
#[must_use]
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Build the span recorded for each HTTP request.
///
/// `status` and `latency_ms` start empty and are filled in once the response
/// is produced.
#[must_use]
pub fn request_span(method: &str, route: &str, request_id: &str) -> Span {
    tracing::info_span!(
        "http.request",
        method = %method,
        route = %route,
        request_id = %request_id,
        build_sha = %build_sha(),
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    )
}
