//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, Method, Request, header::CONTENT_TYPE},
    routing::get,
};
use biblio_settings::SettingsFacade;
use biblio_telemetry::{
    Metrics, REQUEST_ID_HEADER, propagate_request_id_layer, request_span, set_request_id_layer,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::constants::SETTINGS_ROUTE;
use crate::http::health::{health, metrics};
use crate::http::settings::{get_settings, patch_settings};
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper that hosts the settings API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct the API server around a settings facade and metrics registry.
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsFacade>, telemetry: Metrics) -> Self {
        let state = Arc::new(ApiState::new(settings, telemetry.clone()));
        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::PATCH, Method::PUT, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, HeaderName::from_static(REQUEST_ID_HEADER)]);
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("");
                request_span(request.method().as_str(), request.uri().path(), request_id)
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::routes()
            .layer(cors_layer)
            .route_layer(layered)
            .with_state(state);

        Self { router }
    }

    fn routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route(
                SETTINGS_ROUTE,
                get(get_settings).patch(patch_settings).put(patch_settings),
            )
    }

    /// Serve the API using the configured router on the supplied address.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve(self, addr: SocketAddr) -> ApiServerResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(addr = %addr, "settings api listening");
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }

    /// Access the assembled router, for embedding into a larger application.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }
}
