// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, MatchedPath, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use opentelemetry::{global, KeyValue};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, warn};

use airwave_api::{
    BackgroundStatus, ErrorBody, HealthResponse, OkResponse, ScheduleRequest, ScheduleResponse,
    ServerInfo, SkipResponse, StreamInfo, StreamStats,
};
use airwave_core::{
    AirwaveError, BackgroundScheduler, BroadcastRelay, EventBus, MemoryCatalog, RelayConfig,
    SchedulerConfig,
};

use crate::admin::{require_admin, ADMIN_ACTOR};
use crate::config::Config;
use crate::state::AppState;
use crate::websocket;
use crate::wire;

static HTTP_METRICS: OnceLock<(
    opentelemetry::metrics::Counter<u64>,
    opentelemetry::metrics::Histogram<f64>,
)> = OnceLock::new();

const ENDPOINTS: &[&str] = &[
    "GET /health",
    "GET /ws",
    "GET /api/v1/background-stream/status",
    "POST /api/v1/background-stream/schedule",
    "POST /api/v1/background-stream/stop",
    "POST /api/v1/background-stream/next",
    "GET /api/v1/streams/active",
    "GET /api/v1/streams/stats",
];

async fn health_handler(State(app_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = app_state.relay.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_streams: stats.active_streams,
        total_listeners: stats.total_listeners,
        uptime_secs: app_state.uptime_secs(),
    })
}

async fn server_info_handler() -> Json<ServerInfo> {
    Json(ServerInfo {
        name: "Airwave".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        endpoints: ENDPOINTS.iter().map(ToString::to_string).collect(),
    })
}

/// Matches an `Origin` against an allowlist entry.
///
/// Supports wildcard patterns:
/// - `*` - Allow all origins
/// - `http://localhost:*` - Match any port on localhost
/// - Exact origins like `https://example.com`
fn origin_matches_pattern(origin: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(prefix_without_port) = pattern.strip_suffix(":*") {
        let Some(rest) = origin.strip_prefix(prefix_without_port) else {
            return false;
        };

        let Some(port_str) = rest.strip_prefix(':') else {
            return false;
        };

        return !port_str.is_empty() && port_str.chars().all(|c| c.is_ascii_digit());
    }

    origin == pattern
}

fn origin_allowed(app_state: &AppState, origin: &str) -> bool {
    app_state.config.server.cors.allowed_origins.iter().any(|p| origin_matches_pattern(origin, p))
}

/// Best-effort Origin enforcement for browser security.
///
/// This is NOT authentication. Mutating `/api/` requests whose `Origin` header
/// is not on the configured allowlist are rejected. Requests without an
/// `Origin` header (CLI tools, server-to-server) pass through.
async fn origin_guard_middleware(
    State(app_state): State<Arc<AppState>>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    use axum::http::Method;

    let path = req.uri().path();
    let method = req.method().clone();

    let is_api = path.starts_with("/api/");
    let is_mutating = matches!(method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE);

    if is_api && is_mutating {
        if let Some(origin) = req.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
            if !origin_allowed(&app_state, origin) {
                warn!(
                    origin = %origin,
                    method = %method,
                    path = %path,
                    "Rejected request: Origin not allowed"
                );
                return (
                    StatusCode::FORBIDDEN,
                    "Origin not allowed (configure [server.cors].allowed_origins)",
                )
                    .into_response();
            }
        }
    }

    next.run(req).await
}

fn create_cors_layer(config: &crate::config::CorsConfig) -> CorsLayer {
    use axum::http::{HeaderValue, Method};

    if config.allowed_origins.iter().any(|o| o == "*") {
        info!("CORS configured to allow all origins (permissive mode)");
        return CorsLayer::permissive();
    }

    if config.allowed_origins.is_empty() {
        info!("CORS configured with no allowed origins (most restrictive)");
        return CorsLayer::new();
    }

    let patterns: Vec<String> = config.allowed_origins.clone();
    info!(allowed_origins = ?patterns, "CORS configured with origin allowlist");

    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _request_parts| {
        let Ok(origin_str) = origin.to_str() else {
            return false;
        };
        patterns.iter().any(|pattern| origin_matches_pattern(origin_str, pattern))
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers(Any)
}

async fn background_status_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<BackgroundStatus> {
    Json(wire::background_status(app_state.scheduler.status().await))
}

async fn schedule_background_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, AppError> {
    require_admin(&headers, &app_state.config.admin)?;

    let record = app_state
        .scheduler
        .schedule_track(request.track_id, request.duration_minutes, ADMIN_ACTOR)
        .await?;
    let message = format!("Stream scheduled for {} minutes", record.duration_minutes);
    Ok(Json(ScheduleResponse { schedule: wire::schedule_info(record), message }))
}

async fn stop_background_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, AppError> {
    require_admin(&headers, &app_state.config.admin)?;
    app_state.scheduler.stop().await;
    Ok(Json(OkResponse { ok: true }))
}

async fn next_background_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SkipResponse>, AppError> {
    require_admin(&headers, &app_state.config.admin)?;
    let track = app_state.scheduler.skip().await?;
    Ok(Json(SkipResponse { ok: true, track }))
}

async fn active_streams_handler(State(app_state): State<Arc<AppState>>) -> Json<Vec<StreamInfo>> {
    let streams = app_state.relay.active_streams().await;
    Json(streams.iter().map(wire::stream_info).collect())
}

async fn stream_stats_handler(State(app_state): State<Arc<AppState>>) -> Json<StreamStats> {
    let stats = app_state.relay.stats().await;
    Json(StreamStats {
        active_streams: stats.active_streams,
        total_listeners: stats.total_listeners,
        connected_clients: stats.connected_clients,
        uptime_secs: app_state.uptime_secs(),
    })
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    // Browsers always send an Origin header for WebSocket connections; without
    // this check any website could drive a listener's local relay.
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        if !origin_allowed(&app_state, origin) {
            warn!(origin = %origin, "Rejected WebSocket connection: Origin not allowed");
            return (StatusCode::FORBIDDEN, "WebSocket Origin not allowed").into_response();
        }
    }

    ws.on_upgrade(move |socket| websocket::handle_websocket(socket, app_state))
}

async fn metrics_middleware(req: axum::http::Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.extensions().get::<MatchedPath>().map_or_else(
        || req.uri().path().to_owned(),
        |matched_path| matched_path.as_str().to_owned(),
    );

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let (counter, histogram) = HTTP_METRICS
        .get_or_init(|| {
            let meter = global::meter("airwave_http");
            (
                meter.u64_counter("http.server.requests").build(),
                meter.f64_histogram("http.server.duration").build(),
            )
        })
        .clone();

    let labels = [
        KeyValue::new("http.method", method.to_string()),
        KeyValue::new("http.route", path),
        KeyValue::new("http.status_code", status),
    ];

    counter.add(1, &labels);
    histogram.record(latency, &labels);

    response
}

/// Builds the shared state from configuration and starts the background
/// supervisor when it is enabled. Must run inside a tokio runtime.
fn build_state(config: Config) -> Arc<AppState> {
    let catalog = Arc::new(MemoryCatalog::with_tracks(config.catalog.tracks.clone()));
    let bus = EventBus::new(config.relay.event_capacity);
    let relay = Arc::new(BroadcastRelay::new(bus.clone(), RelayConfig::from(&config.relay)));
    let scheduler = BackgroundScheduler::new(
        catalog.clone(),
        bus.clone(),
        SchedulerConfig::from(&config.scheduler),
    );

    if config.scheduler.enabled {
        scheduler.spawn_supervisor();
    } else {
        info!("Background scheduler supervisor disabled");
    }
    info!(tracks = catalog.active_count(), "Catalog loaded");

    Arc::new(AppState {
        relay,
        scheduler,
        catalog,
        bus,
        config: Arc::new(config),
        started_at: Instant::now(),
    })
}

/// Creates the Axum application with all routes and middleware.
pub fn create_app(config: Config) -> (Router, Arc<AppState>) {
    let app_state = build_state(config);

    let router = Router::new()
        .route("/", get(server_info_handler))
        .route("/healthz", get(health_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(websocket_handler))
        .route("/api/v1/background-stream/status", get(background_status_handler))
        .route("/api/v1/background-stream/schedule", post(schedule_background_handler))
        .route("/api/v1/background-stream/stop", post(stop_background_handler))
        .route("/api/v1/background-stream/next", post(next_background_handler))
        .route("/api/v1/streams/active", get(active_streams_handler))
        .route("/api/v1/streams/stats", get(stream_stats_handler));

    let cors_layer = create_cors_layer(&app_state.config.server.cors);

    let router = router
        .with_state(Arc::clone(&app_state))
        .layer(middleware::from_fn_with_state(Arc::clone(&app_state), origin_guard_middleware))
        .layer(ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let route = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map_or_else(|| request.uri().path(), |matched| matched.as_str());
                    tracing::info_span!("http_request", http_method = %request.method(), http_route = %route)
                })
                .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG))
                .on_failure(DefaultOnFailure::new().level(tracing::Level::WARN)),
        ))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::HeaderName::from_static("referrer-policy"),
            header::HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors_layer);

    (router, app_state)
}

/// Starts the server and blocks until shutdown.
///
/// # Errors
///
/// Returns an error if:
/// - The server address cannot be parsed
/// - TLS is enabled but the certificate files are missing or invalid
/// - The server fails to bind to the address
///
/// # Panics
///
/// Panics if the Ctrl+C or SIGTERM signal handler cannot be installed.
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = config.server.address.parse()?;
    let (app, app_state) = create_app(config.clone());

    if app_state.config.admin.token.is_none() {
        warn!("No admin token configured; background-stream admin routes are disabled");
    }

    #[allow(clippy::expect_used)]
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {
                info!("Received CTRL-C signal, initiating graceful shutdown");
            },
            () = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown");
            },
        }
    };

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal.await;
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
        }
    });

    let result: Result<(), Box<dyn std::error::Error>> = if config.server.tls {
        if config.server.cert_path.is_empty() || config.server.key_path.is_empty() {
            return Err("TLS is enabled but cert_path or key_path is not configured".into());
        }

        info!(
            address = %addr,
            cert_path = %config.server.cert_path,
            key_path = %config.server.key_path,
            "Starting HTTPS server"
        );

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &config.server.cert_path,
            &config.server.key_path,
        )
        .await
        .map_err(|e| {
            error!(
                error = %e,
                cert_path = %config.server.cert_path,
                key_path = %config.server.key_path,
                "Failed to load TLS certificates"
            );
            e
        })?;

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .map_err(Into::into)
    } else {
        info!(address = %addr, "Starting HTTP server");
        axum_server::bind(addr).handle(handle).serve(app.into_make_service()).await.map_err(Into::into)
    };

    app_state.scheduler.shutdown().await;
    if let Err(e) = &result {
        error!(error = %e, "Server error");
    }
    result
}

// --- Error type for the Axum handlers ---
#[derive(Debug)]
pub enum AppError {
    Domain(AirwaveError),
    Unauthorized(String),
    Forbidden(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Domain(e) => {
                let status = match &e {
                    AirwaveError::NotFound(_) | AirwaveError::NoActiveStreams => {
                        StatusCode::NOT_FOUND
                    },
                    AirwaveError::AlreadyLive(_) | AirwaveError::AlreadyEnded(_) => {
                        StatusCode::CONFLICT
                    },
                    AirwaveError::Validation(_) => StatusCode::BAD_REQUEST,
                    AirwaveError::Upstream(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string())
            },
            Self::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e),
            Self::Forbidden(e) => (StatusCode::FORBIDDEN, e),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<AirwaveError> for AppError {
    fn from(e: AirwaveError) -> Self {
        Self::Domain(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_wildcard_port_matches_localhost_port_only() {
        assert!(origin_matches_pattern("http://localhost:8080", "http://localhost:*"));
        assert!(origin_matches_pattern("https://localhost:12345", "https://localhost:*"));

        assert!(!origin_matches_pattern("http://localhost", "http://localhost:*"));
        assert!(!origin_matches_pattern("http://localhost:abc", "http://localhost:*"));
        assert!(!origin_matches_pattern("http://localhost123:8080", "http://localhost:*"));
        assert!(!origin_matches_pattern("http://127.0.0.1:8080", "http://localhost:*"));
    }

    #[test]
    fn cors_exact_match_only() {
        assert!(origin_matches_pattern("https://example.com", "https://example.com"));
        assert!(!origin_matches_pattern("https://example.com:443", "https://example.com"));
        assert!(!origin_matches_pattern("https://example.com", "https://example.com:*"));
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (AirwaveError::NotFound("Track 9".into()), StatusCode::NOT_FOUND),
            (AirwaveError::NoActiveStreams, StatusCode::NOT_FOUND),
            (AirwaveError::AlreadyLive("s".into()), StatusCode::CONFLICT),
            (AirwaveError::AlreadyEnded("s".into()), StatusCode::CONFLICT),
            (AirwaveError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AirwaveError::Upstream("down".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
