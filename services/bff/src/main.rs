//! Storefront BFF
//!
//! Server half of the storefront web app:
//! 1. Keeps the browser session in two cookies (`access_token`, `user_data`)
//! 2. Runs login / registration / logout / profile actions against the
//!    remote REST API
//! 3. Relays product uploads as multipart forms
//! 4. Passes `/api/*` calls through the authenticated request gateway
//! 5. Turns gateway redirect outcomes into browser redirects to the login page

mod auth;
mod config;
mod cookies;
mod error;
mod metrics;
mod products;
mod proxy;

use anyhow::{Context, Result};
use api_gateway::{Gateway, GatewayConfig};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post, put};
use axum::{Form, Json, Router, middleware};
use axum_extra::extract::CookieJar;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::{LoginForm, ProfileUpdate, RegistrationForm, SessionSettings};
use crate::config::Config;
use crate::error::new_request_id;
use crate::metrics::ServiceMetrics;

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    gateway: Gateway,
    session: SessionSettings,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Session and passthrough routes are counted by the request-tracking
/// middleware; `/health` and `/metrics` are not.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let upload_limit = DefaultBodyLimit::max(products::MAX_UPLOAD_BYTES);
    let actions = Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/register", post(register_handler))
        .route("/logout", get(logout_handler).post(logout_handler))
        .route("/session", get(session_handler))
        .route(
            "/profile",
            put(profile_handler).delete(delete_account_handler),
        )
        .route(
            "/products",
            post(create_product_handler).layer(upload_limit),
        )
        .route(
            "/products/{id}",
            put(update_product_handler).layer(upload_limit),
        )
        .route("/api/{*path}", any(api_handler))
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics::track_requests,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(actions)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs; LOG_LEVEL wins over RUST_LOG, default info
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting storefront-bff");

    // Install before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        login_path = %config.session.login_path,
        secure_cookies = config.session.secure_cookies,
        "configuration loaded"
    );

    let session = SessionSettings::from(&config.session);
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let gateway = Gateway::with_client(
        client,
        GatewayConfig::new(config.api.base_url.clone())
            .with_timeout(Duration::from_secs(config.api.timeout_secs))
            .with_session(session.policy.clone()),
    );

    let service_metrics = ServiceMetrics::new();
    let app_state = AppState {
        gateway,
        session,
        metrics: service_metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = service_metrics.in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus request counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = &state.metrics;
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": metrics.started_at.elapsed().as_secs(),
        "requests_served": metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": metrics.errors_total.load(Ordering::Relaxed),
        "in_flight": metrics.in_flight.load(Ordering::Relaxed),
    }))
}

/// Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    auth::login(&state.gateway, &state.session, jar, form, &new_request_id()).await
}

async fn register_handler(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> Response {
    auth::register(&state.gateway, &state.session, form, &new_request_id()).await
}

async fn logout_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    auth::logout(&state.session, jar)
}

async fn session_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    auth::current_session(&state.session, jar)
}

async fn profile_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    let request_id = new_request_id();
    auth::update_profile(&state.gateway, &state.session, jar, update, &request_id).await
}

async fn delete_account_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    auth::delete_account(&state.gateway, &state.session, jar, &new_request_id()).await
}

async fn create_product_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let request_id = new_request_id();
    products::create_product(&state.gateway, &state.session, jar, multipart, &request_id).await
}

async fn update_product_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    jar: CookieJar,
    multipart: Multipart,
) -> Response {
    let request_id = new_request_id();
    products::update_product(
        &state.gateway,
        &state.session,
        jar,
        &id,
        multipart,
        &request_id,
    )
    .await
}

async fn api_handler(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
) -> Response {
    proxy::forward(&state.gateway, &state.session, request, &new_request_id()).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
