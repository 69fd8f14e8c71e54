//! Router assembly and server lifecycle

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use virtuoso_common::Settings;
use virtuoso_executor::CliExecutor;

use crate::auth;
use crate::commands;
use crate::health::{self, Metrics};
use crate::rate_limit::{self, RateLimiter};
use crate::sessions::{self, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub executor: Arc<CliExecutor>,
    pub sessions: SessionStore,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
    pub key_digests: Arc<Vec<[u8; 32]>>,
}

impl AppState {
    pub fn new(settings: Settings, executor: CliExecutor) -> Self {
        let key_digests = settings
            .api_keys
            .iter()
            .map(|k| auth::key_digest(k))
            .collect();
        let limiter = RateLimiter::new(settings.rate_limit_requests, settings.rate_limit_period);
        let sessions = SessionStore::new(settings.session_ttl);

        Self {
            settings: Arc::new(settings),
            executor: Arc::new(executor),
            sessions,
            limiter: Arc::new(limiter),
            metrics: Arc::new(Metrics::new()),
            key_digests: Arc::new(key_digests),
        }
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "virtuoso-gateway",
        "version": virtuoso_common::VERSION,
        "docs": "/api/v1",
    }))
}

async fn fallback() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found" })),
    )
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/commands/execute", post(commands::execute_command))
        .route(
            "/commands/step/:group/:action",
            post(commands::execute_step),
        )
        .route("/commands/batch", post(commands::execute_batch))
        .route("/commands/stream", post(commands::stream_command))
        .route("/commands", get(commands::list_commands))
        .route(
            "/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/:id/activate", post(sessions::activate_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce_rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    // Health stays outside auth so probes work without credentials
    let health = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/health/metrics", get(health::metrics));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", api)
        .merge(health)
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c, then drain the executor
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let listen = state.settings.listen.clone();
    let executor = state.executor.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("Virtuoso gateway listening on http://{}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining in-flight commands");
    executor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
