//! Health and liveness endpoints, exempt from auth and rate limiting

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::server::AppState;

/// Process-local counters exposed at /health/metrics
pub struct Metrics {
    started: Instant,
    commands_executed: AtomicU64,
    commands_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            commands_executed: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
        }
    }

    pub fn record_command(&self, success: bool) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.commands_failed.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall health: `ok` when the CLI binary answers a version probe,
/// `degraded` otherwise (the gateway itself is still up)
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let cli_ok = state.executor.probe().await;
    Json(json!({
        "status": if cli_ok { "ok" } else { "degraded" },
        "cli": cli_ok,
        "version": virtuoso_common::VERSION,
        "environment": state.settings.environment,
    }))
}

pub async fn live() -> StatusCode {
    StatusCode::OK
}

/// Ready only when the CLI binary is still present where we found it at
/// startup
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let cli_present = state.settings.cli_path.is_file();
    if cli_present {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "reason": "CLI binary missing",
            })),
        )
    }
}

pub async fn metrics(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "uptime_secs": state.metrics.uptime_secs(),
        "commands_executed": state.metrics.executed(),
        "commands_failed": state.metrics.failed(),
        "active_sessions": state.sessions.count().await,
    }))
}
