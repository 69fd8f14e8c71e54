//! Session management
//!
//! A session pins a checkpoint id so step commands can omit it; the id is
//! injected into the CLI environment as VIRTUOSO_SESSION_ID. Sessions are
//! held in memory with a TTL and pruned lazily on access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;
use virtuoso_common::{Error, Session};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Clone)]
pub struct SessionStore {
    ttl: Duration,
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, checkpoint_id: String, description: Option<String>) -> Session {
        let now = Utc::now().timestamp();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            checkpoint_id,
            description,
            created_at: now,
            expires_at: now + self.ttl.as_secs() as i64,
            last_used_at: now,
        };
        self.inner
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Fetch a live session, refreshing its last-used timestamp
    pub async fn touch(&self, id: &str) -> Option<Session> {
        let now = Utc::now().timestamp();
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(id) {
            Some(session) if !session.is_expired(now) => {
                session.last_used_at = now;
                Some(session.clone())
            }
            Some(_) => {
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    pub async fn list(&self) -> Vec<Session> {
        let now = Utc::now().timestamp();
        let mut sessions = self.inner.write().await;
        sessions.retain(|_, s| !s.is_expired(now));
        let mut live: Vec<Session> = sessions.values().cloned().collect();
        live.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        live
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.inner.write().await.remove(id).is_some()
    }

    pub async fn count(&self) -> usize {
        let now = Utc::now().timestamp();
        self.inner
            .read()
            .await
            .values()
            .filter(|s| !s.is_expired(now))
            .count()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub checkpoint_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
    pub total: usize,
}

fn not_found(id: &str) -> ApiError {
    ApiError(Error::NotFound {
        kind: "session".to_string(),
        id: id.to_string(),
    })
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    if req.checkpoint_id.trim().is_empty() {
        return Err(ApiError(Error::validation("checkpoint_id must not be empty")));
    }
    if !req.checkpoint_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError(Error::validation("checkpoint_id must be numeric")));
    }

    let session = state
        .sessions
        .create(req.checkpoint_id, req.description)
        .await;
    info!(session_id = %session.id, checkpoint_id = %session.checkpoint_id, "session created");
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.sessions.list().await;
    let total = sessions.len();
    Json(SessionListResponse { sessions, total })
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions
        .touch(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        info!(session_id = %id, "session deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

/// Verify the session's checkpoint exists by asking the CLI for it, then
/// return the refreshed session.
pub async fn activate_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = state.sessions.touch(&id).await.ok_or_else(|| not_found(&id))?;

    let context = virtuoso_common::CommandContext::new(Uuid::new_v4().to_string())
        .with_session(session.checkpoint_id.clone());
    let result = state
        .executor
        .execute(
            &format!("get-checkpoint {}", session.checkpoint_id),
            &context,
            virtuoso_common::OutputFormat::Json,
        )
        .await?;

    if !result.success {
        return Err(ApiError(Error::NotFound {
            kind: "checkpoint".to_string(),
            id: session.checkpoint_id.clone(),
        }));
    }

    Ok(Json(session))
}
