//! Command execution endpoints
//!
//! Free-form command strings, typed step commands, batches, and a streaming
//! variant. Every handler resolves a session (if given) to a checkpoint id
//! before handing the command to the executor.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use virtuoso_common::{CommandContext, CommandResult, Error, OutputFormat, StepCommand};
use virtuoso_executor::step_command_string;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Per-request timeout override, seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub commands: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<CommandResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    #[serde(default)]
    pub checkpoint_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Step fields, merged with the path's group/action before typing
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListCommandsQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Resolve a session id to its checkpoint id, failing on unknown sessions
async fn resolve_session(state: &AppState, session_id: &Option<String>) -> Result<Option<String>, ApiError> {
    match session_id {
        None => Ok(None),
        Some(id) => match state.sessions.touch(id).await {
            Some(session) => Ok(Some(session.checkpoint_id)),
            None => Err(ApiError(Error::NotFound {
                kind: "session".to_string(),
                id: id.clone(),
            })),
        },
    }
}

fn build_context(
    checkpoint: Option<String>,
    timeout: Option<u64>,
    environment: HashMap<String, String>,
) -> CommandContext {
    let mut context = CommandContext::new(Uuid::new_v4().to_string());
    context.session_id = checkpoint;
    context.timeout = timeout.map(Duration::from_secs);
    context.environment = environment;
    context
}

/// Production responses omit raw stderr; the mapped error message remains
fn sanitize(mut result: CommandResult, state: &AppState) -> CommandResult {
    if state.settings.is_production() {
        result.stderr = String::new();
    }
    result
}

pub async fn execute_command(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<CommandResult>, ApiError> {
    let checkpoint = resolve_session(&state, &req.session_id).await?;
    let context = build_context(checkpoint, req.timeout, req.environment);

    info!(request_id = %context.request_id, "execute command");
    let result = state
        .executor
        .execute(&req.command, &context, req.output_format)
        .await?;

    state.metrics.record_command(result.success);
    Ok(Json(sanitize(result, &state)))
}

/// Typed step execution: `group` and `action` come from the path, the rest
/// of the step from the body. The checkpoint id may come from the body or a
/// session.
pub async fn execute_step(
    State(state): State<AppState>,
    Path((group, action)): Path<(String, String)>,
    Json(req): Json<StepRequest>,
) -> Result<Json<CommandResult>, ApiError> {
    let mut step_json = req.fields.clone();
    step_json.insert("group".to_string(), Value::String(group));
    step_json.insert("action".to_string(), Value::String(action));

    let step: StepCommand = serde_json::from_value(Value::Object(step_json))
        .map_err(|e| Error::Validation(format!("Invalid step: {}", e)))?;

    let session_checkpoint = resolve_session(&state, &req.session_id).await?;
    let checkpoint = req.checkpoint_id.clone().or(session_checkpoint);

    let command = step_command_string(&step, checkpoint.as_deref());
    let context = build_context(checkpoint, req.timeout, HashMap::new());

    info!(
        request_id = %context.request_id,
        command = %step.command(),
        subcommand = %step.subcommand(),
        "execute step"
    );
    let result = state
        .executor
        .execute(&command, &context, req.output_format)
        .await?;

    state.metrics.record_command(result.success);
    Ok(Json(sanitize(result, &state)))
}

pub async fn execute_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    if req.commands.is_empty() {
        return Err(ApiError(Error::validation("commands must not be empty")));
    }

    let checkpoint = resolve_session(&state, &req.session_id).await?;
    let context = build_context(checkpoint, req.timeout, HashMap::new());

    info!(
        request_id = %context.request_id,
        count = req.commands.len(),
        "execute batch"
    );
    let results = state
        .executor
        .execute_batch(&req.commands, &context, req.output_format)
        .await;

    let total = results.len();
    let succeeded = results.iter().filter(|r| r.success).count();
    for result in &results {
        state.metrics.record_command(result.success);
    }

    let results = results
        .into_iter()
        .map(|r| sanitize(r, &state))
        .collect();

    Ok(Json(BatchResponse {
        results,
        total,
        succeeded,
        failed: total - succeeded,
    }))
}

/// Server-sent events stream of the command's stdout, one event per line.
/// A failing command ends with an `ERROR: ...` line before the stream
/// closes.
pub async fn stream_command(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let checkpoint = resolve_session(&state, &req.session_id).await?;
    let mut context = build_context(checkpoint, req.timeout, req.environment);
    context.stream_output = true;

    info!(request_id = %context.request_id, "stream command");
    let rx = state
        .executor
        .execute_stream(&req.command, &context, req.output_format)
        .await?;

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok(Event::default().data(line)), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn list_commands(
    State(state): State<AppState>,
    Query(query): Query<ListCommandsQuery>,
) -> Result<Json<Value>, ApiError> {
    let commands = state.executor.available_commands(query.refresh).await?;
    Ok(Json(commands))
}
