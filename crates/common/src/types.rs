//! Core types shared across the gateway

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Output formats the CLI binary can be asked for.
///
/// `Raw` is the unformatted sentinel: no `--output` flag is passed and the
/// stdout is returned untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Human,
    Ai,
    Raw,
}

impl OutputFormat {
    /// The value passed to the CLI `--output` flag
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Human => "human",
            OutputFormat::Ai => "ai",
            OutputFormat::Raw => "raw",
        }
    }
}

/// Context for one logical command execution.
///
/// Created per incoming request, immutable after construction, never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Request id for correlation
    pub request_id: String,
    /// Session (checkpoint) id; injected as VIRTUOSO_SESSION_ID
    pub session_id: Option<String>,
    /// Per-call timeout override
    pub timeout: Option<Duration>,
    /// Extra environment overrides for the child process
    pub environment: HashMap<String, String>,
    /// Working directory override
    pub working_dir: Option<PathBuf>,
    /// Whether output should stream line-by-line
    pub stream_output: bool,
}

impl CommandContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// A command string decomposed into its components.
///
/// Pure function of the input string; no shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub command: String,
    pub subcommand: Option<String>,
    pub checkpoint_id: Option<String>,
    pub args: Vec<String>,
}

/// Structured outcome of one CLI invocation.
///
/// Invariant: `success == (exit_code == 0)`; `error` is set iff the
/// invocation failed. Internal failures (spawn errors) carry `exit_code
/// == -1` with the error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in seconds
    pub duration: f64,
    /// The argv actually executed
    pub command: Vec<String>,
    pub output_format: OutputFormat,
    pub parsed_output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// An API session binding a checkpoint id to a time-bounded context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub checkpoint_id: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    pub last_used_at: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
