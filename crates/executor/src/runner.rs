//! Subprocess execution of CLI commands
//!
//! One `CliExecutor` handle is built at startup from settings and shared by
//! the web layer. Every invocation spawns the CLI binary fresh with piped
//! stdout/stderr; concurrency is bounded by a semaphore so a burst of
//! requests cannot fork-bomb the host.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use virtuoso_common::{
    CommandContext, CommandResult, Error, OutputFormat, Result, Settings,
};

use crate::output::{describe_exit, parse_output};
use crate::parse::{build_command_args, parse_command, validate_command};

/// Buffered lines in flight between the reader task and a streaming consumer
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// How long a timed-out command gets to flush its pipes before the partial
/// output is abandoned
const PIPE_GRACE: Duration = Duration::from_millis(250);

/// Handle for running CLI commands as subprocesses
pub struct CliExecutor {
    cli_path: PathBuf,
    default_timeout: Duration,
    cli_env: HashMap<String, String>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    commands_cache: Mutex<Option<Value>>,
}

impl CliExecutor {
    /// Build an executor, verifying the CLI binary up front so a bad path
    /// fails at startup rather than on the first request.
    pub fn new(settings: &Settings) -> Result<Self> {
        let cli_path = settings.cli_path.clone();

        let meta = std::fs::metadata(&cli_path).map_err(|e| {
            Error::CliUnavailable(format!("{}: {}", cli_path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(Error::CliUnavailable(format!(
                "{} is not a regular file",
                cli_path.display()
            )));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if meta.permissions().mode() & 0o111 == 0 {
                return Err(Error::CliUnavailable(format!(
                    "{} is not executable",
                    cli_path.display()
                )));
            }
        }

        info!(
            cli_path = %cli_path.display(),
            max_concurrent = settings.max_concurrent,
            "CLI executor ready"
        );

        Ok(Self {
            cli_path,
            default_timeout: settings.cli_timeout,
            cli_env: settings.cli_env(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent)),
            max_concurrent: settings.max_concurrent,
            commands_cache: Mutex::new(None),
        })
    }

    /// Wait for all in-flight invocations to finish and stop admitting new
    /// ones. Called once during graceful shutdown.
    pub async fn shutdown(&self) {
        match self.permits.acquire_many(self.max_concurrent as u32).await {
            Ok(drained) => {
                drained.forget();
                self.permits.close();
                info!("CLI executor drained");
            }
            Err(_) => debug!("CLI executor already closed"),
        }
    }

    fn timeout_for(&self, context: &CommandContext) -> Duration {
        context.timeout.unwrap_or(self.default_timeout)
    }

    fn configure(&self, argv: &[String], context: &CommandContext) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Inherited env, then settings-level credentials, then per-request
        // overrides, then the session id. Later layers win.
        cmd.envs(&self.cli_env);
        cmd.envs(&context.environment);
        if let Some(session_id) = &context.session_id {
            cmd.env("VIRTUOSO_SESSION_ID", session_id);
        }

        if let Some(dir) = &context.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    /// Execute a command string to completion and return a structured result.
    ///
    /// A CLI failure (non-zero exit) is a successful call returning a failed
    /// result; an `Err` here means the command never ran to completion:
    /// validation rejected it, or it timed out and was killed.
    pub async fn execute(
        &self,
        command: &str,
        context: &CommandContext,
        output_format: OutputFormat,
    ) -> Result<CommandResult> {
        let parsed = parse_command(command)?;
        validate_command(&parsed, Some(context))?;
        let argv = build_command_args(&self.cli_path, &parsed, output_format);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("executor is shut down".to_string()))?;

        let timeout = self.timeout_for(context);
        let started = Instant::now();

        debug!(
            request_id = %context.request_id,
            command = %parsed.command,
            "spawning CLI"
        );

        let mut child = match self.configure(&argv, context).spawn() {
            Ok(child) => child,
            Err(e) => {
                // Spawn failures become a failed result with the sentinel
                // exit code, matching how CLI-level failures surface.
                warn!(request_id = %context.request_id, error = %e, "CLI spawn failed");
                return Ok(internal_failure(argv, output_format, &e.to_string(), started));
            }
        };

        let mut io_task = drain_pipes(&mut child);

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Ok(internal_failure(argv, output_format, &e.to_string(), started));
            }
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                // Grandchildren can keep the pipe write ends open past the
                // kill, so the capture attempt gets a short grace period
                // instead of an unbounded wait
                match tokio::time::timeout(PIPE_GRACE, &mut io_task).await {
                    Ok(Ok((stdout, stderr))) => warn!(
                        request_id = %context.request_id,
                        command = %parsed.command,
                        stdout_bytes = stdout.len(),
                        stderr = %String::from_utf8_lossy(&stderr),
                        "CLI command timed out"
                    ),
                    _ => {
                        io_task.abort();
                        warn!(
                            request_id = %context.request_id,
                            command = %parsed.command,
                            "CLI command timed out, output pipes still held open"
                        );
                    }
                }
                return Err(Error::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
        };

        let (stdout_bytes, stderr_bytes) = io_task
            .await
            .map_err(|e| Error::Internal(format!("pipe reader task failed: {}", e)))?;
        let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

        let exit_code = status.code().unwrap_or(-1);
        let success = exit_code == 0;
        let duration = started.elapsed().as_secs_f64();

        let parsed_output = if output_format != OutputFormat::Raw {
            parse_output(&stdout, output_format)
        } else {
            None
        };
        let error = (!success).then(|| describe_exit(exit_code, &stderr));

        if success {
            debug!(
                request_id = %context.request_id,
                command = %parsed.command,
                duration,
                "CLI command succeeded"
            );
        } else {
            warn!(
                request_id = %context.request_id,
                command = %parsed.command,
                exit_code,
                duration,
                "CLI command failed"
            );
        }

        Ok(CommandResult {
            success,
            exit_code,
            stdout,
            stderr,
            duration,
            command: argv,
            output_format,
            parsed_output,
            error,
        })
    }

    /// Execute a command and stream its stdout line by line.
    ///
    /// Returns a receiver that yields lines as the child produces them; on a
    /// non-zero exit a final `ERROR: <description>` line is appended. Dropping
    /// the receiver cancels the command: the child is killed and reaped.
    pub async fn execute_stream(
        &self,
        command: &str,
        context: &CommandContext,
        output_format: OutputFormat,
    ) -> Result<mpsc::Receiver<String>> {
        let parsed = parse_command(command)?;
        validate_command(&parsed, Some(context))?;
        let argv = build_command_args(&self.cli_path, &parsed, output_format);

        let mut child = self.configure(&argv, context).spawn().map_err(|e| {
            Error::CliUnavailable(format!("failed to spawn {}: {}", argv[0], e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("child stderr not piped".to_string()))?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let request_id = context.request_id.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if tx.send(line).await.is_err() {
                                debug!(request_id = %request_id, "stream consumer dropped, killing CLI");
                                let _ = child.kill().await;
                                let _ = child.wait().await;
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(request_id = %request_id, error = %e, "stream read failed");
                            break;
                        }
                    },
                    // Receiver dropped while the child is quiet: cancel now
                    // rather than waiting for it to speak again
                    _ = tx.closed() => {
                        debug!(request_id = %request_id, "stream consumer dropped, killing CLI");
                        let _ = child.kill().await;
                        let _ = child.wait().await;
                        return;
                    }
                }
            }

            let mut stderr_buf = Vec::new();
            let mut stderr = stderr;
            let _ = stderr.read_to_end(&mut stderr_buf).await;

            match child.wait().await {
                Ok(status) if !status.success() => {
                    let code = status.code().unwrap_or(-1);
                    let detail = String::from_utf8_lossy(&stderr_buf);
                    let _ = tx
                        .send(format!("ERROR: {}", describe_exit(code, &detail)))
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = tx.send(format!("ERROR: {}", e)).await;
                }
            }
        });

        Ok(rx)
    }

    /// Execute several command strings concurrently, bounded by the
    /// executor's permit pool. Results come back in input order; per-command
    /// failures (including timeouts) become failed results rather than
    /// aborting the batch.
    pub async fn execute_batch(
        &self,
        commands: &[String],
        context: &CommandContext,
        output_format: OutputFormat,
    ) -> Vec<CommandResult> {
        let futures = commands.iter().map(|command| async move {
            match self.execute(command, context, output_format).await {
                Ok(result) => result,
                Err(Error::Timeout { seconds }) => CommandResult {
                    success: false,
                    exit_code: 8,
                    stdout: String::new(),
                    stderr: "Command timed out".to_string(),
                    duration: seconds as f64,
                    command: vec![command.clone()],
                    output_format,
                    parsed_output: None,
                    error: Some(describe_exit(8, "Command timed out")),
                },
                Err(e) => CommandResult {
                    success: false,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration: 0.0,
                    command: vec![command.clone()],
                    output_format,
                    parsed_output: None,
                    error: Some(e.to_string()),
                },
            }
        });

        futures::future::join_all(futures).await
    }

    /// Liveness probe for health checks: run `--version` with a short
    /// timeout. Bypasses the permit pool so a saturated executor still
    /// answers health checks.
    pub async fn probe(&self) -> bool {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        matches!(
            tokio::time::timeout(Duration::from_secs(5), cmd.status()).await,
            Ok(Ok(status)) if status.success()
        )
    }

    /// List the commands the CLI binary reports, memoized after the first
    /// successful call. `force_refresh` bypasses and repopulates the cache.
    pub async fn available_commands(&self, force_refresh: bool) -> Result<Value> {
        if !force_refresh {
            if let Some(cached) = self.commands_cache.lock().clone() {
                return Ok(cached);
            }
        }

        let context = CommandContext::new("list-commands");
        let result = self
            .execute("list-commands", &context, OutputFormat::Json)
            .await?;

        if result.success {
            if let Some(commands) = result.parsed_output {
                *self.commands_cache.lock() = Some(commands.clone());
                return Ok(commands);
            }
        }

        warn!(
            exit_code = result.exit_code,
            "CLI command listing unavailable"
        );
        Ok(Value::Object(serde_json::Map::new()))
    }
}

/// Read both pipes to EOF concurrently with the child's exit so neither
/// pipe buffer can fill and deadlock the child.
fn drain_pipes(child: &mut Child) -> tokio::task::JoinHandle<(Vec<u8>, Vec<u8>)> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let read_out = async {
            if let Some(mut pipe) = stdout {
                let _ = pipe.read_to_end(&mut out).await;
            }
            out
        };
        let read_err = async {
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_end(&mut err).await;
            }
            err
        };
        tokio::join!(read_out, read_err)
    })
}

fn internal_failure(
    argv: Vec<String>,
    output_format: OutputFormat,
    message: &str,
    started: Instant,
) -> CommandResult {
    CommandResult {
        success: false,
        exit_code: -1,
        stdout: String::new(),
        stderr: message.to_string(),
        duration: started.elapsed().as_secs_f64(),
        command: argv,
        output_format,
        parsed_output: None,
        error: Some(message.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write a fake CLI script and return settings pointing at it
    fn fake_cli(dir: &TempDir, script: &str) -> Settings {
        let path = dir.path().join("api-cli");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        write!(file, "{}", script).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Settings {
            cli_path: path,
            cli_timeout: Duration::from_secs(10),
            ..Settings::default()
        }
    }

    fn ctx() -> CommandContext {
        CommandContext::new("test-req")
    }

    #[tokio::test]
    async fn successful_command_returns_parsed_json() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo '{\"projects\": [1, 2]}'\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let result = exec
            .execute("list-projects", &ctx(), OutputFormat::Json)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(
            result.parsed_output,
            Some(serde_json::json!({"projects": [1, 2]}))
        );
        assert!(result.error.is_none());
        assert!(result.duration > 0.0);
    }

    #[tokio::test]
    async fn cli_failure_is_a_failed_result_not_an_error() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo 'checkpoint missing' >&2\nexit 5\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let result = exec
            .execute("get-checkpoint 99", &ctx(), OutputFormat::Json)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, 5);
        assert_eq!(
            result.error.as_deref(),
            Some("Resource not found: checkpoint missing")
        );
    }

    #[tokio::test]
    async fn argv_carries_subcommand_checkpoint_and_output_flag() {
        let dir = TempDir::new().unwrap();
        // Echo argv back so the test can see what the CLI received
        let settings = fake_cli(&dir, "echo \"$@\"\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let result = exec
            .execute(
                "step-navigate to 12345 https://example.com",
                &ctx(),
                OutputFormat::Human,
            )
            .await
            .unwrap();

        assert_eq!(
            result.stdout.trim(),
            "step-navigate to 12345 https://example.com --output human"
        );
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "sleep 30\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let context = ctx().with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let err = exec
            .execute("slow-command", &context, OutputFormat::Json)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        // Well under the 30s the script wanted
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn validation_failure_skips_the_subprocess() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo should-not-run\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let err = exec
            .execute("step-interact click button", &ctx(), OutputFormat::Json)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn session_id_is_injected_into_the_environment() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo \"session=$VIRTUOSO_SESSION_ID\"\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let context = ctx().with_session("777");
        let result = exec
            .execute("whoami", &context, OutputFormat::Raw)
            .await
            .unwrap();

        assert_eq!(result.stdout.trim(), "session=777");
    }

    #[tokio::test]
    async fn context_environment_overrides_settings_env() {
        let dir = TempDir::new().unwrap();
        let mut settings = fake_cli(&dir, "echo \"key=$VIRTUOSO_API_KEY\"\n");
        settings.virtuoso_api_key = Some("settings-key".to_string());
        let exec = CliExecutor::new(&settings).unwrap();

        let context = ctx().with_env("VIRTUOSO_API_KEY", "request-key");
        let result = exec
            .execute("whoami", &context, OutputFormat::Raw)
            .await
            .unwrap();

        assert_eq!(result.stdout.trim(), "key=request-key");
    }

    #[tokio::test]
    async fn probe_reflects_version_exit_status() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "exit 0\n");
        let exec = CliExecutor::new(&settings).unwrap();
        assert!(exec.probe().await);

        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "exit 4\n");
        let exec = CliExecutor::new(&settings).unwrap();
        assert!(!exec.probe().await);
    }

    #[tokio::test]
    async fn missing_binary_fails_at_construction() {
        let settings = Settings {
            cli_path: PathBuf::from("/nonexistent/api-cli"),
            ..Settings::default()
        };
        assert!(matches!(
            CliExecutor::new(&settings),
            Err(Error::CliUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn stream_yields_lines_then_error_marker_on_failure() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo one\necho two\necho boom >&2\nexit 1\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let mut rx = exec
            .execute_stream("run-suite", &ctx(), OutputFormat::Raw)
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }

        assert_eq!(lines[0], "one");
        assert_eq!(lines[1], "two");
        assert_eq!(lines[2], "ERROR: General error: boom");
    }

    #[tokio::test]
    async fn dropping_the_stream_receiver_kills_the_child() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("pid");
        let script = format!(
            "echo $$ > {}\necho started\nsleep 30\n",
            pidfile.display()
        );
        let settings = fake_cli(&dir, &script);
        let exec = CliExecutor::new(&settings).unwrap();

        let mut rx = exec
            .execute_stream("run-suite", &ctx(), OutputFormat::Raw)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("started"));

        let pid: u32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        drop(rx);

        // The reader task must kill and reap the child even though it is
        // sitting silently in its sleep
        let deadline = Instant::now() + Duration::from_secs(5);
        while std::path::Path::new(&format!("/proc/{}", pid)).exists() {
            assert!(
                Instant::now() < deadline,
                "CLI child still running after the stream consumer dropped"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn stream_ends_cleanly_on_success() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo done\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let mut rx = exec
            .execute_stream("run-suite", &ctx(), OutputFormat::Raw)
            .await
            .unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("done"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let dir = TempDir::new().unwrap();
        // Sleep inversely to position so completion order differs from input
        let settings = fake_cli(
            &dir,
            "case \"$1\" in first) sleep 0.3; echo first;; second) echo second;; esac\n",
        );
        let exec = CliExecutor::new(&settings).unwrap();

        let commands = vec!["first".to_string(), "second".to_string()];
        let results = exec
            .execute_batch(&commands, &ctx(), OutputFormat::Raw)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].stdout.trim(), "first");
        assert_eq!(results[1].stdout.trim(), "second");
    }

    #[tokio::test]
    async fn batch_timeout_becomes_a_failed_item() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "case \"$1\" in hang) sleep 30;; *) echo ok;; esac\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let context = ctx().with_timeout(Duration::from_millis(200));
        let commands = vec!["hang".to_string(), "fine".to_string()];
        let results = exec
            .execute_batch(&commands, &context, OutputFormat::Raw)
            .await;

        assert!(!results[0].success);
        assert_eq!(results[0].exit_code, 8);
        assert_eq!(results[0].stderr, "Command timed out");
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn batch_invalid_command_becomes_a_failed_item() {
        let dir = TempDir::new().unwrap();
        let settings = fake_cli(&dir, "echo ok\n");
        let exec = CliExecutor::new(&settings).unwrap();

        let commands = vec![
            "step-interact click button".to_string(),
            "list-projects".to_string(),
        ];
        let results = exec
            .execute_batch(&commands, &ctx(), OutputFormat::Raw)
            .await;

        assert!(!results[0].success);
        assert_eq!(results[0].exit_code, -1);
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn available_commands_is_cached_until_refresh() {
        let dir = TempDir::new().unwrap();
        // Count invocations through a side file
        let marker = dir.path().join("count");
        let script = format!(
            "echo x >> {}\necho '{{\"commands\": [\"list-projects\"]}}'\n",
            marker.display()
        );
        let settings = fake_cli(&dir, &script);
        let exec = CliExecutor::new(&settings).unwrap();

        let first = exec.available_commands(false).await.unwrap();
        let second = exec.available_commands(false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 1);

        exec.available_commands(true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap().lines().count(), 2);
    }
}
