//! Command string parsing and validation
//!
//! Turns a free-form command string into its components and enforces the
//! structural prerequisites (checkpoint id for step commands) before a
//! subprocess is spent on it. Deeper per-subcommand argument validation is
//! left to the CLI binary itself.

use std::path::Path;

use virtuoso_common::{CommandContext, Error, OutputFormat, ParsedCommand, Result};

/// Commands that require a checkpoint id, either explicit in the argument
/// list or supplied through the context's session id. Closed set; everything
/// else takes plain positional arguments.
pub const CHECKPOINT_COMMANDS: &[&str] = &[
    "step-assert",
    "step-interact",
    "step-navigate",
    "step-window",
    "step-data",
    "step-dialog",
    "step-wait",
    "step-file",
    "step-misc",
    "library",
];

/// Whether a command name belongs to the checkpoint-scoped set
pub fn is_checkpoint_command(command: &str) -> bool {
    CHECKPOINT_COMMANDS.contains(&command)
}

/// Parse a command string into (command, subcommand, checkpoint-id, args).
///
/// Shell-word splitting semantics: quoted substrings stay single tokens, so
/// `write "hello world"` yields one `hello world` argument. A leading
/// `api-cli ` prefix is stripped if present.
pub fn parse_command(command: &str) -> Result<ParsedCommand> {
    let command = command.trim();
    if command.is_empty() {
        return Err(Error::validation("Empty command"));
    }

    let command = command.strip_prefix("api-cli ").unwrap_or(command);

    let parts = shell_words::split(command)
        .map_err(|e| Error::Validation(format!("Malformed command string: {}", e)))?;
    let Some((cmd, rest)) = parts.split_first() else {
        return Err(Error::validation("No command specified"));
    };

    let mut subcommand = None;
    let mut checkpoint_id = None;
    let mut args = Vec::new();

    if is_checkpoint_command(cmd) {
        if let Some((sub, rest)) = rest.split_first() {
            subcommand = Some(sub.clone());
            match rest.split_first() {
                // A purely numeric third token is the checkpoint id
                Some((maybe_id, tail))
                    if !maybe_id.is_empty() && maybe_id.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    checkpoint_id = Some(maybe_id.clone());
                    args = tail.to_vec();
                }
                _ => args = rest.to_vec(),
            }
        }
    } else {
        args = rest.to_vec();
    }

    Ok(ParsedCommand {
        command: cmd.clone(),
        subcommand,
        checkpoint_id,
        args,
    })
}

/// Validate a parsed command against its execution context.
///
/// Step commands must resolve a checkpoint id from the parsed command or the
/// context's session id; `library` may act without one (listing or getting a
/// step by its own id).
pub fn validate_command(parsed: &ParsedCommand, context: Option<&CommandContext>) -> Result<()> {
    if is_checkpoint_command(&parsed.command) {
        let checkpoint_id = parsed
            .checkpoint_id
            .as_deref()
            .or_else(|| context.and_then(|c| c.session_id.as_deref()));

        if checkpoint_id.is_none() && parsed.command != "library" {
            return Err(Error::Validation(format!(
                "Command '{}' requires checkpoint ID. \
                 Provide it explicitly or set VIRTUOSO_SESSION_ID",
                parsed.command
            )));
        }
    }

    Ok(())
}

/// Assemble the final argv list for the CLI binary.
///
/// Pure function: `[cli_path, command, subcommand?, checkpoint_id?, ...args]`
/// plus `--output <format>` unless the raw sentinel is requested.
pub fn build_command_args(
    cli_path: &Path,
    parsed: &ParsedCommand,
    output_format: OutputFormat,
) -> Vec<String> {
    let mut argv = vec![
        cli_path.to_string_lossy().to_string(),
        parsed.command.clone(),
    ];

    if let Some(sub) = &parsed.subcommand {
        argv.push(sub.clone());
    }
    if let Some(id) = &parsed.checkpoint_id {
        argv.push(id.clone());
    }
    argv.extend(parsed.args.iter().cloned());

    if output_format != OutputFormat::Raw {
        argv.push("--output".to_string());
        argv.push(output_format.as_str().to_string());
    }

    argv
}
