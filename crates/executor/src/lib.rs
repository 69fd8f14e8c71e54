//! Virtuoso command execution
//!
//! Everything between an accepted request and the `api-cli` subprocess:
//! parsing and validating command strings, assembling argv, running the
//! binary with bounded concurrency, and interpreting its output and exit
//! codes.

pub mod output;
pub mod parse;
pub mod runner;

pub use output::{describe_exit, parse_output};
pub use parse::{
    build_command_args, is_checkpoint_command, parse_command, validate_command,
    CHECKPOINT_COMMANDS,
};
pub use runner::CliExecutor;

use virtuoso_common::StepCommand;

/// Render a typed step as the equivalent command string, with the checkpoint
/// id in its positional slot. Arguments are shell-quoted so the string
/// round-trips through the parser.
pub fn step_command_string(step: &StepCommand, checkpoint_id: Option<&str>) -> String {
    let mut tokens = vec![step.command().to_string(), step.subcommand().to_string()];
    if let Some(id) = checkpoint_id {
        tokens.push(id.to_string());
    }
    tokens.extend(step.to_args());
    shell_words::join(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtuoso_common::commands::{InteractStep, NavigateStep};

    #[test]
    fn step_string_round_trips_through_the_parser() {
        let step = StepCommand::Interact(InteractStep::Write {
            selector: "input#name".to_string(),
            value: "hello world".to_string(),
        });
        let command = step_command_string(&step, Some("12345"));
        let parsed = parse_command(&command).unwrap();

        assert_eq!(parsed.command, "step-interact");
        assert_eq!(parsed.subcommand.as_deref(), Some("write"));
        assert_eq!(parsed.checkpoint_id.as_deref(), Some("12345"));
        assert_eq!(parsed.args, vec!["input#name", "hello world"]);
    }

    #[test]
    fn step_string_without_checkpoint_omits_the_slot() {
        let step = StepCommand::Navigate(NavigateStep::ScrollToTop);
        assert_eq!(
            step_command_string(&step, None),
            "step-navigate scroll-to-top"
        );
    }
}
