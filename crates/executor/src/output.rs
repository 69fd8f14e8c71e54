//! CLI output interpretation
//!
//! Parsing is best-effort: a malformed payload degrades to the raw string
//! instead of failing the request, since the subprocess already succeeded.

use serde_json::Value;
use tracing::warn;
use virtuoso_common::OutputFormat;

/// CLI exit codes and their meanings
const EXIT_CODES: &[(i32, &str)] = &[
    (0, "Success"),
    (1, "General error"),
    (2, "Command line parsing error"),
    (3, "Authentication error"),
    (4, "Configuration error"),
    (5, "Resource not found"),
    (6, "Validation error"),
    (7, "API error"),
    (8, "Timeout error"),
    (9, "Permission denied"),
    (127, "Command not found"),
];

/// Human-readable description of an exit code, with stderr detail appended
/// when present. Unknown codes get a generic message carrying the number.
pub fn describe_exit(exit_code: i32, stderr: &str) -> String {
    let base = EXIT_CODES
        .iter()
        .find(|(code, _)| *code == exit_code)
        .map(|(_, msg)| (*msg).to_string())
        .unwrap_or_else(|| format!("Unknown error (code: {})", exit_code));

    let detail = stderr.trim();
    if detail.is_empty() {
        base
    } else {
        format!("{}: {}", base, detail)
    }
}

/// Interpret raw stdout according to the requested format.
///
/// Blank output yields `None`. JSON and YAML are decoded into a JSON value;
/// on decode failure, and for the human/ai formats, the text is wrapped as a
/// string value so callers always get something renderable.
pub fn parse_output(output: &str, format: OutputFormat) -> Option<Value> {
    if output.trim().is_empty() {
        return None;
    }

    let value = match format {
        OutputFormat::Json => serde_json::from_str(output).unwrap_or_else(|e| {
            warn!(error = %e, "JSON decode failed, falling back to raw output");
            Value::String(output.to_string())
        }),
        OutputFormat::Yaml => serde_yaml::from_str(output).unwrap_or_else(|e| {
            warn!(error = %e, "YAML decode failed, falling back to raw output");
            Value::String(output.to_string())
        }),
        OutputFormat::Human | OutputFormat::Ai | OutputFormat::Raw => {
            Value::String(output.to_string())
        }
    };

    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_exit_codes_map_to_descriptions() {
        assert_eq!(describe_exit(0, ""), "Success");
        assert_eq!(describe_exit(5, ""), "Resource not found");
        assert_eq!(describe_exit(127, ""), "Command not found");
    }

    #[test]
    fn stderr_detail_is_appended() {
        assert_eq!(
            describe_exit(5, "checkpoint 99 not found\n"),
            "Resource not found: checkpoint 99 not found"
        );
    }

    #[test]
    fn unknown_exit_code_carries_the_number() {
        assert_eq!(describe_exit(42, ""), "Unknown error (code: 42)");
    }

    #[test]
    fn parses_json_output() {
        let parsed = parse_output(r#"{"status": "ok", "count": 3}"#, OutputFormat::Json);
        assert_eq!(parsed, Some(json!({"status": "ok", "count": 3})));
    }

    #[test]
    fn parses_yaml_output() {
        let parsed = parse_output("status: ok\ncount: 3\n", OutputFormat::Yaml);
        assert_eq!(parsed, Some(json!({"status": "ok", "count": 3})));
    }

    #[test]
    fn malformed_json_degrades_to_string() {
        let parsed = parse_output("{not json", OutputFormat::Json);
        assert_eq!(parsed, Some(Value::String("{not json".to_string())));
    }

    #[test]
    fn human_output_is_wrapped_as_string() {
        let parsed = parse_output("3 projects found", OutputFormat::Human);
        assert_eq!(parsed, Some(Value::String("3 projects found".to_string())));
    }

    #[test]
    fn blank_output_yields_none() {
        assert_eq!(parse_output("", OutputFormat::Json), None);
        assert_eq!(parse_output("  \n ", OutputFormat::Yaml), None);
    }
}
