//! Gateway configuration
//!
//! All settings come from environment variables with sensible defaults;
//! CLI flags on the binary may override the listen address and log level.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Gateway settings, resolved once at startup and injected where needed
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the api-cli binary
    pub cli_path: PathBuf,
    /// Default per-command timeout
    pub cli_timeout: Duration,
    /// Maximum concurrent CLI invocations
    pub max_concurrent: usize,
    /// Virtuoso platform API key, injected into the CLI environment
    pub virtuoso_api_key: Option<String>,
    /// Virtuoso organization id, injected into the CLI environment
    pub virtuoso_org_id: Option<String>,
    /// Path to a CLI config file, injected as VIRTUOSO_CONFIG_PATH
    pub cli_config_path: Option<String>,
    /// Accepted gateway API keys (empty disables auth)
    pub api_keys: Vec<String>,
    /// HTTP listen address
    pub listen: String,
    /// Deployment environment name (production hides CLI stderr in responses)
    pub environment: String,
    /// Sliding-window rate limit: allowed requests per window
    pub rate_limit_requests: u32,
    /// Sliding-window rate limit: window length
    pub rate_limit_period: Duration,
    /// Session lifetime
    pub session_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cli_path: PathBuf::from("./bin/api-cli"),
            cli_timeout: Duration::from_secs(300),
            max_concurrent: 4,
            virtuoso_api_key: None,
            virtuoso_org_id: None,
            cli_config_path: None,
            api_keys: Vec::new(),
            listen: "0.0.0.0:8000".to_string(),
            environment: "production".to_string(),
            rate_limit_requests: 100,
            rate_limit_period: Duration::from_secs(60),
            session_ttl: Duration::from_secs(3600),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{} has invalid value: {}", key, raw))),
    }
}

impl Settings {
    /// Build settings from the process environment
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(path) = env_string("VIRTUOSO_CLI_PATH") {
            settings.cli_path = PathBuf::from(path);
        }
        if let Some(secs) = env_parse::<u64>("VIRTUOSO_CLI_TIMEOUT")? {
            settings.cli_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("VIRTUOSO_MAX_CONCURRENT")? {
            if n == 0 {
                return Err(Error::InvalidConfig(
                    "VIRTUOSO_MAX_CONCURRENT must be at least 1".to_string(),
                ));
            }
            settings.max_concurrent = n;
        }

        settings.virtuoso_api_key = env_string("VIRTUOSO_API_KEY");
        settings.virtuoso_org_id = env_string("VIRTUOSO_ORG_ID");
        settings.cli_config_path = env_string("VIRTUOSO_CONFIG_PATH");

        if let Some(keys) = env_string("GATEWAY_API_KEYS") {
            settings.api_keys = keys
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if let Some(listen) = env_string("GATEWAY_LISTEN") {
            settings.listen = listen;
        }
        if let Some(environment) = env_string("GATEWAY_ENVIRONMENT") {
            settings.environment = environment;
        }
        if let Some(n) = env_parse::<u32>("RATE_LIMIT_REQUESTS")? {
            settings.rate_limit_requests = n;
        }
        if let Some(secs) = env_parse::<u64>("RATE_LIMIT_PERIOD")? {
            settings.rate_limit_period = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("SESSION_TTL_SECS")? {
            settings.session_ttl = Duration::from_secs(secs);
        }

        Ok(settings)
    }

    /// Environment overrides injected into every CLI invocation
    pub fn cli_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(key) = &self.virtuoso_api_key {
            env.insert("VIRTUOSO_API_KEY".to_string(), key.clone());
        }
        if let Some(org) = &self.virtuoso_org_id {
            env.insert("VIRTUOSO_ORG_ID".to_string(), org.clone());
        }
        if let Some(path) = &self.cli_config_path {
            env.insert("VIRTUOSO_CONFIG_PATH".to_string(), path.clone());
        }
        env
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.cli_timeout, Duration::from_secs(300));
        assert_eq!(s.max_concurrent, 4);
        assert!(s.api_keys.is_empty());
        assert!(s.is_production());
    }

    #[test]
    fn cli_env_only_contains_configured_values() {
        let mut s = Settings::default();
        assert!(s.cli_env().is_empty());

        s.virtuoso_api_key = Some("key-123".to_string());
        s.cli_config_path = Some("/etc/virtuoso.yaml".to_string());
        let env = s.cli_env();
        assert_eq!(env.get("VIRTUOSO_API_KEY").map(String::as_str), Some("key-123"));
        assert_eq!(
            env.get("VIRTUOSO_CONFIG_PATH").map(String::as_str),
            Some("/etc/virtuoso.yaml")
        );
        assert!(!env.contains_key("VIRTUOSO_ORG_ID"));
    }
}
