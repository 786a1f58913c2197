use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::search::policy::PolicyKind;
use crate::search::ready::LOADING_TIMEOUT;

/// Search engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SpacefinderConfig {
    /// A/B switch between the legacy and current proximity tests.
    pub policy: PolicyKind,
    pub ready_timeout: Duration,
    pub debug: bool,
    pub rust_log: String,
}

impl Default for SpacefinderConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            ready_timeout: LOADING_TIMEOUT,
            debug: false,
            rust_log: "info".to_string(),
        }
    }
}

impl SpacefinderConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(SpacefinderConfig {
            policy: std::env::var("SPACEFINDER_POLICY")
                .unwrap_or_else(|_| "current".to_string())
                .parse::<PolicyKind>()
                .context("SPACEFINDER_POLICY must be 'current' or 'legacy'")?,
            ready_timeout: Duration::from_millis(
                std::env::var("SPACEFINDER_READY_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse::<u64>()
                    .context("SPACEFINDER_READY_TIMEOUT_MS must be a whole number of milliseconds")?,
            ),
            debug: parse_flag(&std::env::var("SPACEFINDER_DEBUG").unwrap_or_default())
                .context("SPACEFINDER_DEBUG must be a boolean flag")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Configuration for the `spacefinder` binary. Fails at startup if required
/// variables are missing.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub page_fixture: PathBuf,
    pub passes_file: PathBuf,
    pub spacefinder: SpacefinderConfig,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        let spacefinder = SpacefinderConfig::from_env()?;
        Ok(CliConfig {
            page_fixture: require_env("PAGE_FIXTURE")?.into(),
            passes_file: require_env("PLACEMENT_PASSES")?.into(),
            spacefinder,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => anyhow::bail!("unrecognised flag value '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag("").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(parse_flag(" TRUE ").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SpacefinderConfig::default();
        assert_eq!(config.policy, PolicyKind::Current);
        assert_eq!(config.ready_timeout, Duration::from_millis(5000));
        assert!(!config.debug);
    }
}
