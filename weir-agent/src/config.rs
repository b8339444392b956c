//! Agent configuration
//!
//! Defines the configurable parameters of the agent: where the desired
//! pipelines come from, how often they are re-read, and engine defaults.

use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const PIPELINES_FILE_VAR: &str = "WEIR_PIPELINES_FILE";
pub const RELOAD_AUTOMATIC_VAR: &str = "WEIR_RELOAD_AUTOMATIC";
pub const RELOAD_INTERVAL_VAR: &str = "WEIR_RELOAD_INTERVAL";
pub const BATCH_SIZE_VAR: &str = "WEIR_BATCH_SIZE";

/// Agent configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// YAML manifest listing the desired pipelines
    pub pipelines_file: PathBuf,

    /// Whether converge cycles repeat every `reload_interval`
    pub reload_automatic: bool,

    /// Period between automatic converge cycles
    pub reload_interval: Duration,

    /// Events per batch for pipelines that do not set `pipeline.batch.size`
    pub batch_size: u64,
}

impl AgentConfig {
    /// Creates a configuration with defaults
    pub fn new(pipelines_file: impl Into<PathBuf>) -> Self {
        Self {
            pipelines_file: pipelines_file.into(),
            reload_automatic: false,
            reload_interval: Duration::from_secs(3),
            batch_size: 125,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WEIR_PIPELINES_FILE (optional, default: pipelines.yml)
    /// - WEIR_RELOAD_AUTOMATIC (optional, default: false)
    /// - WEIR_RELOAD_INTERVAL (optional, seconds, default: 3)
    /// - WEIR_BATCH_SIZE (optional, default: 125)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates configuration from any variable lookup
    ///
    /// Unset variables fall back to defaults; set but unparsable ones are
    /// errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup(PIPELINES_FILE_VAR) {
            config.pipelines_file = PathBuf::from(path);
        }
        if let Some(automatic) = parse_var::<bool>(&lookup, RELOAD_AUTOMATIC_VAR)? {
            config.reload_automatic = automatic;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, RELOAD_INTERVAL_VAR)? {
            config.reload_interval = Duration::from_secs(secs);
        }
        if let Some(batch_size) = parse_var::<u64>(&lookup, BATCH_SIZE_VAR)? {
            config.batch_size = batch_size;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipelines_file.as_os_str().is_empty() {
            anyhow::bail!("pipelines_file cannot be empty");
        }

        if self.reload_interval.is_zero() {
            anyhow::bail!("reload_interval must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("pipelines.yml")
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: '{}'", name, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.pipelines_file, PathBuf::from("pipelines.yml"));
        assert!(!config.reload_automatic);
        assert_eq!(config.reload_interval, Duration::from_secs(3));
        assert_eq!(config.batch_size, 125);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = AgentConfig::from_lookup(lookup(&[
            (PIPELINES_FILE_VAR, "/etc/weir/pipelines.yml"),
            (RELOAD_AUTOMATIC_VAR, "true"),
            (RELOAD_INTERVAL_VAR, "10"),
            (BATCH_SIZE_VAR, "500"),
        ]))
        .unwrap();

        assert_eq!(config.pipelines_file, PathBuf::from("/etc/weir/pipelines.yml"));
        assert!(config.reload_automatic);
        assert_eq!(config.reload_interval, Duration::from_secs(10));
        assert_eq!(config.batch_size, 500);
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AgentConfig::from_lookup(lookup(&[(RELOAD_AUTOMATIC_VAR, "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains(RELOAD_AUTOMATIC_VAR));

        assert!(AgentConfig::from_lookup(lookup(&[(RELOAD_INTERVAL_VAR, "0")])).is_err());
        assert!(AgentConfig::from_lookup(lookup(&[(RELOAD_INTERVAL_VAR, "-1")])).is_err());
        assert!(AgentConfig::from_lookup(lookup(&[(BATCH_SIZE_VAR, "0")])).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_ok());

        config.pipelines_file = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
