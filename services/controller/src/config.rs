//! Configuration for the controller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::worker::WorkerConfig;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Interval between full resyncs of every fleet.
    pub resync_interval: Duration,

    /// Delay before the first requeue of a failing fleet.
    pub requeue_base: Duration,

    /// Cap on requeue delays.
    pub requeue_max: Duration,

    /// JSON file of fleets to seed the store with.
    pub manifest: Option<PathBuf>,

    /// Namespace for manifest entries that do not name one.
    pub namespace: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let resync_interval =
            Duration::from_secs(parse_or(&lookup, "FLEET_RESYNC_INTERVAL_SECS", 30)?);
        let requeue_base = Duration::from_millis(parse_or(&lookup, "FLEET_REQUEUE_BASE_MS", 1000)?);
        let requeue_max = Duration::from_secs(parse_or(&lookup, "FLEET_REQUEUE_MAX_SECS", 300)?);

        if resync_interval.is_zero() {
            anyhow::bail!("FLEET_RESYNC_INTERVAL_SECS must be positive");
        }

        let manifest = lookup("FLEET_MANIFEST")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let namespace = lookup("FLEET_NAMESPACE")
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "default".to_string());

        Ok(Self {
            log_level,
            resync_interval,
            requeue_base,
            requeue_max,
            manifest,
            namespace,
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            resync_interval: self.resync_interval,
            requeue_base: self.requeue_base,
            requeue_max: self.requeue_max,
        }
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {value:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert_eq!(config.requeue_base, Duration::from_secs(1));
        assert_eq!(config.requeue_max, Duration::from_secs(300));
        assert_eq!(config.manifest, None);
        assert_eq!(config.namespace, "default");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FLEET_LOG_LEVEL", "debug"),
            ("FLEET_RESYNC_INTERVAL_SECS", "5"),
            ("FLEET_REQUEUE_BASE_MS", "250"),
            ("FLEET_MANIFEST", "/etc/fleet/fleets.json"),
            ("FLEET_NAMESPACE", "celery"),
        ])
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.worker_config().resync_interval, Duration::from_secs(5));
        assert_eq!(config.requeue_base, Duration::from_millis(250));
        assert_eq!(
            config.manifest,
            Some(PathBuf::from("/etc/fleet/fleets.json"))
        );
        assert_eq!(config.namespace, "celery");
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("FLEET_REQUEUE_MAX_SECS", "soon")]).is_err());
        assert!(config(&[("FLEET_RESYNC_INTERVAL_SECS", "0")]).is_err());
    }
}
