//! Configuration for the image sweeper.
//!
//! Everything is read once from `SWEEP_*` environment variables at startup.
//! Unset variables take their defaults; malformed values are errors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::policy::{ExclusionRules, PolicyConfig};

/// Default Docker Engine socket.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Default per-call runtime deadline in seconds.
pub const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 30;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => bail!("unknown log format '{}' (expected json or pretty)", other),
        }
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deletion policy.
    pub policy: PolicyConfig,

    /// Path of the Docker Engine Unix socket.
    pub docker_socket: PathBuf,

    /// Engine API version used as a path prefix, e.g. `1.43`.
    pub docker_api_version: Option<String>,

    /// Deadline for each non-streaming runtime call.
    pub runtime_timeout: Duration,

    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    ///
    /// A variable set to an empty or blank value counts as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retention_secs = match lookup("SWEEP_RETENTION_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid SWEEP_RETENTION_SECS '{}'", raw))?,
            None => PolicyConfig::DEFAULT_RETENTION_SECS,
        };

        let prune_dangling = optional_bool(&lookup, "SWEEP_PRUNE_DANGLING")?.unwrap_or(true);
        let enforcing = optional_bool(&lookup, "SWEEP_ENFORCING")?.unwrap_or(false);

        let list = |key: &str| {
            lookup(key)
                .map(|raw| ExclusionRules::parse_list(&raw))
                .unwrap_or_default()
        };
        let exclusions = ExclusionRules {
            name_prefixes: list("SWEEP_EXCLUDE_NAME_PREFIX"),
            name_suffixes: list("SWEEP_EXCLUDE_NAME_SUFFIX"),
            tag_prefixes: list("SWEEP_EXCLUDE_TAG_PREFIX"),
            tag_suffixes: list("SWEEP_EXCLUDE_TAG_SUFFIX"),
            label_values: list("SWEEP_EXCLUDE_LABEL"),
        };

        let docker_socket = lookup("SWEEP_DOCKER_SOCKET")
            .unwrap_or_else(|| DEFAULT_DOCKER_SOCKET.to_string())
            .into();

        let docker_api_version = lookup("SWEEP_DOCKER_API_VERSION")
            .map(|v| v.trim().trim_start_matches('v').to_string())
            .filter(|v| !v.is_empty());

        let runtime_timeout_secs = match lookup("SWEEP_RUNTIME_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid SWEEP_RUNTIME_TIMEOUT_SECS '{}'", raw))?,
            None => DEFAULT_RUNTIME_TIMEOUT_SECS,
        };
        if runtime_timeout_secs == 0 {
            bail!("SWEEP_RUNTIME_TIMEOUT_SECS must be greater than zero");
        }

        let log_level = lookup("SWEEP_LOG_LEVEL")
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| "info".to_string());

        let log_format = match lookup("SWEEP_LOG_FORMAT") {
            Some(raw) => raw.parse().context("invalid SWEEP_LOG_FORMAT")?,
            None => LogFormat::default(),
        };

        Ok(Self {
            policy: PolicyConfig {
                retention_secs,
                enforcing,
                prune_dangling,
                exclusions,
            },
            docker_socket,
            docker_api_version,
            runtime_timeout: Duration::from_secs(runtime_timeout_secs),
            log_level,
            log_format,
        })
    }
}

fn optional_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| parse_bool(&raw).with_context(|| format!("invalid {} '{}'", key, raw)))
        .transpose()
}

/// Parse a boolean flag: `1/true/yes/on` or `0/false/no/off`, any case.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}
