// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading, validation, and merging for the plugin supervisor.
//!
//! This crate provides [`SupervisorConfig`] (supervisor-wide defaults plus
//! named plugin definitions) together with helpers for loading from TOML
//! files, applying environment overrides, merging overlays, and producing
//! advisory [`ConfigWarning`]s. [`SupervisorConfig::client_config`] turns a
//! named entry into a ready-to-use [`plugin_host::ClientConfig`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

use plugin_host::{ClientConfig, CommandSpec, PortRange};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// No plugin with the requested name is configured.
    #[error("unknown plugin '{name}'")]
    UnknownPlugin {
        /// Name that was requested.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No plugins are defined.
    NoPlugins,
    /// A timeout is unusually large.
    LargeTimeout {
        /// Where the timeout was set (`"start_timeout_ms"` or a plugin name).
        scope: String,
        /// Timeout value in milliseconds.
        millis: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NoPlugins => f.write_str("no plugins are configured"),
            ConfigWarning::LargeTimeout { scope, millis } => {
                write!(f, "{scope} has a large timeout ({millis}ms)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level supervisor configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Default handshake deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timeout_ms: Option<u64>,

    /// Grace period between graceful and forceful kill, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_grace_ms: Option<u64>,

    /// Lowest port plugins may bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_port: Option<u16>,

    /// Highest port plugins may bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_port: Option<u16>,

    /// Named plugin definitions.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginEntry>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            start_timeout_ms: None,
            kill_grace_ms: None,
            min_port: None,
            max_port: None,
            plugins: BTreeMap::new(),
        }
    }
}

/// Configuration for a single plugin executable.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PluginEntry {
    /// Command to spawn.
    pub command: String,
    /// Extra CLI arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Per-plugin handshake deadline in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timeout_ms: Option<u64>,
}

impl PluginEntry {
    /// Entry running `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            start_timeout_ms: None,
        }
    }

    /// The [`CommandSpec`] this entry describes.
    pub fn command_spec(&self) -> CommandSpec {
        CommandSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }
}

impl SupervisorConfig {
    /// Build a [`ClientConfig`] for an ad-hoc command using the supervisor
    /// defaults.
    pub fn client_config_for(&self, command: CommandSpec) -> ClientConfig {
        let mut cfg = ClientConfig::new(command).with_port_range(self.port_range());
        cfg.start_timeout = self.start_timeout_ms.map(Duration::from_millis);
        cfg.kill_grace = self.kill_grace_ms.map(Duration::from_millis);
        cfg
    }

    /// Resolve the named plugin into a [`ClientConfig`]. A per-plugin start
    /// timeout overrides the global one.
    pub fn client_config(&self, name: &str) -> Result<ClientConfig, ConfigError> {
        let entry = self
            .plugins
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPlugin { name: name.into() })?;
        let mut cfg = self.client_config_for(entry.command_spec());
        if let Some(ms) = entry.start_timeout_ms {
            cfg.start_timeout = Some(Duration::from_millis(ms));
        }
        Ok(cfg)
    }

    /// Port range from `min_port`/`max_port`, each falling back to the
    /// default bound.
    pub fn port_range(&self) -> PortRange {
        let default = PortRange::default();
        PortRange {
            min: self.min_port.unwrap_or(default.min),
            max: self.max_port.unwrap_or(default.max),
        }
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed timeout in milliseconds (24 hours).
const MAX_TIMEOUT_MS: u64 = 86_400_000;

/// Threshold above which a timeout generates a warning (1 hour).
const LARGE_TIMEOUT_THRESHOLD_MS: u64 = 3_600_000;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`SupervisorConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`SupervisorConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<SupervisorConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => SupervisorConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`SupervisorConfig`].
pub fn parse_toml(content: &str) -> Result<SupervisorConfig, ConfigError> {
    toml::from_str::<SupervisorConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `PLUGCTL_LOG_LEVEL`
/// - `PLUGCTL_START_TIMEOUT_MS`
/// - `PLUGCTL_KILL_GRACE_MS`
///
/// Non-numeric timeout values are ignored.
pub fn apply_env_overrides(config: &mut SupervisorConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut SupervisorConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("PLUGCTL_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(ms) = lookup("PLUGCTL_START_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.start_timeout_ms = Some(ms);
    }
    if let Some(ms) = lookup("PLUGCTL_KILL_GRACE_MS").and_then(|v| v.parse().ok()) {
        config.kill_grace_ms = Some(ms);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (empty commands, out-of-range timeouts, inverted port
/// ranges) are returned as a [`ConfigError::ValidationError`]; soft issues
/// come back as warnings.
pub fn validate_config(config: &SupervisorConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    check_timeout(
        "start_timeout_ms",
        config.start_timeout_ms,
        &mut errors,
        &mut warnings,
    );
    check_timeout(
        "kill_grace_ms",
        config.kill_grace_ms,
        &mut errors,
        &mut warnings,
    );

    let range = config.port_range();
    if range.min == 0 {
        errors.push("min_port must be at least 1".into());
    } else if range.min > range.max {
        errors.push(format!(
            "min_port {} is greater than max_port {}",
            range.min, range.max
        ));
    }

    for (name, plugin) in &config.plugins {
        if name.is_empty() {
            errors.push("plugin name must not be empty".into());
        }
        if plugin.command.trim().is_empty() {
            errors.push(format!("plugin '{name}': command must not be empty"));
        }
        check_timeout(
            &format!("plugin '{name}'"),
            plugin.start_timeout_ms,
            &mut errors,
            &mut warnings,
        );
    }

    if config.plugins.is_empty() {
        warnings.push(ConfigWarning::NoPlugins);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

fn check_timeout(
    scope: &str,
    value: Option<u64>,
    errors: &mut Vec<String>,
    warnings: &mut Vec<ConfigWarning>,
) {
    let Some(ms) = value else {
        return;
    };
    if ms == 0 || ms > MAX_TIMEOUT_MS {
        errors.push(format!(
            "{scope}: timeout {ms}ms out of range (1..{MAX_TIMEOUT_MS})"
        ));
    } else if ms > LARGE_TIMEOUT_THRESHOLD_MS {
        warnings.push(ConfigWarning::LargeTimeout {
            scope: scope.to_string(),
            millis: ms,
        });
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations. Values in `overlay` take precedence over `base`.
///
/// Plugin maps are combined; on name collisions the overlay entry wins.
pub fn merge_configs(base: SupervisorConfig, overlay: SupervisorConfig) -> SupervisorConfig {
    let mut plugins = base.plugins;
    plugins.extend(overlay.plugins);
    SupervisorConfig {
        log_level: overlay.log_level.or(base.log_level),
        start_timeout_ms: overlay.start_timeout_ms.or(base.start_timeout_ms),
        kill_grace_ms: overlay.kill_grace_ms.or(base.kill_grace_ms),
        min_port: overlay.min_port.or(base.min_port),
        max_port: overlay.max_port.or(base.max_port),
        plugins,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
