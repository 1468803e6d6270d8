// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client configuration: command, deadlines, stdin wiring and port range.

use crate::CommandSpec;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

/// Handshake deadline used when none is configured.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);

/// Time between the graceful termination request and the forceful kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Environment variable carrying the lowest port the plugin may listen on.
pub const ENV_MIN_PORT: &str = "PLUGIN_MIN_PORT";

/// Environment variable carrying the highest port the plugin may listen on.
pub const ENV_MAX_PORT: &str = "PLUGIN_MAX_PORT";

/// Where the plugin's standard input comes from.
#[derive(Debug, Clone, Default)]
pub enum StdinSource {
    /// Share the supervising process's own stdin.
    #[default]
    Inherit,
    /// Connect stdin to the null device.
    Null,
    /// Attach an explicit file handle. The handle is duplicated per spawn,
    /// so the child shares its read offset with the caller's copy.
    File(Arc<File>),
}

impl StdinSource {
    /// Wrap an open file.
    pub fn file(file: File) -> Self {
        Self::File(Arc::new(file))
    }

    pub(crate) fn to_stdio(&self) -> io::Result<Stdio> {
        match self {
            Self::Inherit => Ok(Stdio::inherit()),
            Self::Null => Ok(Stdio::null()),
            Self::File(file) => Ok(Stdio::from(file.try_clone()?)),
        }
    }
}

/// Inclusive range of TCP ports a plugin is allowed to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// Lowest allowed port.
    pub min: u16,
    /// Highest allowed port.
    pub max: u16,
}

impl PortRange {
    /// Returns `true` if `min <= max` and `min` is non-zero.
    pub fn is_valid(&self) -> bool {
        self.min != 0 && self.min <= self.max
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: 10_000,
            max: 25_000,
        }
    }
}

/// Configuration for a single [`PluginClient`](crate::PluginClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The plugin executable and its arguments.
    pub command: CommandSpec,
    /// Bound on how long the handshake line may take. `None` or zero means
    /// [`DEFAULT_START_TIMEOUT`].
    pub start_timeout: Option<Duration>,
    /// Grace period before a graceful kill escalates. `None` or zero means
    /// [`DEFAULT_KILL_GRACE`].
    pub kill_grace: Option<Duration>,
    /// Standard input for the child.
    pub stdin: StdinSource,
    /// Ports advertised to the plugin through [`ENV_MIN_PORT`] and
    /// [`ENV_MAX_PORT`].
    pub port_range: PortRange,
}

impl ClientConfig {
    /// Config with defaults for everything but the command.
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            start_timeout: None,
            kill_grace: None,
            stdin: StdinSource::default(),
            port_range: PortRange::default(),
        }
    }

    /// Set the handshake deadline.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Set the kill grace period.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = Some(grace);
        self
    }

    /// Set the stdin source.
    pub fn with_stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    /// Set the advertised port range.
    pub fn with_port_range(mut self, range: PortRange) -> Self {
        self.port_range = range;
        self
    }

    /// Effective handshake deadline.
    pub fn effective_start_timeout(&self) -> Duration {
        non_zero_or(self.start_timeout, DEFAULT_START_TIMEOUT)
    }

    /// Effective kill grace period.
    pub fn effective_kill_grace(&self) -> Duration {
        non_zero_or(self.kill_grace, DEFAULT_KILL_GRACE)
    }
}

fn non_zero_or(value: Option<Duration>, default: Duration) -> Duration {
    match value {
        Some(d) if !d.is_zero() => d,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_absent_timeouts_fall_back_to_defaults() {
        let cfg = ClientConfig::new(CommandSpec::new("plugin"));
        assert_eq!(cfg.effective_start_timeout(), DEFAULT_START_TIMEOUT);
        assert_eq!(cfg.effective_kill_grace(), DEFAULT_KILL_GRACE);

        let cfg = cfg
            .with_start_timeout(Duration::ZERO)
            .with_kill_grace(Duration::ZERO);
        assert_eq!(cfg.effective_start_timeout(), DEFAULT_START_TIMEOUT);
        assert_eq!(cfg.effective_kill_grace(), DEFAULT_KILL_GRACE);
    }

    #[test]
    fn explicit_timeouts_win() {
        let cfg = ClientConfig::new(CommandSpec::new("plugin"))
            .with_start_timeout(Duration::from_millis(50))
            .with_kill_grace(Duration::from_millis(10));
        assert_eq!(cfg.effective_start_timeout(), Duration::from_millis(50));
        assert_eq!(cfg.effective_kill_grace(), Duration::from_millis(10));
    }

    #[test]
    fn port_range_validity() {
        assert!(PortRange::default().is_valid());
        assert!(PortRange { min: 5, max: 5 }.is_valid());
        assert!(!PortRange { min: 0, max: 10 }.is_valid());
        assert!(!PortRange { min: 20, max: 10 }.is_valid());
    }

    #[test]
    fn stdin_defaults_to_inherit() {
        assert!(matches!(StdinSource::default(), StdinSource::Inherit));
    }
}
