// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for plugin start-up.

use crate::handshake::HandshakeError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`PluginClient::start`](crate::PluginClient::start).
///
/// None of these are retried internally. After any of them the client is
/// still safe to [`kill`](crate::PluginClient::kill).
#[derive(Debug, Error)]
pub enum StartError {
    /// The executable could not be started.
    #[error("failed to spawn plugin: {0}")]
    Spawn(#[source] std::io::Error),

    /// No handshake line arrived before the deadline. The process may still
    /// be running.
    #[error("timed out after {timeout:?} waiting for plugin handshake")]
    StartTimeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The plugin terminated before completing the handshake.
    #[error("plugin exited before handshake (code={code:?})")]
    ProcessExited {
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// A line arrived but is not a valid address.
    #[error("invalid handshake line {line:?}: {source}")]
    HandshakeParse {
        /// The offending line, trimmed.
        line: String,
        /// Parse failure detail.
        #[source]
        source: HandshakeError,
    },

    /// Reading the plugin's stdout failed.
    #[error("failed to read plugin stdout: {0}")]
    Stdout(#[source] std::io::Error),

    /// `start` was already called on this client and did not succeed.
    #[error("plugin was already started")]
    AlreadyStarted,

    /// The client configuration cannot be used.
    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(String),
}

impl StartError {
    /// Returns `true` for [`StartError::StartTimeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StartTimeout { .. })
    }
}
