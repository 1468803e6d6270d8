// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plugin client lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a plugin client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// `start` has not spawned anything yet.
    NotStarted,
    /// The process is spawned and the handshake is pending or failed.
    Starting,
    /// The handshake completed and the address is known.
    Running,
    /// The process has terminated. Absorbing.
    Exited,
}

impl ClientState {
    /// Returns `true` if moving from `self` to `to` is allowed.
    ///
    /// Every state may move to [`ClientState::Exited`] except `NotStarted`,
    /// which has no process to exit.
    pub fn can_transition(self, to: ClientState) -> bool {
        matches!(
            (self, to),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Starting, Self::Exited)
                | (Self::Running, Self::Exited)
        )
    }

    /// Returns `true` for [`ClientState::Exited`].
    pub fn is_terminal(self) -> bool {
        self == Self::Exited
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Exited => "exited",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ClientState; 4] = [
        ClientState::NotStarted,
        ClientState::Starting,
        ClientState::Running,
        ClientState::Exited,
    ];

    #[test]
    fn forward_path_is_allowed() {
        assert!(ClientState::NotStarted.can_transition(ClientState::Starting));
        assert!(ClientState::Starting.can_transition(ClientState::Running));
        assert!(ClientState::Running.can_transition(ClientState::Exited));
    }

    #[test]
    fn starting_can_exit_directly() {
        assert!(ClientState::Starting.can_transition(ClientState::Exited));
    }

    #[test]
    fn exited_is_absorbing() {
        for to in ALL {
            assert!(!ClientState::Exited.can_transition(to), "exited -> {to}");
        }
        assert!(ClientState::Exited.is_terminal());
    }

    #[test]
    fn no_backwards_moves() {
        assert!(!ClientState::Running.can_transition(ClientState::Starting));
        assert!(!ClientState::Starting.can_transition(ClientState::NotStarted));
        assert!(!ClientState::NotStarted.can_transition(ClientState::Running));
        assert!(!ClientState::NotStarted.can_transition(ClientState::Exited));
    }

    #[test]
    fn display_and_serde_agree() {
        for state in ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
