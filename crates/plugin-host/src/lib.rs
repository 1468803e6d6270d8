// SPDX-License-Identifier: MIT OR Apache-2.0
//! plugin-host
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Process supervision for plugins that advertise a dialable address on
//! stdout.
//!
//! A [`PluginClient`] spawns the configured command, reads one handshake
//! line under a deadline, parses it into a [`PluginAddress`], and from then
//! on tracks whether the process is still alive. [`PluginClient::kill`]
//! terminates it gracefully, escalating to a forceful kill after a grace
//! period. What the caller does with the address (RPC, HTTP, ...) is not
//! this crate's business.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod lifecycle;
pub mod managed;
pub mod process;
pub mod spec;

pub use client::PluginClient;
pub use config::{
    ClientConfig, DEFAULT_KILL_GRACE, DEFAULT_START_TIMEOUT, ENV_MAX_PORT, ENV_MIN_PORT,
    PortRange, StdinSource,
};
pub use error::StartError;
pub use handshake::{HandshakeError, Network, PluginAddress};
pub use lifecycle::ClientState;
pub use managed::ManagedClients;
pub use process::ExitRecord;
pub use spec::CommandSpec;
