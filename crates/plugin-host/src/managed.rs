// SPDX-License-Identifier: MIT OR Apache-2.0
//! A set of plugin clients torn down together when the host shuts down.

use crate::{ClientConfig, ClientState, PluginClient};
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Tracks every plugin a host has launched so they can all be killed at once.
///
/// Cloning yields another handle to the same set.
///
/// # Examples
///
/// ```
/// use plugin_host::{ClientConfig, CommandSpec, ManagedClients};
///
/// let managed = ManagedClients::new();
/// let client = managed.launch(ClientConfig::new(CommandSpec::new("my-plugin")));
/// assert_eq!(managed.len(), 1);
/// assert!(!client.exited());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManagedClients {
    clients: Arc<Mutex<Vec<Arc<PluginClient>>>>,
}

impl ManagedClients {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client for `config` and register it. The client is not
    /// started.
    pub fn launch(&self, config: ClientConfig) -> Arc<PluginClient> {
        let client = Arc::new(PluginClient::new(config));
        self.register(Arc::clone(&client));
        client
    }

    /// Register an existing client.
    pub fn register(&self, client: Arc<PluginClient>) {
        self.lock().push(client);
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of registered clients with a live process.
    pub fn running_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|c| matches!(c.state(), ClientState::Starting | ClientState::Running))
            .count()
    }

    /// Forget clients whose process has exited. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|c| !c.exited());
        before - clients.len()
    }

    /// Kill every registered client concurrently and empty the set.
    pub async fn cleanup_all(&self) {
        let clients = std::mem::take(&mut *self.lock());
        if clients.is_empty() {
            return;
        }
        info!(target: "plugin_host", "cleaning up {} plugin client(s)", clients.len());
        join_all(clients.iter().map(|c| c.kill())).await;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<PluginClient>>> {
        self.clients.lock().expect("managed clients lock poisoned")
    }
}
