// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tests for tearing down a set of managed plugin clients.
#![cfg(unix)]

use plugin_host::{ClientConfig, ClientState, CommandSpec, ManagedClients, PluginClient};
use std::sync::Arc;
use std::time::Duration;

fn idle_plugin(port: u16) -> ClientConfig {
    let script = format!("echo :{port}; exec sleep 30");
    ClientConfig::new(CommandSpec::new("sh").arg("-c").arg(script))
        .with_start_timeout(Duration::from_secs(10))
}

#[test]
fn new_set_is_empty() {
    let managed = ManagedClients::new();
    assert!(managed.is_empty());
    assert_eq!(managed.len(), 0);
    assert_eq!(managed.running_count(), 0);
}

#[test]
fn clones_share_the_same_set() {
    let managed = ManagedClients::new();
    let other = managed.clone();
    other.launch(idle_plugin(1));
    assert_eq!(managed.len(), 1);
}

#[tokio::test]
async fn cleanup_kills_every_client() {
    let managed = ManagedClients::new();
    let a = managed.launch(idle_plugin(2001));
    let b = managed.launch(idle_plugin(2002));
    let idle = managed.launch(idle_plugin(2003));

    assert_eq!(a.start().await.unwrap().port(), Some(2001));
    assert_eq!(b.start().await.unwrap().port(), Some(2002));
    assert_eq!(managed.running_count(), 2);

    managed.cleanup_all().await;

    assert!(a.exited());
    assert!(b.exited());
    assert_eq!(idle.state(), ClientState::NotStarted);
    assert!(managed.is_empty());

    // A second cleanup has nothing left to do.
    managed.cleanup_all().await;
}

#[tokio::test]
async fn prune_drops_exited_clients() {
    let managed = ManagedClients::new();
    let done = Arc::new(PluginClient::new(ClientConfig::new(
        CommandSpec::new("sh").arg("-c").arg("echo :1234"),
    )));
    managed.register(Arc::clone(&done));
    let live = managed.launch(idle_plugin(2004));

    done.start().await.unwrap();
    live.start().await.unwrap();
    done.wait().await.expect("spawned");

    assert_eq!(managed.prune(), 1);
    assert_eq!(managed.len(), 1);

    managed.cleanup_all().await;
    assert!(live.exited());
}
