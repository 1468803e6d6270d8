// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plugin client: spawn + address handshake + liveness + teardown.

use crate::config::ClientConfig;
use crate::error::StartError;
use crate::handshake::PluginAddress;
use crate::lifecycle::ClientState;
use crate::process::{self, ExitRecord, ExitSender, ProcessHandle, Signal};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// How long to keep reading stdout after the process is seen to exit, so a
/// line written just before exiting is not lost.
const EXIT_DRAIN: Duration = Duration::from_millis(100);

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug)]
struct Inner {
    state: ClientState,
    process: Option<ProcessHandle>,
    address: Option<PluginAddress>,
}

/// Supervises one plugin process.
///
/// All methods take `&self`; share the client as `Arc<PluginClient>` to call
/// [`exited`](Self::exited) or [`kill`](Self::kill) while
/// [`start`](Self::start) is still waiting for the handshake.
///
/// Dropping the client does not kill the plugin.
#[derive(Debug)]
pub struct PluginClient {
    config: ClientConfig,
    inner: Mutex<Inner>,
    exit_tx: ExitSender,
    exit_rx: watch::Receiver<Option<ExitRecord>>,
}

impl PluginClient {
    /// Create a client. Nothing is spawned until [`start`](Self::start).
    pub fn new(config: ClientConfig) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        Self {
            config,
            inner: Mutex::new(Inner {
                state: ClientState::NotStarted,
                process: None,
                address: None,
            }),
            exit_tx: Arc::new(exit_tx),
            exit_rx,
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Spawn the plugin and wait for its address handshake.
    ///
    /// Returns the cached address if a previous call succeeded. On
    /// [`StartError::StartTimeout`] the process is left running; call
    /// [`kill`](Self::kill) to clean up.
    pub async fn start(&self) -> Result<PluginAddress, StartError> {
        let range = self.config.port_range;
        if !range.is_valid() {
            return Err(StartError::InvalidConfig(format!(
                "port range {}..={} is empty or starts at 0",
                range.min, range.max
            )));
        }

        let mut stdout = {
            let mut inner = self.lock();
            if let Some(addr) = &inner.address {
                return Ok(addr.clone());
            }
            if inner.state != ClientState::NotStarted {
                return Err(StartError::AlreadyStarted);
            }
            let spawned = process::spawn(&self.config, Arc::clone(&self.exit_tx))?;
            debug_assert!(inner.state.can_transition(ClientState::Starting));
            inner.process = Some(spawned.handle);
            inner.state = ClientState::Starting;
            spawned.stdout
        };

        let name = self.name().to_string();
        let timeout = self.config.effective_start_timeout();
        let read = self.read_handshake(&mut stdout, timeout).await;
        process::drain_stdout(stdout, name.clone());

        let line = match read {
            Ok(line) => line,
            Err(e) => {
                warn!(target: "plugin_host", "plugin {name} failed to start: {e}");
                return Err(e);
            }
        };

        let line = line.trim();
        let address = PluginAddress::parse(line).map_err(|source| {
            warn!(target: "plugin_host", "plugin {name} sent bad handshake {line:?}: {source}");
            StartError::HandshakeParse {
                line: line.to_string(),
                source,
            }
        })?;

        {
            let mut inner = self.lock();
            debug_assert!(inner.state.can_transition(ClientState::Running));
            inner.address = Some(address.clone());
            inner.state = ClientState::Running;
        }

        debug!(target: "plugin_host", "plugin {name} listening on {} {address}", address.network);
        Ok(address)
    }

    /// Terminate the plugin and wait until its exit is observed.
    ///
    /// Sends a graceful termination request first and escalates to a forceful
    /// kill after the configured grace period. A no-op if nothing was spawned
    /// or the process already exited. After this returns (having found a
    /// process), [`exited`](Self::exited) is `true` for every caller.
    pub async fn kill(&self) {
        let Some(handle) = self.process_handle() else {
            return;
        };
        if self.exited() {
            return;
        }

        let mut rx = self.exit_rx.clone();
        if handle.request(Signal::Terminate) {
            let grace = self.config.effective_kill_grace();
            if time::timeout(grace, wait_exit(&mut rx)).await.is_ok() {
                return;
            }
            warn!(
                target: "plugin_host",
                "plugin {} still running after {grace:?}; killing",
                self.name()
            );
            handle.request(Signal::Kill);
        }
        wait_exit(&mut rx).await;
    }

    /// Whether the plugin process has terminated. Never blocks.
    pub fn exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Wait until the plugin exits on its own or is killed.
    ///
    /// Returns `None` immediately if no process has been spawned.
    pub async fn wait(&self) -> Option<ExitRecord> {
        self.process_handle()?;
        let mut rx = self.exit_rx.clone();
        wait_exit(&mut rx).await;
        self.exit_record()
    }

    /// Address from the handshake, once `start` has succeeded.
    pub fn address(&self) -> Option<PluginAddress> {
        self.lock().address.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        if self.exited() {
            return ClientState::Exited;
        }
        self.lock().state
    }

    /// Terminal state, once the process has exited.
    pub fn exit_record(&self) -> Option<ExitRecord> {
        *self.exit_rx.borrow()
    }

    /// OS exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_record().and_then(|r| r.status)
    }

    /// OS process id while the plugin is running.
    pub fn pid(&self) -> Option<u32> {
        if self.exited() {
            return None;
        }
        self.lock().process.as_ref().and_then(|p| p.pid)
    }

    fn name(&self) -> &str {
        self.config.command.display_name()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("plugin client lock poisoned")
    }

    fn process_handle(&self) -> Option<ProcessHandle> {
        self.lock().process.clone()
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_record().and_then(|r| r.code())
    }

    /// Read the first stdout line, bounded by `timeout` and by process exit.
    async fn read_handshake(
        &self,
        stdout: &mut BufReader<ChildStdout>,
        timeout: Duration,
    ) -> Result<String, StartError> {
        let deadline = handshake_deadline(Instant::now(), timeout);
        let mut rx = self.exit_rx.clone();
        let mut buf = Vec::new();

        let read = tokio::select! {
            biased;
            res = stdout.read_until(b'\n', &mut buf) => Some(res),
            _ = wait_exit(&mut rx) => None,
            _ = time::sleep_until(deadline) => {
                return Err(StartError::StartTimeout { timeout });
            }
        };

        match read {
            Some(Ok(0)) => {
                // stdout closed without a line; expect the exit to follow.
                match time::timeout_at(deadline, wait_exit(&mut rx)).await {
                    Ok(()) => Err(StartError::ProcessExited {
                        code: self.exit_code(),
                    }),
                    Err(_) => Err(StartError::StartTimeout { timeout }),
                }
            }
            Some(Ok(_)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
            Some(Err(e)) => Err(StartError::Stdout(e)),
            None => {
                // `read_until` keeps partial input in `buf`, so resume it.
                let drained = time::timeout(EXIT_DRAIN, stdout.read_until(b'\n', &mut buf)).await;
                match drained {
                    Ok(Ok(_)) if !buf.is_empty() => Ok(String::from_utf8_lossy(&buf).into_owned()),
                    _ => Err(StartError::ProcessExited {
                        code: self.exit_code(),
                    }),
                }
            }
        }
    }
}

fn handshake_deadline(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

async fn wait_exit(rx: &mut watch::Receiver<Option<ExitRecord>>) {
    let _ = rx.wait_for(|record| record.is_some()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_deadline_adds_timeout() {
        let now = Instant::now();
        let timeout = Duration::from_secs(5);
        assert_eq!(handshake_deadline(now, timeout), now + timeout);
    }

    #[test]
    fn handshake_deadline_saturates_on_overflow() {
        let now = Instant::now();
        assert_eq!(handshake_deadline(now, Duration::MAX), now + FAR_FUTURE);
    }
}
