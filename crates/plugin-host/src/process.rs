// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process spawning, stdio forwarding and the exit watcher.

use crate::config::{ClientConfig, ENV_MAX_PORT, ENV_MIN_PORT};
use crate::error::StartError;
use chrono::{DateTime, Utc};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Shared exit state: `None` while the process runs, then `Some` forever.
pub(crate) type ExitSender = Arc<watch::Sender<Option<ExitRecord>>>;

/// Terminal state of a plugin process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    /// OS exit status; `None` only if waiting on the process failed.
    pub status: Option<ExitStatus>,
    /// When the exit was observed.
    pub exited_at: DateTime<Utc>,
}

impl ExitRecord {
    /// Returns `true` if the process exited with status zero.
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// Exit code, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Termination requests handled by the watcher, which owns the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Ask the process to shut down (SIGTERM on Unix).
    Terminate,
    /// Kill the process outright.
    Kill,
}

/// Handle to a spawned plugin, held by the client.
#[derive(Debug, Clone)]
pub(crate) struct ProcessHandle {
    pub(crate) pid: Option<u32>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl ProcessHandle {
    /// Forward a signal to the watcher. Returns `false` once the watcher is
    /// gone, i.e. the process has already been reaped.
    pub(crate) fn request(&self, signal: Signal) -> bool {
        self.signals.send(signal).is_ok()
    }
}

/// A freshly spawned plugin whose stdout still has to be read.
pub(crate) struct Spawned {
    pub(crate) handle: ProcessHandle,
    pub(crate) stdout: BufReader<ChildStdout>,
}

/// Spawn the configured command and start its stderr forwarder and exit
/// watcher.
pub(crate) fn spawn(config: &ClientConfig, exit_tx: ExitSender) -> Result<Spawned, StartError> {
    let spec = &config.command;
    let name = spec.display_name().to_string();

    let stdin = config.stdin.to_stdio().map_err(StartError::Spawn)?;
    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env(ENV_MIN_PORT, config.port_range.min.to_string())
        .env(ENV_MAX_PORT, config.port_range.max.to_string());

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    let mut child = cmd.spawn().map_err(StartError::Spawn)?;
    let pid = child.id();

    let Some(stdout) = child.stdout.take() else {
        let _ = child.start_kill();
        return Err(StartError::Spawn(io::Error::other(
            "plugin stdout unavailable",
        )));
    };

    if let Some(stderr) = child.stderr.take() {
        let name = name.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match r.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let s = line.trim_end();
                        if !s.is_empty() {
                            warn!(target: "plugin_host.stderr", "{name}: {s}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    debug!(target: "plugin_host", "spawned plugin {name} (pid={pid:?})");

    let (sig_tx, sig_rx) = mpsc::unbounded_channel();
    tokio::spawn(watch_exit(child, sig_rx, exit_tx, name));

    Ok(Spawned {
        handle: ProcessHandle {
            pid,
            signals: sig_tx,
        },
        stdout: BufReader::new(stdout),
    })
}

/// Log whatever the plugin writes to stdout after the handshake, so it never
/// blocks on a full pipe. Ends at EOF.
pub(crate) fn drain_stdout(mut stdout: BufReader<ChildStdout>, name: String) {
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match stdout.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let s = line.trim_end();
                    if !s.is_empty() {
                        debug!(target: "plugin_host.stdout", "{name}: {s}");
                    }
                }
            }
        }
    });
}

/// Owns the child until it exits, applying termination requests on the way,
/// then publishes the exit record exactly once.
async fn watch_exit(
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    exit_tx: ExitSender,
    name: String,
) {
    let mut listening = true;
    let waited = loop {
        tokio::select! {
            res = child.wait() => break res,
            sig = signals.recv(), if listening => match sig {
                Some(Signal::Terminate) => {
                    if let Err(e) = terminate(&mut child) {
                        debug!(target: "plugin_host", "terminate {name} failed: {e}");
                    }
                }
                Some(Signal::Kill) => {
                    if let Err(e) = child.start_kill() {
                        debug!(target: "plugin_host", "kill {name} failed: {e}");
                    }
                }
                // Client dropped; keep observing the exit.
                None => listening = false,
            },
        }
    };

    let status = match waited {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(target: "plugin_host", "waiting on plugin {name} failed: {e}");
            None
        }
    };
    debug!(target: "plugin_host", "plugin {name} exited (status={status:?})");

    exit_tx.send_replace(Some(ExitRecord {
        status,
        exited_at: Utc::now(),
    }));
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
    // SAFETY: `kill(2)` takes plain integers and touches no memory. The pid
    // is still ours because only this task reaps the child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
