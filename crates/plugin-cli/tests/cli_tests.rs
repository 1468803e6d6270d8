// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `plugctl` binary.
//!
//! `run` tests drive `sh -c` scripts, so the file is Unix-only.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::str::contains;
use std::io::Write;

fn plugctl() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("plugctl").expect("binary `plugctl` should be built");
    cmd.env_remove("RUST_LOG")
        .env_remove("PLUGCTL_LOG_LEVEL")
        .env_remove("PLUGCTL_START_TIMEOUT_MS")
        .env_remove("PLUGCTL_KILL_GRACE_MS");
    cmd
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp config");
    f.write_all(body.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

// ── Help & version ──────────────────────────────────────────────────

#[test]
fn help_flag_prints_usage() {
    plugctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Plugin process supervisor"))
        .stdout(contains("run"))
        .stdout(contains("check"));
}

#[test]
fn version_flag_prints_version() {
    plugctl()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

// ── Config subcommands ──────────────────────────────────────────────

#[test]
fn list_without_config_reports_nothing() {
    plugctl()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("no plugins configured"));
}

#[test]
fn list_shows_configured_plugins() {
    let cfg = write_config(
        "[plugins.echo]\ncommand = \"/bin/echo-plugin\"\nargs = [\"--serve\"]\n",
    );
    plugctl()
        .arg("--config")
        .arg(cfg.path())
        .arg("list")
        .assert()
        .success()
        .stdout(contains("echo\t/bin/echo-plugin --serve"));
}

#[test]
fn check_accepts_valid_config() {
    let cfg = write_config("start_timeout_ms = 500\n[plugins.p]\ncommand = \"/bin/p\"\n");
    plugctl()
        .arg("--config")
        .arg(cfg.path())
        .arg("check")
        .assert()
        .success()
        .stdout(contains("config ok (1 plugin(s))"));
}

#[test]
fn check_rejects_inverted_port_range() {
    let cfg = write_config("min_port = 5000\nmax_port = 4000\n");
    plugctl()
        .arg("--config")
        .arg(cfg.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(contains("greater than max_port"));
}

#[test]
fn missing_config_file_fails() {
    plugctl()
        .args(["--config", "/nonexistent/plugctl.toml", "list"])
        .assert()
        .failure()
        .stderr(contains("config file not found"));
}

#[test]
fn schema_prints_json_schema() {
    plugctl()
        .arg("schema")
        .assert()
        .success()
        .stdout(contains("\"plugins\""))
        .stdout(contains("kill_grace_ms"));
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn run_without_target_fails() {
    plugctl()
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("nothing to run"));
}

#[test]
fn run_unknown_plugin_fails() {
    plugctl()
        .args(["run", "ghost"])
        .assert()
        .failure()
        .stderr(contains("unknown plugin 'ghost'"));
}

#[test]
fn run_prints_address_of_ad_hoc_command() {
    plugctl()
        .args(["run", "--", "sh", "-c", "echo :1234"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(contains(":1234"));
}

#[test]
fn run_named_plugin_from_config() {
    let cfg = write_config(
        "[plugins.mock]\ncommand = \"sh\"\nargs = [\"-c\", \"echo 127.0.0.1:$PLUGIN_MIN_PORT\"]\n",
    );
    plugctl()
        .arg("--config")
        .arg(cfg.path())
        .args(["run", "mock"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(contains("127.0.0.1:10000"));
}

#[test]
fn run_reports_start_timeout() {
    plugctl()
        .args(["run", "--start-timeout-ms", "100", "--", "sh", "-c", "exec sleep 30"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stderr(contains("timed out"));
}

#[test]
fn run_reports_plugin_failure_exit() {
    plugctl()
        .args(["run", "--", "sh", "-c", "echo :1234; exit 4"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stdout(contains(":1234"))
        .stderr(contains("exited unsuccessfully"));
}
