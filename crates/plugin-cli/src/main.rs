// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use plugin_config::{SupervisorConfig, load_config, validate_config};
use plugin_host::{CommandSpec, ManagedClients};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "plugctl", version, about = "Plugin process supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a plugin, print its address, and supervise it until it exits or
    /// Ctrl-C arrives.
    Run {
        /// Name of a plugin from the config file.
        name: Option<String>,

        /// Handshake deadline in milliseconds.
        #[arg(long)]
        start_timeout_ms: Option<u64>,

        /// Grace period before a forceful kill, in milliseconds.
        #[arg(long)]
        kill_grace_ms: Option<u64>,

        /// Ad-hoc command to run instead of a named plugin (after `--`).
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// List configured plugins.
    List,

    /// Validate the config file.
    Check,

    /// Print the JSON schema of the config file.
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("load config")?;

    let filter = if cli.debug {
        EnvFilter::new("plugctl=debug,plugin_host=debug")
    } else {
        let level = config.log_level.as_deref().unwrap_or("info");
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("plugctl={level},plugin_host={level}")))
    };

    // stdout carries the plugin address only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            name,
            start_timeout_ms,
            kill_grace_ms,
            command,
        } => cmd_run(&config, name, command, start_timeout_ms, kill_grace_ms).await,
        Commands::List => cmd_list(&config),
        Commands::Check => cmd_check(&config),
        Commands::Schema => cmd_schema(),
    }
}

async fn cmd_run(
    config: &SupervisorConfig,
    name: Option<String>,
    command: Vec<String>,
    start_timeout_ms: Option<u64>,
    kill_grace_ms: Option<u64>,
) -> Result<()> {
    let mut client_config = match (name, command.split_first()) {
        (Some(name), None) => config
            .client_config(&name)
            .with_context(|| format!("resolve plugin '{name}'"))?,
        (None, Some((cmd, args))) => {
            config.client_config_for(CommandSpec::new(cmd.as_str()).args(args.iter().cloned()))
        }
        (Some(_), Some(_)) => bail!("pass either a plugin name or a command after `--`, not both"),
        (None, None) => bail!("nothing to run: pass a plugin name or a command after `--`"),
    };
    if let Some(ms) = start_timeout_ms {
        client_config.start_timeout = Some(Duration::from_millis(ms));
    }
    if let Some(ms) = kill_grace_ms {
        client_config.kill_grace = Some(Duration::from_millis(ms));
    }

    let managed = ManagedClients::new();
    let client = managed.launch(client_config);

    let address = match client.start().await {
        Ok(address) => address,
        Err(e) => {
            managed.cleanup_all().await;
            return Err(e).context("start plugin");
        }
    };
    println!("{address}");
    info!(target: "plugctl", "plugin running (pid={:?}); press Ctrl-C to stop", client.pid());

    let exited = tokio::select! {
        record = client.wait() => record,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(target: "plugctl", "failed to listen for Ctrl-C: {e}");
            }
            info!(target: "plugctl", "stopping plugin");
            None
        }
    };
    managed.cleanup_all().await;

    if let Some(record) = exited
        && !record.success()
    {
        match record.status {
            Some(status) => bail!("plugin exited unsuccessfully ({status})"),
            None => bail!("plugin exit status unavailable"),
        }
    }
    Ok(())
}

fn cmd_list(config: &SupervisorConfig) -> Result<()> {
    if config.plugins.is_empty() {
        println!("no plugins configured");
        return Ok(());
    }
    for (name, entry) in &config.plugins {
        let mut line = format!("{name}\t{}", entry.command);
        for arg in &entry.args {
            line.push(' ');
            line.push_str(arg);
        }
        println!("{line}");
    }
    Ok(())
}

fn cmd_check(config: &SupervisorConfig) -> Result<()> {
    let warnings = validate_config(config).context("validate config")?;
    for w in &warnings {
        println!("warning: {w}");
    }
    println!("config ok ({} plugin(s))", config.plugins.len());
    Ok(())
}

fn cmd_schema() -> Result<()> {
    let schema = schemars::schema_for!(SupervisorConfig);
    let json = serde_json::to_string_pretty(&schema).context("serialize schema")?;
    println!("{json}");
    Ok(())
}
