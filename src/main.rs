//! taskdock: a background supervisor for long-running commands.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads (or bootstraps) the configuration, registers the
//! configured tasks with the supervisor, and runs a headless loop that prints
//! task output until interrupted. SIGHUP reloads the configuration the way
//! the tray menu's "reload" action would.

mod config;
mod decode;
mod events;
mod kill;
mod logfile;
mod supervisor;
mod task;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::events::TaskEvent;
use crate::logfile::LogWriter;
use crate::supervisor::Supervisor;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "taskdock",
    version,
    about = "Background supervisor for long-running commands"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to taskdock.toml (created with defaults when missing).
    #[arg(long, default_value = "taskdock.toml")]
    config: PathBuf,
    /// Override the log directory from the config file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Register tasks without starting the enabled ones.
    #[arg(long)]
    no_autostart: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the supervisor (default).
    Run,
    /// Print a task's log file.
    Log { task_id: String },
    /// Clear a task's log file.
    Clear { task_id: String },
}

/// Out-of-band control requests delivered by OS signals.
#[derive(Debug, Clone, Copy)]
enum ControlSignal {
    Shutdown,
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::load_or_create(&cli.config)?;
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.log_dir.clone())
        .unwrap_or_else(|| PathBuf::from("logs"));
    let logs = LogWriter::new(&log_dir);

    // Log view/clear work on the files directly; no supervisor needed.
    match &cli.command {
        Some(Commands::Log { task_id }) => {
            let content = logs
                .read(task_id)
                .with_context(|| format!("failed to read log for {}", task_id))?;
            print!("{}", content);
            return Ok(());
        }
        Some(Commands::Clear { task_id }) => {
            return logs
                .clear(task_id)
                .with_context(|| format!("failed to clear log for {}", task_id));
        }
        Some(Commands::Run) | None => {}
    }
    info!(config = %cli.config.display(), logs = %log_dir.display(), "starting");

    let supervisor = Supervisor::new(logs);
    let mut events = supervisor.subscribe();

    register_tasks(&supervisor, &config)?;
    if !cli.no_autostart {
        start_enabled(&supervisor, &config).await;
    }

    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    spawn_signal_listener(control_tx);

    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            Some(signal) = control_rx.recv() => match signal {
                ControlSignal::Shutdown => break,
                ControlSignal::Reload => {
                    if let Err(err) = reload(&supervisor, &cli.config).await {
                        warn!(%err, "reload failed; keeping previous task set");
                    }
                }
            },
            else => break,
        }
    }

    info!("shutting down");
    for failure in supervisor.stop_all().await {
        warn!(%failure, "shutdown stop failed");
    }
    Ok(())
}

fn print_event(event: &TaskEvent) {
    match event {
        TaskEvent::Output { task_id, line } => println!("[{}] {}", task_id, line),
        TaskEvent::Status { task_id, running } => {
            println!("[{}] {}", task_id, if *running { "task started" } else { "task stopped" })
        }
    }
}

fn register_tasks(supervisor: &Supervisor, config: &Config) -> Result<()> {
    for definition in config.definitions() {
        // A duplicate id here means the config file itself is broken.
        supervisor.add_task(definition)?;
    }
    Ok(())
}

async fn start_enabled(supervisor: &Supervisor, config: &Config) {
    for definition in config.definitions() {
        if !definition.enabled {
            continue;
        }
        // Spawn failures are already surfaced on the task's output stream.
        if let Err(err) = supervisor.start_task(&definition.id).await {
            warn!(task_id = %definition.id, %err, "task failed to start");
        }
    }
}

/// Re-reads the config file and re-syncs the task set: everything is stopped,
/// vanished tasks are removed, surviving definitions are updated, newcomers
/// added, and the enabled set started again. Restarting explicitly here is
/// what makes `update_task`'s no-restart contract safe.
async fn reload(supervisor: &Supervisor, config_path: &Path) -> Result<()> {
    let config = config::load_config(config_path)?;
    info!(config = %config_path.display(), "reloading");

    for failure in supervisor.stop_all().await {
        warn!(%failure, "stop during reload failed");
    }

    let definitions = config.definitions();
    for task_id in supervisor.task_ids() {
        if !definitions.iter().any(|definition| definition.id == task_id) {
            if let Err(err) = supervisor.remove_task(&task_id).await {
                warn!(%task_id, %err, "failed to remove task during reload");
            }
        }
    }
    for definition in definitions {
        let task_id = definition.id.clone();
        let enabled = definition.enabled;
        if supervisor.update_task(&task_id, definition.clone()).await.is_err() {
            supervisor.add_task(definition)?;
        }
        if enabled {
            if let Err(err) = supervisor.start_task(&task_id).await {
                warn!(%task_id, %err, "task failed to start after reload");
            }
        }
    }
    Ok(())
}

fn spawn_signal_listener(tx: mpsc::UnboundedSender<ControlSignal>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            let mut sighup = match signal(SignalKind::hangup()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        let _ = tx.send(ControlSignal::Shutdown);
                        return;
                    }
                    _ = sigterm.recv() => {
                        let _ = tx.send(ControlSignal::Shutdown);
                        return;
                    }
                    _ = sighup.recv() => {
                        let _ = tx.send(ControlSignal::Reload);
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(ControlSignal::Shutdown);
        }
    });
}
