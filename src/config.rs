//! Configuration management for taskdock.
//!
//! This module defines the structure of the `taskdock.toml` configuration file
//! and provides functionality to load, save, and bootstrap it. A missing file
//! is replaced with a default one on first run so the tool starts doing
//! something visible out of the box.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::task::TaskDefinition;

/// Top-level configuration structure corresponding to `taskdock.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for per-task log files (default: `logs`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Tasks to manage.
    #[serde(rename = "task", default)]
    pub tasks: Vec<TaskConfig>,
}

/// Configuration for a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Identifier, unique within the file; also names the log file.
    pub id: String,
    /// Display name (defaults to the id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Command to execute.
    pub command: String,
    /// Whether to prepend a local timestamp to each logged line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_logging: Option<bool>,
    /// Whether the task is started on startup and reload (default: true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl TaskConfig {
    /// Resolves the raw entry into the definition handed to the supervisor.
    pub fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            command: self.command.clone(),
            timestamp_logging: self.timestamp_logging.unwrap_or(false),
            enabled: self.enabled.unwrap_or(true),
        }
    }
}

impl Config {
    pub fn definitions(&self) -> Vec<TaskDefinition> {
        self.tasks.iter().map(TaskConfig::definition).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: Some(PathBuf::from("logs")),
            tasks: vec![
                TaskConfig {
                    id: "heartbeat".to_string(),
                    name: Some("Heartbeat".to_string()),
                    command: default_heartbeat_command().to_string(),
                    timestamp_logging: Some(true),
                    enabled: Some(true),
                },
                TaskConfig {
                    id: "hello".to_string(),
                    name: Some("Hello".to_string()),
                    command: "echo hello".to_string(),
                    timestamp_logging: Some(false),
                    enabled: Some(false),
                },
            ],
        }
    }
}

#[cfg(unix)]
fn default_heartbeat_command() -> &'static str {
    "while true; do date '+%Y-%m-%d %H:%M:%S'; sleep 5; done"
}

#[cfg(windows)]
fn default_heartbeat_command() -> &'static str {
    "while ($true) { Get-Date -Format 'yyyy-MM-dd HH:mm:ss'; Start-Sleep -Seconds 5 }"
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Serializes the configuration back to disk (used by external task editors
/// and by first-run bootstrap).
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let raw = toml::to_string_pretty(config).context("failed to serialize config")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, raw)
        .with_context(|| format!("failed to write config file {}", path.display()))
}

/// Loads the configuration, writing (and returning) the default one when the
/// file does not exist yet.
pub fn load_or_create(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    let config = Config::default();
    save_config(path, &config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_task_tables() {
        let raw = r#"
log_dir = "out/logs"

[[task]]
id = "clock"
name = "Wall clock"
command = "while true; do date; sleep 1; done"
timestamp_logging = true
enabled = true

[[task]]
id = "batch"
command = "run.exe --once"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.log_dir.as_deref(), Some(Path::new("out/logs")));
        assert_eq!(config.tasks.len(), 2);

        let clock = config.tasks[0].definition();
        assert_eq!(clock.id, "clock");
        assert_eq!(clock.name, "Wall clock");
        assert!(clock.timestamp_logging);
        assert!(clock.enabled);

        // Optional fields fall back: name mirrors the id, tasks default to
        // enabled, timestamps default to off.
        let batch = config.tasks[1].definition();
        assert_eq!(batch.name, "batch");
        assert!(!batch.timestamp_logging);
        assert!(batch.enabled);
    }

    #[test]
    fn missing_file_is_bootstrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskdock.toml");
        let config = load_or_create(&path).unwrap();
        assert!(path.exists());
        assert!(!config.tasks.is_empty());

        // The generated file parses back to the same task set.
        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded.tasks.len(), config.tasks.len());
        assert_eq!(reloaded.tasks[0].id, config.tasks[0].id);
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("taskdock.toml");
        let config = Config {
            log_dir: None,
            tasks: vec![TaskConfig {
                id: "only".to_string(),
                name: None,
                command: "echo one".to_string(),
                timestamp_logging: None,
                enabled: Some(false),
            }],
        };
        save_config(&path, &config).unwrap();
        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded.tasks.len(), 1);
        let definition = reloaded.tasks[0].definition();
        assert_eq!(definition.command, "echo one");
        assert!(!definition.enabled);
    }
}
