//! Process supervision and per-task output capture.
//!
//! This module contains the `Supervisor`, which owns the registry of managed
//! tasks, spawns and forcibly terminates their child processes, and fans each
//! task's decoded output into the shared event feed. One concurrent pump per
//! running task reads the child's pipes until they close, so stopping a task
//! needs no separate cancellation signal: killing the process tree closes the
//! pipes and the pump drains out on its own.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::decode::decode_line;
use crate::events::{EventHub, EventStream, TaskEvent};
use crate::kill;
use crate::logfile::LogWriter;
use crate::task::{TaskDefinition, TaskStatus};

/// Errors returned synchronously by control operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("task already registered: {0}")]
    DuplicateTask(String),
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("failed to spawn task {task_id}: {source}")]
    Spawn {
        task_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to terminate process tree for task {task_id}: {source}")]
    Termination {
        task_id: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Suffixes that mark a command's first token as a directly spawnable program;
/// anything else goes through the platform shell.
const EXECUTABLE_SUFFIXES: [&str; 3] = [".exe", ".bat", ".cmd"];

/// Runtime state of one registered task. `child` is present iff the task is
/// running; a runtime never holds two live child handles.
struct TaskRuntime {
    definition: TaskDefinition,
    child: Option<Child>,
    pump: Option<JoinHandle<()>>,
    running: bool,
}

/// Manages the lifecycle and output of a collection of long-running tasks.
///
/// Cloning is cheap and every clone operates on the same registry, so a UI
/// thread and a signal handler can drive the same supervisor. The registry
/// lock is held only for lookups; spawn and kill happen under the per-task
/// lock, so control operations on unrelated tasks never serialize.
#[derive(Clone)]
pub struct Supervisor {
    tasks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<TaskRuntime>>>>>,
    events: EventHub,
    logs: LogWriter,
}

impl Supervisor {
    pub fn new(logs: LogWriter) -> Self {
        Self {
            tasks: Arc::default(),
            events: EventHub::new(),
            logs,
        }
    }

    /// Subscribes to the fan-in feed of output and status events.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Registers a new idle task.
    pub fn add_task(&self, definition: TaskDefinition) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task registry poisoned");
        if tasks.contains_key(&definition.id) {
            return Err(SupervisorError::DuplicateTask(definition.id.clone()));
        }
        debug!(task_id = %definition.id, "task registered");
        tasks.insert(
            definition.id.clone(),
            Arc::new(AsyncMutex::new(TaskRuntime {
                definition,
                child: None,
                pump: None,
                running: false,
            })),
        );
        Ok(())
    }

    /// Spawns the child process for a task.
    ///
    /// Returns `Ok(false)` without side effects if the task is already
    /// running. On spawn failure the error text is surfaced on the task's
    /// log/output stream, status stays `Stopped`, and the error is returned.
    pub async fn start_task(&self, task_id: &str) -> Result<bool> {
        let runtime = self.runtime(task_id)?;
        let mut rt = runtime.lock().await;
        if rt.running {
            return Ok(false);
        }
        let definition = rt.definition.clone();

        let mut command = interpret_command(&definition.command).into_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.kill_on_drop(true);
        kill::assign_process_group(&mut command);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.report(&definition, format!("failed to start {}: {}", definition.name, err));
                return Err(SupervisorError::Spawn {
                    task_id: task_id.to_string(),
                    source: err,
                });
            }
        };
        debug!(task_id, pid = child.id(), "task started");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        rt.child = Some(child);
        rt.running = true;
        // Emitted before the pump exists so the Running transition always
        // precedes the task's first output line.
        self.events.emit(TaskEvent::status(task_id, true));
        rt.pump = Some(tokio::spawn(pump(
            definition,
            stdout,
            stderr,
            Arc::clone(&runtime),
            self.events.clone(),
            self.logs.clone(),
        )));
        Ok(true)
    }

    /// Forcibly terminates a task's process tree and joins its pump.
    ///
    /// Returns `Ok(false)` if the task is already stopped. If the tree kill
    /// fails, status is still forced to `Stopped`: the handle cannot be
    /// managed any further and the possibly surviving OS process is reported
    /// rather than tracked.
    pub async fn stop_task(&self, task_id: &str) -> Result<bool> {
        let runtime = self.runtime(task_id)?;
        let (definition, child, pump) = {
            let mut rt = runtime.lock().await;
            if !rt.running {
                return Ok(false);
            }
            rt.running = false;
            (rt.definition.clone(), rt.child.take(), rt.pump.take())
        };

        let mut kill_failure = None;
        if let Some(mut child) = child {
            if let Err(err) = kill::kill_tree(&mut child).await {
                self.report(
                    &definition,
                    format!("failed to terminate process tree for {}: {}", definition.name, err),
                );
                kill_failure = Some(err);
            }
        }
        self.events.emit(TaskEvent::status(task_id, false));
        debug!(task_id, "task stopped");

        if let Some(pump) = pump {
            match kill_failure {
                // The kill closed the pipes; the pump drains and finishes.
                None => {
                    let _ = pump.await;
                }
                // The pipes may never close; cut the reader loose.
                Some(_) => pump.abort(),
            }
        }
        match kill_failure {
            None => Ok(true),
            Some(source) => Err(SupervisorError::Termination {
                task_id: task_id.to_string(),
                source,
            }),
        }
    }

    /// Stops a task (if running) and discards its runtime.
    ///
    /// A termination failure is propagated, but the runtime is discarded
    /// either way; the handle is unusable for further management.
    pub async fn remove_task(&self, task_id: &str) -> Result<()> {
        let stopped = self.stop_task(task_id).await;
        if !matches!(stopped, Err(SupervisorError::UnknownTask(_))) {
            self.tasks
                .lock()
                .expect("task registry poisoned")
                .remove(task_id);
            debug!(task_id, "task removed");
        }
        stopped.map(|_| ())
    }

    /// Replaces a task's stored definition.
    ///
    /// A running task keeps its current process; the new definition takes
    /// effect on the next start. Restart-on-update is the caller's explicit
    /// reload step, never an implicit side effect.
    pub async fn update_task(&self, task_id: &str, definition: TaskDefinition) -> Result<()> {
        let runtime = self.runtime(task_id)?;
        let mut rt = runtime.lock().await;
        rt.definition = definition;
        Ok(())
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskStatus> {
        let runtime = self.runtime(task_id)?;
        let rt = runtime.lock().await;
        Ok(if rt.running {
            TaskStatus::Running
        } else {
            TaskStatus::Stopped
        })
    }

    /// Snapshot of the registered task ids, sorted for deterministic iteration.
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tasks
            .lock()
            .expect("task registry poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Stops every running task, best-effort. Failures are collected and
    /// returned instead of aborting the sweep; an empty vec means every task
    /// is stopped cleanly.
    pub async fn stop_all(&self) -> Vec<SupervisorError> {
        let mut failures = Vec::new();
        for task_id in self.task_ids() {
            match self.stop_task(&task_id).await {
                Ok(_) => {}
                // Removed concurrently; nothing left to stop.
                Err(SupervisorError::UnknownTask(_)) => {}
                Err(err) => failures.push(err),
            }
        }
        failures
    }

    fn runtime(&self, task_id: &str) -> Result<Arc<AsyncMutex<TaskRuntime>>> {
        self.tasks
            .lock()
            .expect("task registry poisoned")
            .get(task_id)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownTask(task_id.to_string()))
    }

    // Surface an error on the task's own log/output stream. Reports are
    // always timestamped; a failing log write must not mask the report.
    fn report(&self, definition: &TaskDefinition, line: String) {
        if let Err(err) = self.logs.append(&definition.id, &line, true) {
            warn!(task_id = %definition.id, %err, "failed to write report to log");
        }
        self.events.emit(TaskEvent::output(&definition.id, line));
    }
}

/// How a command string is handed to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    /// First token named an executable; spawn it directly.
    Direct { program: String, args: Vec<String> },
    /// Everything else runs through the platform shell.
    Shell(String),
}

/// Applies the command interpretation rule.
///
/// The command is tokenized with shell quoting rules; when the first token
/// ends in a recognized executable suffix the program is spawned directly
/// with the remaining tokens as arguments (so quoted paths with spaces
/// work). Any other command, including one the tokenizer rejects, is
/// delegated verbatim to the shell, which applies its own quoting.
fn interpret_command(raw: &str) -> Invocation {
    if let Ok(mut tokens) = shell_words::split(raw) {
        if let Some(first) = tokens.first() {
            let first = first.to_lowercase();
            if EXECUTABLE_SUFFIXES.iter().any(|suffix| first.ends_with(suffix)) {
                let program = tokens.remove(0);
                return Invocation::Direct {
                    program,
                    args: tokens,
                };
            }
        }
    }
    Invocation::Shell(raw.to_string())
}

impl Invocation {
    fn into_command(self) -> Command {
        match self {
            Invocation::Direct { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            Invocation::Shell(raw) => shell_command(&raw),
        }
    }
}

#[cfg(unix)]
fn shell_command(raw: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(raw);
    command
}

#[cfg(windows)]
fn shell_command(raw: &str) -> Command {
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-Command"]).arg(raw);
    command
}

/// Reads a task's pipes until they close, then settles the exit.
///
/// Each running task owns exactly one pump. The pump feeds decoded lines to
/// the log writer and the event hub; per-pipe ordering is preserved. When
/// both pipes end the pump claims the child handle (unless a stop already
/// took it), reaps the process, and emits the `Stopped` transition, so a
/// task that exits on its own is detected without polling.
async fn pump(
    definition: TaskDefinition,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    runtime: Arc<AsyncMutex<TaskRuntime>>,
    events: EventHub,
    logs: LogWriter,
) {
    let task_id = definition.id.clone();
    tokio::join!(
        drain_stream(&definition, stdout, &events, &logs),
        drain_stream(&definition, stderr, &events, &logs),
    );

    let child = {
        let mut rt = runtime.lock().await;
        if rt.running {
            rt.running = false;
            rt.pump = None;
            rt.child.take()
        } else {
            // A stop owns the teardown; nothing left for the pump.
            None
        }
    };
    if let Some(mut child) = child {
        match child.wait().await {
            Ok(status) => debug!(%task_id, %status, "task exited on its own"),
            Err(err) => warn!(%task_id, %err, "failed to reap exited task"),
        }
        events.emit(TaskEvent::status(&task_id, false));
    }
}

// Line-by-line read loop for one pipe. Decode and log failures are absorbed
// and reported as output events; only end-of-stream or a read error ends the
// loop.
async fn drain_stream<R>(
    definition: &TaskDefinition,
    reader: Option<R>,
    events: &EventHub,
    logs: &LogWriter,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else { return };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                if let Err(err) = logs.append(&definition.id, &line, definition.timestamp_logging) {
                    events.emit(TaskEvent::output(
                        &definition.id,
                        format!("log write failed: {}", err),
                    ));
                }
                events.emit(TaskEvent::output(&definition.id, line));
            }
            Err(err) => {
                events.emit(TaskEvent::output(
                    &definition.id,
                    format!("error reading output: {}", err),
                ));
                break;
            }
        }
    }
}
