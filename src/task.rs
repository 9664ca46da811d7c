//! Data structures for tracking task state.
//!
//! This module defines the definition of a managed task (`TaskDefinition`) and its
//! current lifecycle status (`TaskStatus`) as seen by callers of the supervisor.

/// Definition of a single managed task.
///
/// The supervisor treats this as an immutable value: it is handed over whole on
/// `add_task`/`update_task` and never mutated in place.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Opaque identifier, unique within a supervisor and stable across reloads.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Shell command line, or an executable path plus arguments.
    pub command: String,
    /// Whether log lines get a local-time prefix.
    pub timestamp_logging: bool,
    /// Whether the task should be started on startup/reload.
    pub enabled: bool,
}

/// The current lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// No live child process.
    Stopped,
    /// A child process is running and its output pump is attached.
    Running,
}
