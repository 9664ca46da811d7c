//! Per-task log files.
//!
//! Each task appends to its own file under a shared log directory. The writer is
//! deliberately independent of process lifecycle: the supervisor's pumps append
//! through it, while external collaborators (log viewers, a "clear log" action)
//! reuse the same handle for reading and truncation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

/// Appends task output to `<dir>/<task_id>.log`.
#[derive(Debug, Clone)]
pub struct LogWriter {
    dir: PathBuf,
}

impl LogWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the log file for a task.
    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("{}.log", task_id))
    }

    /// Appends one line, creating the file (and the log directory) on demand.
    ///
    /// With `with_timestamp` the line is written as
    /// `[YYYY-MM-DD HH:MM:SS] <text>`. The file handle is scoped to this call,
    /// so it is released whether or not the write succeeds. Failures are
    /// returned to the caller; a failed write must never stop the pump that
    /// issued it.
    pub fn append(&self, task_id: &str, text: &str, with_timestamp: bool) -> std::io::Result<()> {
        let path = self.path_for(task_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if with_timestamp {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            writeln!(file, "[{}] {}", timestamp, text)
        } else {
            writeln!(file, "{}", text)
        }
    }

    /// Truncates a task's log. Issued by external collaborators only; the
    /// supervisor itself never clears a log.
    pub fn clear(&self, task_id: &str) -> std::io::Result<()> {
        let path = self.path_for(task_id);
        if path.exists() {
            File::create(path)?;
        }
        Ok(())
    }

    /// Reads a task's whole log, for external viewers. Returns an empty string
    /// if the task has not produced output yet.
    pub fn read(&self, task_id: &str) -> std::io::Result<String> {
        let path = self.path_for(task_id);
        if !path.exists() {
            return Ok(String::new());
        }
        read_lossy(&path)
    }
}

// Log files can contain whatever the child emitted before decoding existed
// (e.g. a file carried over from an earlier run), so reads are lossy.
fn read_lossy(path: &Path) -> std::io::Result<String> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_lines_verbatim_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogWriter::new(dir.path());
        for line in ["first", "second", "third"] {
            logs.append("t1", line, false).unwrap();
        }
        let content = logs.read("t1").unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn timestamp_prefix_shape() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogWriter::new(dir.path());
        logs.append("t1", "tick", true).unwrap();
        let content = logs.read("t1").unwrap();
        let line = content.lines().next().unwrap();
        // "[YYYY-MM-DD HH:MM:SS] tick"
        assert!(line.starts_with('['), "missing prefix: {}", line);
        assert_eq!(&line[11..12], " ");
        assert!(line.ends_with("] tick"), "bad suffix: {}", line);
        assert_eq!(line.len(), "[0000-00-00 00:00:00] tick".len());
    }

    #[test]
    fn creates_log_dir_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogWriter::new(dir.path().join("nested").join("logs"));
        logs.append("t1", "line", false).unwrap();
        assert!(logs.path_for("t1").exists());
    }

    #[test]
    fn clear_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogWriter::new(dir.path());
        logs.append("t1", "stale", false).unwrap();
        logs.clear("t1").unwrap();
        assert_eq!(logs.read("t1").unwrap(), "");
        // Clearing a log that never existed is fine.
        logs.clear("ghost").unwrap();
    }

    #[test]
    fn read_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogWriter::new(dir.path());
        assert_eq!(logs.read("nothing").unwrap(), "");
    }

    #[test]
    fn tasks_do_not_share_files() {
        let dir = tempfile::tempdir().unwrap();
        let logs = LogWriter::new(dir.path());
        logs.append("a", "from a", false).unwrap();
        logs.append("b", "from b", false).unwrap();
        assert_eq!(logs.read("a").unwrap(), "from a\n");
        assert_eq!(logs.read("b").unwrap(), "from b\n");
    }
}
