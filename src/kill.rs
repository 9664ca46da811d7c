//! Forced termination of child process trees.
//!
//! Stopping a task must take down the full descendant tree, not just the direct
//! child: commands routed through a shell interpreter spawn their real work as
//! grandchildren. The mechanism is platform-specific, so it lives behind this
//! module as a seam: spawn-side group assignment and kill-side group teardown
//! stay in one place.
//!
//! On Unix the child becomes a process group leader at spawn and the group is
//! signalled as a whole. On Windows the `taskkill` utility walks the tree;
//! termination there is best-effort and a kill failure can leak an OS process,
//! which the supervisor reports rather than hides.

use tokio::process::{Child, Command};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Configures a command so the spawned child roots its own process tree.
#[cfg(unix)]
pub fn assign_process_group(command: &mut Command) {
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }
}

#[cfg(windows)]
pub fn assign_process_group(command: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

/// Terminates the whole process tree rooted at `child`, then reaps the child.
///
/// Errors are returned only when the direct child could not be killed and is
/// still alive; a tree member surviving the group signal is invisible here.
#[cfg(unix)]
pub async fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        // SIGKILL the whole group the child leads. ESRCH just means the tree
        // is already gone.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    finish_direct_child(child).await
}

#[cfg(windows)]
pub async fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        // /T walks the descendant tree; Child::kill alone reaches only the
        // direct child. taskkill exits nonzero for an already-gone tree, so
        // its status is not inspected.
        let mut taskkill = Command::new("taskkill");
        taskkill.args(["/F", "/T", "/PID", &pid.to_string()]);
        taskkill.creation_flags(CREATE_NO_WINDOW);
        let _ = taskkill.output().await?;
    }
    finish_direct_child(child).await
}

async fn finish_direct_child(child: &mut Child) -> std::io::Result<()> {
    if let Err(err) = child.start_kill() {
        // A kill on an already-exited child reports an error; only a child
        // that is both unkillable and still alive is a real failure.
        if child.try_wait()?.is_none() {
            return Err(err);
        }
    }
    child.wait().await.map(|_| ())
}
