//! Subprocess execution that honors the shutdown token
//!
//! Children run in their own process group on unix. When the token fires while a
//! child is running, the whole group is killed so helpers spawned by the child
//! (compilers, `git-remote-https`, ...) do not outlive the run.

use std::process::{Output, Stdio};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Run `cmd` to completion, capturing stdout and stderr.
///
/// Returns the raw output whatever the exit status; callers decide what a failure
/// means. Returns [`Error::Cancelled`] if `cancel` fires first.
pub(crate) async fn run(mut cmd: Command, cancel: &CancellationToken) -> Result<Output> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child.id();
    let output = child.wait_with_output();
    tokio::pin!(output);

    tokio::select! {
        biased;
        result = &mut output => Ok(result?),
        _ = cancel.cancelled() => {
            tracing::warn!(pid = ?pid, "Cancelled, killing subprocess group");
            if let Some(pid) = pid {
                kill_group(pid);
            }
            Err(Error::Cancelled)
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid signals the process group the child leads;
    // it has no memory safety preconditions.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "Process group already gone"
        );
    }
}

// The child itself is killed when its handle is dropped (`kill_on_drop`).
#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Lossy, trimmed text of a captured stream
pub(crate) fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}
