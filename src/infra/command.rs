//! # Command Execution Module / 命令执行模块
//!
//! Spawns external processes, captures their stdout and stderr into private
//! buffers and enforces a deadline. On expiry the whole process group is
//! killed and the child is reaped, so no descendant outlives its unit.
//!
//! 派生外部进程，将其 stdout 和 stderr 捕获到私有缓冲区并强制执行截止时间。
//! 超时后会杀死整个进程组并回收子进程，确保没有后代进程在单元结束后残留。

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::infra::t;

/// Extra time granted to the output readers once the process itself is gone.
const READ_GRACE: Duration = Duration::from_millis(500);

/// How a captured process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Exited(i32),
    Signaled(i32),
    TimedOut,
}

/// Output of a finished (or killed) process.
#[derive(Debug)]
pub struct Captured {
    pub exit: ProcessExit,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

/// Spawns a command and captures its stdout and stderr separately, waiting at
/// most `deadline`.
///
/// The child runs in its own process group (on Unix) with stdin closed.
/// Only a spawn failure is reported as an `Err`; a timeout is a normal
/// [`ProcessExit::TimedOut`] outcome.
///
/// 派生一个命令并分别捕获其 stdout 和 stderr，最多等待 `deadline`。
/// 只有派生失败会以 `Err` 返回；超时是正常的 `TimedOut` 结果。
pub async fn spawn_and_capture(mut cmd: Command, deadline: Duration) -> io::Result<Captured> {
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other(t!("command.capture_stdout_failed").to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other(t!("command.capture_stderr_failed").to_string()))?;

    let stdout_handle = read_all(stdout);
    let stderr_handle = read_all(stderr);

    let mut exit = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(status) => exit_from_status(status?),
        Err(_) => {
            tracing::debug!(pid = ?child.id(), "deadline expired, killing process group");
            kill_tree(&mut child).await;
            ProcessExit::TimedOut
        }
    };

    // A descendant may still hold the pipes open after the child exits.
    let remaining = deadline.saturating_sub(start.elapsed()) + READ_GRACE;
    let (stdout, stdout_done) = collect(stdout_handle, remaining).await;
    let (stderr, stderr_done) = collect(stderr_handle, READ_GRACE).await;
    if !(stdout_done && stderr_done) && exit != ProcessExit::TimedOut {
        tracing::debug!("output still open after exit, killing process group");
        kill_tree(&mut child).await;
        exit = ProcessExit::TimedOut;
    }

    Ok(Captured {
        exit,
        stdout,
        stderr,
        duration: start.elapsed(),
    })
}

fn read_all<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buffer).await {
            tracing::warn!("failed to read child output: {e}");
        }
        buffer
    })
}

/// Waits for a reader task; returns what it read and whether it finished in time.
async fn collect(mut handle: JoinHandle<Vec<u8>>, wait: Duration) -> (Vec<u8>, bool) {
    match tokio::time::timeout(wait, &mut handle).await {
        Ok(Ok(buffer)) => (buffer, true),
        Ok(Err(e)) => {
            tracing::warn!("output reader task failed: {e}");
            (Vec::new(), true)
        }
        Err(_) => {
            handle.abort();
            (Vec::new(), false)
        }
    }
}

fn exit_from_status(status: ExitStatus) -> ProcessExit {
    if let Some(code) = status.code() {
        return ProcessExit::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ProcessExit::Signaled(signal);
        }
    }
    ProcessExit::Signaled(0)
}

/// Kills the child's process group (Unix) or the child itself, then reaps it.
async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; a negative pid addresses the process group the
        // child leads since it was spawned with `process_group(0)`.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(pid, "killpg failed: {}", io::Error::last_os_error());
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("kill after timeout: {e}");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!("failed to reap killed child: {e}");
    }
}
