// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Command Runner: spawns a child process, enforces a timeout and an output
//! byte cap, and reports back exactly what happened. This is the primitive
//! the `exec` tool is built on; it has no knowledge of tool-call framing.
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Default grace period between SIGTERM and SIGKILL when a command times out.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ads_core::IntoErrorKind for CommandError {
    fn error_kind(&self) -> ads_core::ErrorKind {
        ads_core::ErrorKind::Tool
    }
}

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub truncated_stdout: bool,
    pub truncated_stderr: bool,
    pub command_line: String,
}

/// Run `req`, enforcing `timeout_ms` and `max_output_bytes`.
///
/// The command line reported back is the argv joined with single spaces
/// (not shell-escaped) so it is always a faithful echo of what was spawned,
/// never a re-interpretable shell string.
pub async fn run_command(req: CommandRequest) -> Result<CommandResult, CommandError> {
    let command_line = std::iter::once(req.cmd.clone())
        .chain(req.args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    let mut cmd = Command::new(&req.cmd);
    cmd.args(&req.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &req.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &req.env {
        cmd.env(k, v);
    }
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    debug!(cmd = %req.cmd, args = ?req.args, "spawning command");
    let mut child = cmd.spawn().map_err(CommandError::Spawn)?;
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let start = Instant::now();
    let timeout = Duration::from_millis(req.timeout_ms.max(1));

    let (status, stdout_buf, stderr_buf, timed_out) = match tokio::time::timeout(
        timeout,
        collect_all(&mut child, &mut stdout_pipe, &mut stderr_pipe, req.max_output_bytes),
    )
    .await
    {
        Ok(Ok((status, out, err))) => (Some(status), out, err, false),
        Ok(Err(e)) => {
            warn!(error = %e, cmd = %req.cmd, "command I/O error");
            (None, Vec::new(), Vec::new(), false)
        }
        Err(_) => {
            warn!(cmd = %req.cmd, timeout_ms = req.timeout_ms, "command timed out, terminating");
            terminate(&mut child).await;
            let (out, err) = drain_best_effort(stdout_pipe, stderr_pipe, req.max_output_bytes).await;
            (None, out, err, true)
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let exit_code = status.and_then(|s| s.code());
    #[cfg(unix)]
    let signal = status.and_then(unix_signal);
    #[cfg(not(unix))]
    let signal = None;

    let (stdout, truncated_stdout) = cap_utf8(&stdout_buf, req.max_output_bytes);
    let (stderr, truncated_stderr) = cap_utf8(&stderr_buf, req.max_output_bytes);

    Ok(CommandResult {
        exit_code,
        signal,
        elapsed_ms,
        timed_out,
        stdout,
        stderr,
        truncated_stdout,
        truncated_stderr,
        command_line,
    })
}

#[cfg(unix)]
fn unix_signal(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

async fn collect_all(
    child: &mut tokio::process::Child,
    stdout_pipe: &mut Option<tokio::process::ChildStdout>,
    stderr_pipe: &mut Option<tokio::process::ChildStderr>,
    cap: usize,
) -> std::io::Result<(std::process::ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdout_fut = read_capped(stdout_pipe.take(), cap);
    let stderr_fut = read_capped(stderr_pipe.take(), cap);
    let (status, stdout, stderr) = tokio::join!(child.wait(), stdout_fut, stderr_fut);
    Ok((status?, stdout, stderr))
}

async fn read_capped<R: AsyncRead + Unpin>(pipe: Option<R>, cap: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut p) = pipe {
        let mut chunk = [0u8; 8192];
        loop {
            match p.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > cap * 2 {
                        // Stop reading once well past the cap; final truncation
                        // happens in cap_utf8. Bounds memory use on chatty children.
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
    buf
}

async fn drain_best_effort(
    stdout_pipe: Option<tokio::process::ChildStdout>,
    stderr_pipe: Option<tokio::process::ChildStderr>,
    cap: usize,
) -> (Vec<u8>, Vec<u8>) {
    let out = tokio::time::timeout(Duration::from_millis(200), read_capped(stdout_pipe, cap))
        .await
        .unwrap_or_default();
    let err = tokio::time::timeout(Duration::from_millis(200), read_capped(stderr_pipe, cap))
        .await
        .unwrap_or_default();
    (out, err)
}

async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
        return;
    }
    let _ = child.kill().await;
}

fn cap_utf8(buf: &[u8], cap: usize) -> (String, bool) {
    if buf.len() <= cap {
        (String::from_utf8_lossy(buf).into_owned(), false)
    } else {
        (String::from_utf8_lossy(&buf[..cap]).into_owned(), true)
    }
}
