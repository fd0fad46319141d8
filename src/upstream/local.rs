//! Local shell capability — interactive shell processes with piped stdio.
//!
//! [`LocalShellConnector`] is the default [`ShellConnector`] for the shipped
//! binary: instead of dialing a remote host it spawns the configured shell
//! with piped stdin/stdout/stderr and presents the pipes as one duplex
//! channel. The `host`/`port`/credential arguments are accepted for trait
//! compatibility and ignored.
//!
//! The child has `kill_on_drop(true)`, so dropping the channel (session
//! teardown) kills the shell — no orphaned processes outlive their session.

use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::{BoxedDuplex, ShellConnection, ShellConnector, SshCredentials, UpstreamError};

/// Opens shell channels backed by local child processes.
pub struct LocalShellConnector {
    shell: String,
    working_dir: String,
}

impl LocalShellConnector {
    pub fn new(shell: &str, working_dir: &str) -> Self {
        Self {
            shell: shell.to_string(),
            working_dir: working_dir.to_string(),
        }
    }
}

#[async_trait]
impl ShellConnector for LocalShellConnector {
    async fn connect(
        &self,
        _host: &str,
        _port: u16,
        _credentials: &SshCredentials,
    ) -> Result<Box<dyn ShellConnection>, UpstreamError> {
        if !std::path::Path::new(&self.shell).exists() {
            return Err(UpstreamError::Connect {
                target: self.shell.clone(),
                message: "shell binary not found".to_string(),
            });
        }
        Ok(Box::new(LocalShellConnection {
            shell: self.shell.clone(),
            working_dir: self.working_dir.clone(),
        }))
    }
}

struct LocalShellConnection {
    shell: String,
    working_dir: String,
}

#[async_trait]
impl ShellConnection for LocalShellConnection {
    async fn open_shell(&mut self, term: &str) -> Result<BoxedDuplex, UpstreamError> {
        let mut child = Command::new(&self.shell)
            .current_dir(&self.working_dir)
            .env("TERM", term)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UpstreamError::Channel(format!("failed to spawn shell: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| UpstreamError::Channel("failed to take stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| UpstreamError::Channel("failed to take stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| UpstreamError::Channel("failed to take stderr pipe".to_string()))?;

        Ok(Box::new(ChildShellChannel {
            _child: child,
            stdin,
            stdout,
            stderr,
            stdout_done: false,
            stderr_done: false,
        }))
    }
}

/// Duplex view over a child process: writes go to stdin, reads interleave
/// stdout and stderr (stdout polled first). EOF is reported only once both
/// output pipes have closed.
struct ChildShellChannel {
    // Held for kill_on_drop; never waited on directly.
    _child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    stdout_done: bool,
    stderr_done: bool,
}

impl AsyncRead for ChildShellChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let me = &mut *self;
        let mut stdout_pending = false;

        if !me.stdout_done {
            let before = buf.filled().len();
            match Pin::new(&mut me.stdout).poll_read(cx, buf) {
                Poll::Ready(Ok(())) => {
                    if buf.filled().len() > before {
                        return Poll::Ready(Ok(()));
                    }
                    me.stdout_done = true;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => stdout_pending = true,
            }
        }

        if !me.stderr_done {
            let before = buf.filled().len();
            match Pin::new(&mut me.stderr).poll_read(cx, buf) {
                Poll::Ready(Ok(())) => {
                    if buf.filled().len() > before {
                        return Poll::Ready(Ok(()));
                    }
                    me.stderr_done = true;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }

        if stdout_pending {
            // stdout still open (waker registered), stderr drained.
            return Poll::Pending;
        }

        // Both pipes closed: EOF.
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ChildShellChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}
