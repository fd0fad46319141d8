//! One terminal session: a browser message channel bridged to a shell
//! channel obtained from the [`ShellConnector`] capability.
//!
//! Lifecycle is a fixed state machine:
//!
//! ```text
//! Connecting → Established → Closing → Closed
//! ```
//!
//! The shell channel exists only in `Established`. Unlike the CONNECT
//! tunnel, there is no half-close: the browser message channel cannot
//! half-close, so end-of-stream or error on *either* side ends the whole
//! session. Teardown is idempotent — the session task is the single owner
//! of both endpoints, so concurrent close triggers collapse into one pass
//! through `Closing`.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::upstream::ShellConnector;

use super::UpstreamTarget;

/// Lifecycle of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Established,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Established => "established",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

/// Read chunk size for shell output. One chunk is in flight per direction,
/// so this also bounds per-session memory.
const SHELL_READ_BUF: usize = 8192;

/// Run a session to completion.
///
/// - `client_tx` — text chunks toward the browser (shell output and the
///   one-line failure diagnostics).
/// - `client_rx` — raw input chunks from the browser; the sender dropping
///   means the client disconnected.
/// - `close_rx` — registry-triggered teardown signal.
///
/// Connect/auth and shell-open failures emit a single diagnostic message to
/// the client and end the session; no retry is attempted. The caller removes
/// the session from the registry after this returns.
pub async fn run(
    id: String,
    connector: Arc<dyn ShellConnector>,
    target: UpstreamTarget,
    client_tx: mpsc::Sender<String>,
    mut client_rx: mpsc::Receiver<Vec<u8>>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut state = SessionState::Connecting;
    debug!(session_id = %id, state = state.as_str(), host = %target.host, "Session connecting");

    let mut connection = match connector
        .connect(&target.host, target.port, &target.credentials)
        .await
    {
        Ok(conn) => conn,
        Err(e) => {
            let _ = client_tx
                .send(format!("\r\n*** CONNECT ERROR: {e} ***\r\n"))
                .await;
            debug!(session_id = %id, "Session failed to connect: {e}");
            return;
        }
    };

    let channel = match connection.open_shell(&target.term).await {
        Ok(ch) => ch,
        Err(e) => {
            let _ = client_tx
                .send(format!("\r\n*** SHELL ERROR: {e} ***\r\n"))
                .await;
            debug!(session_id = %id, "Session failed to open shell: {e}");
            return;
        }
    };

    state = SessionState::Established;
    info!(session_id = %id, state = state.as_str(), "Session established");

    let (mut shell_rd, mut shell_wr) = tokio::io::split(channel);
    let mut buf = vec![0u8; SHELL_READ_BUF];

    // Message relay: input messages become shell writes, shell output bytes
    // become client messages. First end-of-stream or error on any side ends
    // the session.
    loop {
        tokio::select! {
            input = client_rx.recv() => {
                match input {
                    Some(data) => {
                        if shell_wr.write_all(&data).await.is_err() {
                            break;
                        }
                    }
                    // Client disconnected.
                    None => break,
                }
            }
            read = shell_rd.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if client_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                }
            }
            _ = close_rx.changed() => break,
        }
    }

    state = SessionState::Closing;
    debug!(session_id = %id, state = state.as_str(), "Session closing");

    // Close the shell side; the client side closes when client_tx drops.
    let _ = shell_wr.shutdown().await;
    drop(shell_rd);

    state = SessionState::Closed;
    info!(session_id = %id, state = state.as_str(), "Session closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::watch;
    use tokio::time::{timeout, Duration};

    use crate::upstream::{
        BoxedDuplex, ShellConnection, SshCredentials, UpstreamError,
    };

    /// Shell capability backed by in-memory duplex pairs. Hands the far side
    /// of each opened shell to the test.
    struct FakeShell {
        far_sides: Mutex<Vec<mpsc::UnboundedSender<DuplexStream>>>,
    }

    impl FakeShell {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    far_sides: Mutex::new(vec![tx]),
                }),
                rx,
            )
        }
    }

    #[async_trait]
    impl ShellConnector for FakeShell {
        async fn connect(
            &self,
            _host: &str,
            _port: u16,
            _credentials: &SshCredentials,
        ) -> Result<Box<dyn ShellConnection>, UpstreamError> {
            let tx = self.far_sides.lock().unwrap()[0].clone();
            Ok(Box::new(FakeConnection { far_tx: tx }))
        }
    }

    struct FakeConnection {
        far_tx: mpsc::UnboundedSender<DuplexStream>,
    }

    #[async_trait]
    impl ShellConnection for FakeConnection {
        async fn open_shell(&mut self, _term: &str) -> Result<BoxedDuplex, UpstreamError> {
            let (near, far) = tokio::io::duplex(4096);
            self.far_tx.send(far).expect("test receiver alive");
            Ok(Box::new(near))
        }
    }

    /// Shell capability that always fails authentication.
    struct AuthFailShell;

    #[async_trait]
    impl ShellConnector for AuthFailShell {
        async fn connect(
            &self,
            _host: &str,
            _port: u16,
            _credentials: &SshCredentials,
        ) -> Result<Box<dyn ShellConnection>, UpstreamError> {
            Err(UpstreamError::Auth("bad password".to_string()))
        }
    }

    fn target() -> UpstreamTarget {
        UpstreamTarget {
            host: "localhost".to_string(),
            port: 22,
            credentials: SshCredentials {
                username: "root".to_string(),
                password: None,
            },
            term: "xterm".to_string(),
        }
    }

    struct Harness {
        client_in: mpsc::Sender<Vec<u8>>,
        client_out: mpsc::Receiver<String>,
        close_tx: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_session(connector: Arc<dyn ShellConnector>, id: &str) -> Harness {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            id.to_string(),
            connector,
            target(),
            out_tx,
            in_rx,
            close_rx,
        ));
        Harness {
            client_in: in_tx,
            client_out: out_rx,
            close_tx,
            task,
        }
    }

    #[tokio::test]
    async fn input_reaches_shell_and_output_reaches_client() {
        let (shell, mut far_rx) = FakeShell::new();
        let mut h = spawn_session(shell, "s1");

        let mut far = far_rx.recv().await.unwrap();

        // Client types a command.
        h.client_in.send(b"ls\n".to_vec()).await.unwrap();
        let mut cmd = [0u8; 3];
        far.read_exact(&mut cmd).await.unwrap();
        assert_eq!(&cmd, b"ls\n");

        // Shell emits a directory listing; client sees exactly those bytes.
        far.write_all(b"Cargo.toml\nsrc\n").await.unwrap();
        let out = h.client_out.recv().await.unwrap();
        assert_eq!(out, "Cargo.toml\nsrc\n");

        // Client disconnects; the shell channel closes (read returns EOF).
        drop(h.client_in);
        let mut rest = Vec::new();
        timeout(Duration::from_secs(5), far.read_to_end(&mut rest))
            .await
            .expect("shell channel must close after client disconnect")
            .unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn shell_close_ends_the_session() {
        let (shell, mut far_rx) = FakeShell::new();
        let mut h = spawn_session(shell, "s2");

        let far = far_rx.recv().await.unwrap();
        drop(far); // upstream closes

        timeout(Duration::from_secs(5), h.task)
            .await
            .expect("session must end after upstream close")
            .unwrap();
        // Output channel is closed, no further messages.
        assert!(h.client_out.recv().await.is_none());
    }

    #[tokio::test]
    async fn registry_close_signal_tears_down() {
        let (shell, mut far_rx) = FakeShell::new();
        let h = spawn_session(shell, "s3");

        let _far = far_rx.recv().await.unwrap();
        h.close_tx.send(true).unwrap();

        timeout(Duration::from_secs(5), h.task)
            .await
            .expect("session must honor teardown signal")
            .unwrap();
    }

    #[tokio::test]
    async fn auth_failure_emits_one_diagnostic_and_closes() {
        let mut h = spawn_session(Arc::new(AuthFailShell), "s4");

        let diag = h.client_out.recv().await.unwrap();
        assert!(diag.contains("*** CONNECT ERROR"), "got: {diag}");
        assert!(diag.contains("bad password"));

        h.task.await.unwrap();
        assert!(h.client_out.recv().await.is_none(), "exactly one diagnostic");
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_observe_each_other() {
        let (shell_a, mut far_a_rx) = FakeShell::new();
        let (shell_b, mut far_b_rx) = FakeShell::new();
        let h_a = spawn_session(shell_a, "a");
        let mut h_b = spawn_session(shell_b, "b");

        let mut far_a = far_a_rx.recv().await.unwrap();
        let mut far_b = far_b_rx.recv().await.unwrap();

        h_a.client_in.send(b"secret-a\n".to_vec()).await.unwrap();

        let mut got = [0u8; 9];
        far_a.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"secret-a\n");

        // Session B's upstream must see nothing. Give it a real chance to
        // misbehave, then assert silence.
        let mut buf = [0u8; 9];
        let b_read = timeout(Duration::from_millis(200), far_b.read(&mut buf)).await;
        assert!(b_read.is_err(), "session B upstream saw unexpected bytes");

        // And B's client output is similarly silent.
        let b_out = timeout(Duration::from_millis(100), h_b.client_out.recv()).await;
        assert!(b_out.is_err());

        drop(h_a);
    }
}
