//! Capability seams for upstream connectivity.
//!
//! The relay core does not speak SSH or SOCKS5 itself. It depends on two
//! narrow capability traits that a downstream crate implements with a real
//! protocol client (and that tests implement with in-memory fakes):
//!
//! - [`ShellConnector`] — `connect(host, port, credentials)` yields a
//!   [`ShellConnection`], whose `open_shell(term)` yields a duplex byte
//!   stream carrying the interactive shell.
//! - [`ProxyConnector`] — `connect(dest_host, dest_port)` yields a duplex
//!   byte stream to the destination, through whatever proxy the provider
//!   was constructed with.
//!
//! Two concrete providers ship with the crate: [`DirectConnector`] (plain
//! TCP, the "no proxy configured" egress mode) and
//! [`local::LocalShellConnector`] (a local shell process with piped stdio).

pub mod local;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A duplex byte stream endpoint. Blanket-implemented for anything that is
/// both readable and writable.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

impl std::fmt::Debug for dyn Duplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Duplex")
    }
}

/// Boxed duplex stream, the currency of all capability traits.
pub type BoxedDuplex = Box<dyn Duplex>;

/// Typed failures surfaced by capability providers.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// TCP/transport-level connect failure (refused, timeout, unreachable).
    #[error("connect to {target} failed: {message}")]
    Connect { target: String, message: String },

    /// Authentication against the upstream failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The connection was established but the channel/shell could not open.
    #[error("channel open failed: {0}")]
    Channel(String),
}

/// Credentials passed through to the shell capability. The relay core never
/// interprets these beyond handing them to the provider.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    pub username: String,
    pub password: Option<String>,
}

/// Capability that opens interactive shell channels on a remote (or local)
/// host. One connection per session; the registry never pools or shares.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
    ) -> Result<Box<dyn ShellConnection>, UpstreamError>;
}

/// An authenticated connection from which shell channels can be opened.
#[async_trait]
pub trait ShellConnection: Send {
    /// Open an interactive shell with the given terminal type (e.g. `xterm`).
    async fn open_shell(&mut self, term: &str) -> Result<BoxedDuplex, UpstreamError>;
}

/// Capability that opens a tunneled byte stream to a destination through an
/// upstream proxy. The provider holds the proxy address and credentials.
#[async_trait]
pub trait ProxyConnector: Send + Sync {
    async fn connect(&self, dest_host: &str, dest_port: u16) -> Result<BoxedDuplex, UpstreamError>;
}

/// Plain-TCP egress: `connect` goes straight to the destination. Used when
/// no upstream proxy is configured.
pub struct DirectConnector;

#[async_trait]
impl ProxyConnector for DirectConnector {
    async fn connect(&self, dest_host: &str, dest_port: u16) -> Result<BoxedDuplex, UpstreamError> {
        // Numeric hosts go through SocketAddr so IPv6 gets bracketed.
        let target = match dest_host.parse::<std::net::IpAddr>() {
            Ok(ip) => std::net::SocketAddr::new(ip, dest_port).to_string(),
            Err(_) => format!("{dest_host}:{dest_port}"),
        };
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|e| UpstreamError::Connect {
                target: target.clone(),
                message: e.to_string(),
            })?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn direct_connector_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hi").await.unwrap();
        });

        let mut conn = DirectConnector
            .connect("127.0.0.1", addr.port())
            .await
            .unwrap();
        let mut buf = [0u8; 2];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn direct_connector_refused_is_typed() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = DirectConnector
            .connect("127.0.0.1", addr.port())
            .await
            .unwrap_err();
        match err {
            UpstreamError::Connect { target, .. } => {
                assert!(target.contains(&addr.port().to_string()));
            }
            other => unreachable!("expected Connect error, got {other:?}"),
        }
    }
}
