//! CONNECT tunnel gateway.
//!
//! A small local TCP server that accepts HTTP CONNECT requests and forwards
//! the tunneled byte stream through the configured [`ProxyConnector`]. It
//! exists so that tools which only speak HTTP CONNECT proxies (HTTP client
//! stacks, long-lived upgrade-based connections) can ride a SOCKS5-capable
//! egress path — a protocol-translation shim, not a general proxy.
//!
//! Each accepted connection walks a fixed state machine:
//!
//! ```text
//! Resolving → ConnectingUpstream → Tunneling → Closed
//! ```
//!
//! The client never sees `200 Connection Established` before the upstream
//! socket exists; any failure before `Tunneling` answers a single failure
//! status line and closes — the connection is never left half-open. Failures
//! are scoped to their own connection; the accept loop never dies.

pub mod connect;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::RelayError;
use crate::relay::{relay_streams, RelayOutcome};
use crate::upstream::ProxyConnector;
use connect::{
    parse_connect, read_request_head, RESPONSE_BAD_GATEWAY, RESPONSE_BAD_REQUEST,
    RESPONSE_ESTABLISHED,
};

/// Lifecycle of a single tunnel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Resolving,
    ConnectingUpstream,
    Tunneling,
    Closed,
}

impl TunnelState {
    pub fn as_str(self) -> &'static str {
        match self {
            TunnelState::Resolving => "resolving",
            TunnelState::ConnectingUpstream => "connecting_upstream",
            TunnelState::Tunneling => "tunneling",
            TunnelState::Closed => "closed",
        }
    }
}

/// The gateway server. Cheap to share; one instance serves all tunnels.
pub struct TunnelGateway {
    connector: Arc<dyn ProxyConnector>,
    /// Prefer IPv6 addresses when resolving targets (default is the
    /// conventional CONNECT-client behavior: IPv4 first).
    prefer_ipv6: bool,
    /// Cap on the CONNECT request head.
    max_header_bytes: usize,
}

impl TunnelGateway {
    pub fn new(connector: Arc<dyn ProxyConnector>, prefer_ipv6: bool, max_header_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            connector,
            prefer_ipv6,
            max_header_bytes,
        })
    }

    /// Accept loop. Each connection gets its own task; accept errors are
    /// logged and the loop continues.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let gateway = self.clone();
                    tokio::spawn(
                        async move {
                            gateway.handle_connection(stream).await;
                        }
                        .instrument(info_span!("tunnel", %peer)),
                    );
                }
                Err(e) => {
                    warn!("Accept error: {e}");
                }
            }
        }
    }

    /// Drive one connection through the tunnel state machine.
    async fn handle_connection(&self, mut client: TcpStream) {
        match self.run_tunnel(&mut client).await {
            Ok(RelayOutcome::Complete { a_to_b, b_to_a }) => {
                debug!(to_upstream = a_to_b, to_client = b_to_a, "Tunnel closed");
            }
            Ok(RelayOutcome::PeerClosed(reason)) => {
                debug!(?reason, "Tunnel closed by peer");
            }
            Err(e) => {
                debug!("Tunnel failed: {e}");
            }
        }
        // Both endpoints drop here; state is Closed either way.
    }

    async fn run_tunnel(&self, client: &mut TcpStream) -> Result<RelayOutcome, RelayError> {
        let (head, pipelined) = match read_request_head(client, self.max_header_bytes).await {
            Ok(parts) => parts,
            Err(e) => {
                let _ = client.write_all(RESPONSE_BAD_REQUEST).await;
                return Err(RelayError::Protocol(format!("bad request head: {e}")));
            }
        };

        let request = match parse_connect(&head) {
            Ok(r) => r,
            Err(reject) => {
                let _ = client.write_all(reject.response()).await;
                return Err(RelayError::Protocol(reject.to_string()));
            }
        };

        let mut state = TunnelState::Resolving;
        debug!(host = %request.host, port = request.port, state = state.as_str(), "CONNECT");

        let resolved = match self.resolve(&request.host, request.port).await {
            Ok(addr) => addr,
            Err(e) => {
                let _ = client.write_all(RESPONSE_BAD_GATEWAY).await;
                return Err(e);
            }
        };

        state = TunnelState::ConnectingUpstream;
        debug!(resolved = %resolved, state = state.as_str(), "Resolved");

        let mut upstream = match self
            .connector
            .connect(&resolved.ip().to_string(), request.port)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                let _ = client.write_all(RESPONSE_BAD_GATEWAY).await;
                return Err(RelayError::UpstreamConnect(e));
            }
        };

        // Upstream is live — only now may the client hear success.
        state = TunnelState::Tunneling;
        client.write_all(RESPONSE_ESTABLISHED).await?;

        // Bytes the client pipelined past the request head belong to the
        // tunnel payload; forward them before normal relaying begins.
        if !pipelined.is_empty() {
            upstream.write_all(&pipelined).await?;
        }

        info!(host = %request.host, port = request.port, state = state.as_str(), "Tunnel established");
        relay_streams(client, &mut upstream).await
    }

    /// Resolve a hostname to one numeric address, IPv4-preferred unless
    /// configured otherwise.
    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, RelayError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| RelayError::Resolution {
                host: host.to_string(),
                source: e,
            })?
            .collect();

        let pick = if self.prefer_ipv6 {
            addrs
                .iter()
                .find(|a| a.is_ipv6())
                .or_else(|| addrs.first())
        } else {
            addrs
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addrs.first())
        };

        pick.copied().ok_or_else(|| RelayError::Resolution {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use crate::upstream::{BoxedDuplex, UpstreamError};

    /// Proxy capability whose "destination" is an in-memory echo peer.
    /// Records the destinations it was asked to reach.
    struct EchoProxy {
        destinations: Mutex<Vec<(String, u16)>>,
    }

    impl EchoProxy {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                destinations: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ProxyConnector for EchoProxy {
        async fn connect(
            &self,
            dest_host: &str,
            dest_port: u16,
        ) -> Result<BoxedDuplex, UpstreamError> {
            self.destinations
                .lock()
                .unwrap()
                .push((dest_host.to_string(), dest_port));
            let (near, mut far) = tokio::io::duplex(4096);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match far.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if far.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            Ok(Box::new(near))
        }
    }

    /// Proxy capability that always refuses.
    struct RefusingProxy;

    #[async_trait]
    impl ProxyConnector for RefusingProxy {
        async fn connect(
            &self,
            dest_host: &str,
            dest_port: u16,
        ) -> Result<BoxedDuplex, UpstreamError> {
            Err(UpstreamError::Connect {
                target: format!("{dest_host}:{dest_port}"),
                message: "connection refused".to_string(),
            })
        }
    }

    async fn start_gateway(connector: Arc<dyn ProxyConnector>) -> SocketAddr {
        let gateway = TunnelGateway::new(connector, false, 8192);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(gateway.serve(listener));
        addr
    }

    async fn read_status_line(stream: &mut TcpStream) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            stream.read_exact(&mut byte).await.unwrap();
            line.push(byte[0]);
            if line.ends_with(b"\r\n") {
                break;
            }
        }
        String::from_utf8(line).unwrap()
    }

    #[tokio::test]
    async fn connect_establishes_and_relays_verbatim() {
        let proxy = EchoProxy::new();
        let addr = start_gateway(proxy.clone()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"CONNECT 127.0.0.1:9999 HTTP/1.1\r\nHost: 127.0.0.1:9999\r\n\r\n")
            .await
            .unwrap();

        let status = read_status_line(&mut client).await;
        assert_eq!(status, "HTTP/1.1 200 Connection Established\r\n");
        // Drain the blank line terminating the response.
        let mut rest = [0u8; 2];
        client.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"\r\n");

        client.write_all(b"tunneled payload").await.unwrap();
        let mut echoed = [0u8; 16];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"tunneled payload");

        // The connector saw the resolved numeric target.
        let dests = proxy.destinations.lock().unwrap();
        assert_eq!(dests.as_slice(), &[("127.0.0.1".to_string(), 9999)]);
    }

    #[tokio::test]
    async fn pipelined_bytes_are_forwarded_not_dropped() {
        let proxy = EchoProxy::new();
        let addr = start_gateway(proxy).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        // Head and payload in one write, before the gateway has answered.
        client
            .write_all(b"CONNECT 127.0.0.1:443 HTTP/1.1\r\n\r\nearly bytes")
            .await
            .unwrap();

        let status = read_status_line(&mut client).await;
        assert_eq!(status, "HTTP/1.1 200 Connection Established\r\n");
        let mut blank = [0u8; 2];
        client.read_exact(&mut blank).await.unwrap();

        let mut echoed = [0u8; 11];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"early bytes");
    }

    #[tokio::test]
    async fn upstream_refusal_yields_bad_gateway_not_success() {
        let addr = start_gateway(Arc::new(RefusingProxy)).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"CONNECT 127.0.0.1:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let status = read_status_line(&mut client).await;
        assert_eq!(status, "HTTP/1.1 502 Bad Gateway\r\n");

        // Connection closes after the failure line: read to EOF.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"\r\n");
    }

    #[tokio::test]
    async fn unresolvable_host_yields_bad_gateway_never_a_hang() {
        let addr = start_gateway(EchoProxy::new()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"CONNECT host.invalid:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let status = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            read_status_line(&mut client),
        )
        .await
        .expect("gateway must answer, not hang");
        assert_eq!(status, "HTTP/1.1 502 Bad Gateway\r\n");
    }

    #[tokio::test]
    async fn non_connect_method_is_rejected_and_closed() {
        let addr = start_gateway(EchoProxy::new()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .await
            .unwrap();

        let status = read_status_line(&mut client).await;
        assert_eq!(status, "HTTP/1.1 405 Method Not Allowed\r\n");

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"\r\n");
    }
}
