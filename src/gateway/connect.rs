//! CONNECT request parsing and fixed response lines.
//!
//! The gateway speaks just enough HTTP to accept tunnel-establishment
//! requests of the form:
//!
//! ```text
//! CONNECT host:port HTTP/1.1\r\n
//! <headers…>\r\n
//! \r\n
//! ```
//!
//! Everything after the blank line is opaque tunneled payload. Headers are
//! read and discarded — this is a tunnel-only gateway, not a general proxy,
//! so any other method gets a fixed `405` and the connection is closed.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Success status line sent once the upstream socket is established.
pub const RESPONSE_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
/// Failure status line for resolution/upstream-connect failures.
pub const RESPONSE_BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";
/// Fixed response for non-CONNECT methods.
pub const RESPONSE_METHOD_NOT_ALLOWED: &[u8] = b"HTTP/1.1 405 Method Not Allowed\r\n\r\n";
/// Fixed response for heads we cannot parse at all.
pub const RESPONSE_BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

/// A parsed CONNECT target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
}

/// Why a request head was rejected. Maps to the fixed response to send
/// before closing.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectReject {
    /// Parseable request line, but not a CONNECT.
    UnsupportedMethod(String),
    /// Head could not be parsed as an HTTP request at all.
    Malformed(String),
}

impl ConnectReject {
    pub fn response(&self) -> &'static [u8] {
        match self {
            ConnectReject::UnsupportedMethod(_) => RESPONSE_METHOD_NOT_ALLOWED,
            ConnectReject::Malformed(_) => RESPONSE_BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for ConnectReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectReject::UnsupportedMethod(m) => write!(f, "unsupported method: {m}"),
            ConnectReject::Malformed(m) => write!(f, "malformed request: {m}"),
        }
    }
}

/// Read the request head (everything through the first `\r\n\r\n`) from a
/// fresh connection.
///
/// Returns `(head, pipelined)` where `pipelined` is any bytes the client
/// sent past the blank line — those belong to the tunnel payload and must be
/// forwarded upstream once tunneling begins, never dropped.
///
/// Errors with `InvalidData` if the head exceeds `max_bytes`, and
/// `UnexpectedEof` if the connection closes before the head completes.
pub async fn read_request_head<S>(
    stream: &mut S,
    max_bytes: usize,
) -> std::io::Result<(Vec<u8>, Vec<u8>)>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut buf: Vec<u8> = Vec::with_capacity(512);
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = find_head_end(&buf) {
            let pipelined = buf.split_off(end);
            return Ok((buf, pipelined));
        }
        if buf.len() >= max_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before request head completed",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Offset just past the `\r\n\r\n` terminator, if present.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse a request head into a CONNECT target.
pub fn parse_connect(head: &[u8]) -> Result<ConnectRequest, ConnectReject> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ConnectReject::Malformed("head is not valid UTF-8".to_string()))?;
    let request_line = text
        .lines()
        .next()
        .ok_or_else(|| ConnectReject::Malformed("empty request".to_string()))?;

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ConnectReject::Malformed("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| ConnectReject::Malformed("missing request target".to_string()))?;
    let version = parts
        .next()
        .ok_or_else(|| ConnectReject::Malformed("missing HTTP version".to_string()))?;

    if !version.starts_with("HTTP/") {
        return Err(ConnectReject::Malformed(format!(
            "bad HTTP version: {version}"
        )));
    }
    if method != "CONNECT" {
        return Err(ConnectReject::UnsupportedMethod(method.to_string()));
    }

    let (host, port) = parse_host_port(target)?;
    Ok(ConnectRequest { host, port })
}

/// Split an authority into host and port.
///
/// - `example.com:443` → `("example.com", 443)`
/// - `example.com` → `("example.com", 443)` (CONNECT default)
/// - `[::1]:8443` → `("::1", 8443)`
fn parse_host_port(authority: &str) -> Result<(String, u16), ConnectReject> {
    if let Some((host, port_str)) = authority.rsplit_once(':') {
        // Bracketed IPv6 without a port ends in ']' and the rsplit lands
        // inside the address; treat that as "no port".
        if !port_str.ends_with(']') {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| ConnectReject::Malformed(format!("invalid port: {port_str}")))?;
            let host = if host.starts_with('[') && host.ends_with(']') {
                host[1..host.len() - 1].to_string()
            } else {
                host.to_string()
            };
            if host.is_empty() {
                return Err(ConnectReject::Malformed("empty host".to_string()));
            }
            return Ok((host, port));
        }
    }
    let host = authority.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ConnectReject::Malformed("empty host".to_string()));
    }
    Ok((host.to_string(), 443))
}
