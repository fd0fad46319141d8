//! Error taxonomy for relay and tunnel sessions.
//!
//! Every error is scoped to the session or tunnel that produced it — the
//! accept loops never die because one connection failed. Resolution and
//! upstream-connect failures produce exactly one user-visible signal (a
//! status line for tunnels, a diagnostic message for terminal sessions);
//! mid-session I/O failures tear the session down without retry, since
//! partial output may already have been delivered.

use crate::upstream::UpstreamError;

/// Errors produced while establishing or running a relay/tunnel session.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// DNS resolution of the tunnel target failed.
    #[error("failed to resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The upstream connect (SSH or proxy capability) failed.
    #[error("upstream connect failed: {0}")]
    UpstreamConnect(#[from] UpstreamError),

    /// Read/write failure on either endpoint mid-session.
    #[error("relay I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CONNECT request or unsupported method.
    #[error("protocol error: {0}")]
    Protocol(String),
}
