//! Bidirectional byte relay between two duplex endpoints.
//!
//! This is the copy primitive shared by the CONNECT tunnel gateway and any
//! other stream-to-stream bridge. Each direction forwards one chunk at a
//! time — a read is not issued until the previous chunk has been written —
//! so a slow consumer stalls the producer's reads and memory per relay stays
//! bounded to a constant number of in-flight chunks.
//!
//! Half-close semantics: EOF on one direction shuts down only the paired
//! write side; the opposite direction keeps flowing until it also ends,
//! matching TCP behavior on CONNECT tunnels. (The terminal relay does *not*
//! use this — a browser message channel is not half-closable, so a close on
//! either side ends the whole session; see `terminal::session`.)

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::RelayError;

/// Final disposition of a relay.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Both directions reached end-of-stream; byte counts are exact.
    Complete { a_to_b: u64, b_to_a: u64 },
    /// A peer went away mid-stream (reset, broken pipe, truncated stream).
    /// This is a normal tunnel termination, but byte counts past the abort
    /// point are unknown, so only the close reason is carried.
    PeerClosed(std::io::ErrorKind),
}

/// Pump bytes both ways until both directions have ended.
///
/// Connection resets, broken pipes, and unexpected EOFs are reported as
/// [`RelayOutcome::PeerClosed`], not errors; anything else surfaces as
/// [`RelayError::Io`] after both directions have been aborted.
pub async fn relay_streams<A, B>(a: &mut A, b: &mut B) -> Result<RelayOutcome, RelayError>
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match tokio::io::copy_bidirectional(a, b).await {
        Ok((a_to_b, b_to_a)) => Ok(RelayOutcome::Complete { a_to_b, b_to_a }),
        Err(e) if is_clean_close(&e) => Ok(RelayOutcome::PeerClosed(e.kind())),
        Err(e) => Err(RelayError::Io(e)),
    }
}

/// Whether an I/O error represents a peer going away rather than a fault.
fn is_clean_close(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
    )
}
