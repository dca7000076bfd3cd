//! Transport abstraction layer for clashlink.
//!
//! Provides the [`Connection`] trait: one long-lived, ordered byte stream
//! to the game server. The protocol layer above it never sees sockets,
//! only bytes, so tests and alternative transports can plug in here.
//!
//! The trait offers two receive styles:
//!
//! - [`Connection::try_recv`] never waits. The per-tick pump uses it so a
//!   frame never blocks on the network.
//! - [`Connection::recv`] waits until bytes arrive. The handshake uses it
//!   inside a `tokio::select!` together with a deadline and cancellation.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::TcpConnection;

use std::fmt;
use std::net::SocketAddr;

/// Result of a receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `n` bytes were written into the caller's buffer.
    Data(usize),
    /// Nothing is pending right now. Only returned by `try_recv`.
    Pending,
    /// The peer closed the stream.
    Closed,
}

impl Received {
    /// Number of bytes received, zero for `Pending` and `Closed`.
    pub fn len(self) -> usize {
        match self {
            Self::Data(n) => n,
            Self::Pending | Self::Closed => 0,
        }
    }

    /// Returns `true` unless bytes were actually received.
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(n) => write!(f, "{n} bytes"),
            Self::Pending => write!(f, "pending"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A single connection to the server that can send and receive bytes.
///
/// Exactly one task owns a connection. Methods take `&self` so the
/// owner can wait for incoming data while holding other borrows of its
/// own state.
pub trait Connection: Sized + Send + Sync + 'static {
    /// Opens a connection to `addr` (`host:port`).
    async fn connect(addr: &str) -> Result<Self, TransportError>;

    /// Writes all of `data` to the peer.
    ///
    /// Sending on a connection that is no longer connected is skipped
    /// silently. Callers check [`is_connected`](Self::is_connected) when
    /// they care.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Waits until bytes are available and reads them into `buf`.
    ///
    /// Returns [`Received::Closed`] when the peer closed the stream.
    async fn recv(&self, buf: &mut [u8]) -> Result<Received, TransportError>;

    /// Reads whatever is pending without waiting.
    fn try_recv(&self, buf: &mut [u8]) -> Result<Received, TransportError>;

    /// Shuts the connection down.
    async fn close(self) -> Result<(), TransportError>;

    /// Returns `false` once the stream was closed or failed.
    fn is_connected(&self) -> bool;

    /// The server address this connection talks to.
    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_len_counts_only_data() {
        assert_eq!(Received::Data(12).len(), 12);
        assert_eq!(Received::Pending.len(), 0);
        assert_eq!(Received::Closed.len(), 0);
    }

    #[test]
    fn test_received_is_empty() {
        assert!(!Received::Data(1).is_empty());
        assert!(Received::Data(0).is_empty());
        assert!(Received::Pending.is_empty());
    }

    #[test]
    fn test_received_display() {
        assert_eq!(Received::Data(7).to_string(), "7 bytes");
        assert_eq!(Received::Pending.to_string(), "pending");
        assert_eq!(Received::Closed.to_string(), "closed");
    }
}
