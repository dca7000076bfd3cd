//! TCP transport implementation using `tokio::net::TcpStream`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::{Connection, Received, TransportError};

/// A [`Connection`] over a plain TCP stream.
///
/// Reads and writes go through tokio's readiness API (`try_read`,
/// `try_write`, `readable`, `writable`), all of which work on `&TcpStream`.
/// That keeps the connection usable from `&self` without a mutex.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    connected: AtomicBool,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "could not disable Nagle");
        }
        Ok(Self {
            stream,
            peer,
            connected: AtomicBool::new(true),
        })
    }

    fn mark_closed(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            tracing::debug!(peer = %self.peer, "connection marked closed");
        }
    }
}

impl Connection for TcpConnection {
    async fn connect(addr: &str) -> Result<Self, TransportError> {
        let connect_failed = |source| TransportError::ConnectFailed {
            addr: addr.to_string(),
            source,
        };
        let stream = TcpStream::connect(addr).await.map_err(connect_failed)?;
        let conn = Self::from_stream(stream).map_err(connect_failed)?;
        tracing::info!(peer = %conn.peer, "TCP connection established");
        Ok(conn)
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            tracing::debug!(
                peer = %self.peer,
                len = data.len(),
                "send skipped, not connected"
            );
            return Ok(());
        }

        let mut written = 0;
        while written < data.len() {
            self.stream
                .writable()
                .await
                .map_err(TransportError::SendFailed)?;
            match self.stream.try_write(&data[written..]) {
                Ok(0) => {
                    self.mark_closed();
                    return Err(TransportError::ConnectionClosed(
                        "peer stopped accepting data".into(),
                    ));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    self.mark_closed();
                    return Err(TransportError::SendFailed(e));
                }
            }
        }
        tracing::trace!(peer = %self.peer, len = data.len(), "sent");
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<Received, TransportError> {
        if buf.is_empty() {
            return Ok(Received::Data(0));
        }
        loop {
            self.stream
                .readable()
                .await
                .map_err(TransportError::ReceiveFailed)?;
            match self.try_recv(buf)? {
                // Readiness can be spurious; wait again.
                Received::Pending => continue,
                other => return Ok(other),
            }
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> Result<Received, TransportError> {
        if !self.is_connected() {
            return Ok(Received::Closed);
        }
        if buf.is_empty() {
            return Ok(Received::Data(0));
        }
        match self.stream.try_read(buf) {
            Ok(0) => {
                self.mark_closed();
                Ok(Received::Closed)
            }
            Ok(n) => Ok(Received::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Ok(Received::Pending)
            }
            Err(e) => {
                self.mark_closed();
                Err(TransportError::ReceiveFailed(e))
            }
        }
    }

    async fn close(self) -> Result<(), TransportError> {
        let peer = self.peer;
        let mut stream = self.stream;
        match stream.shutdown().await {
            Ok(()) => {
                tracing::info!(%peer, "TCP connection closed");
                Ok(())
            }
            // The peer may already be gone; nothing left to shut down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
