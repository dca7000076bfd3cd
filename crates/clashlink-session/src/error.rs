//! Error types for the session layer.
//!
//! None of these are fatal for the connection. The router logs them and
//! drops the message that caused them; only transport and handshake
//! failures end a session.

use clashlink_protocol::ProtocolError;

use crate::Phase;

/// Errors a handler or a state transition can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The requested phase change is not allowed from the current phase.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    /// The message payload could not be decoded.
    ///
    /// `#[from]` lets handlers use `?` directly on
    /// `WireMessage::from_message`.
    #[error("malformed message: {0}")]
    Decode(#[from] ProtocolError),

    /// The message refers to something the local view doesn't know
    /// about (an unknown user, unit, resource, or player slot).
    ///
    /// The server is authoritative, so the client logs and moves on.
    #[error("desynchronized: {0}")]
    Desync(String),
}

impl SessionError {
    pub(crate) fn desync(msg: impl Into<String>) -> Self {
        Self::Desync(msg.into())
    }
}
