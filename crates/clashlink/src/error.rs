//! Unified error type for the clashlink client.

use clashlink_protocol::{ProtocolError, RejectStatus};
use clashlink_session::SessionError;
use clashlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `clashlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
///
/// Only connection and handshake failures are returned from the client.
/// Problems with a single message (malformed payload, unknown unit) are
/// logged and skipped inside `pump` and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The byte stream can no longer be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (e.g. the handshake answer was invalid for
    /// the current phase).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server did not answer the handshake in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The server refused the handshake.
    #[error("rejected by server ({status}): {reason}")]
    Rejected { status: RejectStatus, reason: String },

    /// The handshake was cancelled through a `CancelHandle`.
    #[error("handshake cancelled")]
    Cancelled,

    /// The connection dropped after it was established.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The client has no open connection.
    #[error("not connected")]
    NotConnected,

    /// `open` was called on a client that already connected once.
    #[error("client already opened")]
    AlreadyOpen,
}

#[cfg(test)]
mod tests {
    use clashlink_protocol::MessageType;
    use clashlink_session::Phase;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Transport(_)));
        assert!(client_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownType(0x7777);
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::InvalidTransition {
            from: Phase::Failed,
            to: Phase::Lobby,
        };
        let client_err: ClientError = err.into();
        assert!(matches!(client_err, ClientError::Session(_)));
        assert!(client_err.to_string().contains("Failed"));
    }

    #[test]
    fn test_rejected_display_names_status_and_reason() {
        let err = ClientError::Rejected {
            status: RejectStatus::NickTaken,
            reason: "nick in use".into(),
        };
        let text = err.to_string();
        assert!(text.contains("nick in use"), "{text}");
    }

    #[test]
    fn test_protocol_type_mismatch_is_transparent() {
        let err: ClientError = ProtocolError::TypeMismatch {
            expected: MessageType::PlayerAccepted,
            actual: MessageType::PlayerRejected,
        }
        .into();
        assert_eq!(
            err.to_string(),
            ProtocolError::TypeMismatch {
                expected: MessageType::PlayerAccepted,
                actual: MessageType::PlayerRejected,
            }
            .to_string()
        );
    }
}
