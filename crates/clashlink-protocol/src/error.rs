//! Error types for the protocol layer.
//!
//! Two families of errors live here. Payload errors (`Truncated`,
//! `InvalidText`, `TypeMismatch`, ...) describe one bad message: the
//! caller logs it, drops the message, and keeps the connection. Stream
//! errors (`FrameTooLarge`, `MalformedFrame`) mean the byte stream itself
//! can no longer be trusted. [`ProtocolError::is_stream_fatal`] tells the
//! two apart.

use crate::MessageType;

/// Errors that can occur while framing, encoding, or decoding messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// The payload ended before a field could be read completely.
    #[error("truncated payload: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// A text field did not contain valid UTF-16.
    #[error("text field is not valid UTF-16")]
    InvalidText,

    /// A field held a value outside its allowed range.
    #[error("invalid value {value} for {what}")]
    InvalidValue { what: &'static str, value: u32 },

    /// Bytes were left over after every field of a message was read.
    #[error("{count} trailing bytes after {kind:?} payload")]
    TrailingBytes { kind: MessageType, count: usize },

    /// A text, blob, or list is too long for its `u16` count prefix.
    #[error("{what} too long for the wire: {len} elements")]
    FieldTooLong { what: &'static str, len: usize },

    /// A message was decoded as the wrong typed message.
    #[error("expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: MessageType,
        actual: MessageType,
    },

    /// The type discriminant is not part of the protocol.
    #[error("unknown message type 0x{0:04X}")]
    UnknownType(u16),

    /// A frame (or a partial frame still arriving) exceeds the limit.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame does not have the shape its framing requires.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
}

impl ProtocolError {
    /// Returns `true` for errors after which the byte stream can no
    /// longer be split into frames reliably.
    pub fn is_stream_fatal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::MalformedFrame(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stream_fatal_only_for_framing_errors() {
        assert!(
            ProtocolError::FrameTooLarge { size: 10, max: 5 }.is_stream_fatal()
        );
        assert!(ProtocolError::MalformedFrame("short").is_stream_fatal());
        assert!(
            !ProtocolError::Truncated {
                needed: 4,
                remaining: 1
            }
            .is_stream_fatal()
        );
        assert!(!ProtocolError::UnknownType(0x1234).is_stream_fatal());
    }

    #[test]
    fn test_display_unknown_type_is_hex() {
        let err = ProtocolError::UnknownType(0xABCD);
        assert_eq!(err.to_string(), "unknown message type 0xABCD");
    }
}
