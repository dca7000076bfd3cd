//! Splitting a TCP byte stream into frames, and frames into messages.
//!
//! TCP hands us bytes with no message boundaries: one read can carry half
//! a frame, three frames, or two and a bit. [`FrameDecoder`] accumulates
//! those reads and hands back complete frames in arrival order. Partial
//! trailing bytes stay buffered for the next call.
//!
//! Two framings are supported:
//!
//! ```text
//! Delimited:      [u16 type][payload ...][FE FF FE FF]
//! LengthPrefixed: [u32 body len][u16 type][payload ...]
//! ```
//!
//! `Delimited` is what existing servers speak. Its end marker is the
//! reserved `MessageEnd` discriminant written twice. Nothing escapes that
//! marker inside a payload, so a payload that happens to contain
//! `FE FF FE FF` ends its frame early. `LengthPrefixed` has no such
//! problem and should be preferred when both sides support it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{Message, MessageType, ProtocolError};

/// Default limit for a single encoded frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Length of the `Delimited` end marker.
pub const SENTINEL_LEN: usize = 4;

/// The `Delimited` end marker: `MessageEnd` twice, little-endian.
///
/// The byte order is fixed whatever the host's endianness, the same as
/// every other field on the wire, so the marker is `FE FF FE FF` on
/// every platform.
pub const SENTINEL: [u8; SENTINEL_LEN] = sentinel();

const fn sentinel() -> [u8; SENTINEL_LEN] {
    let b = MessageType::MessageEnd.as_u16().to_le_bytes();
    [b[0], b[1], b[0], b[1]]
}

/// Size of the `u16` type field at the start of every frame body.
const TYPE_LEN: usize = 2;

/// Size of the `u32` length field in `LengthPrefixed` frames.
const LENGTH_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// How frame boundaries are marked on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Frames end with [`SENTINEL`].
    #[default]
    Delimited,
    /// Frames start with their body length.
    LengthPrefixed,
}

impl Framing {
    /// Encodes a message into one complete frame.
    pub fn encode(self, msg: &Message) -> Result<Bytes, ProtocolError> {
        let payload = msg.payload();
        let body_len = TYPE_LEN + payload.len();
        let mut out = BytesMut::with_capacity(body_len + SENTINEL_LEN);

        match self {
            Self::Delimited => {
                out.put_u16_le(msg.kind().as_u16());
                out.put_slice(payload);
                out.put_slice(&SENTINEL);
            }
            Self::LengthPrefixed => {
                let len = u32::try_from(body_len).map_err(|_| {
                    ProtocolError::FrameTooLarge {
                        size: body_len,
                        max: u32::MAX as usize,
                    }
                })?;
                out.put_u32_le(len);
                out.put_u16_le(msg.kind().as_u16());
                out.put_slice(payload);
            }
        }
        Ok(out.freeze())
    }

    /// Decodes one complete frame, as returned by [`FrameDecoder::feed`].
    ///
    /// Errors here concern a single frame: the caller logs and drops it.
    pub fn decode(self, mut frame: Bytes) -> Result<Message, ProtocolError> {
        match self {
            Self::Delimited => {
                if frame.len() < TYPE_LEN + SENTINEL_LEN {
                    return Err(ProtocolError::Truncated {
                        needed: TYPE_LEN + SENTINEL_LEN,
                        remaining: frame.len(),
                    });
                }
                if !frame.ends_with(&SENTINEL) {
                    return Err(ProtocolError::MalformedFrame(
                        "missing end marker",
                    ));
                }
                frame.truncate(frame.len() - SENTINEL_LEN);
            }
            Self::LengthPrefixed => {
                if frame.len() < LENGTH_LEN + TYPE_LEN {
                    return Err(ProtocolError::Truncated {
                        needed: LENGTH_LEN + TYPE_LEN,
                        remaining: frame.len(),
                    });
                }
                let declared = frame.get_u32_le() as usize;
                if declared != frame.len() {
                    return Err(ProtocolError::MalformedFrame(
                        "length prefix does not match frame",
                    ));
                }
            }
        }

        let raw = frame.get_u16_le();
        let kind = MessageType::try_from(raw)?;
        if kind.is_reserved() {
            return Err(ProtocolError::InvalidValue {
                what: "message type",
                value: u32::from(raw),
            });
        }
        Ok(Message::new(kind, frame))
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Accumulates stream bytes and extracts complete frames.
///
/// The buffer grows as needed up to `max_frame_size`. A partial frame
/// that grows past the limit is an error instead of silently corrupting
/// the stream; the buffer is cleared when that happens.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    max_frame_size: usize,
    buf: BytesMut,
    /// Offset up to which `buf` was already searched for the end marker.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self::with_max_frame_size(framing, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(framing: Framing, max_frame_size: usize) -> Self {
        Self {
            framing,
            max_frame_size,
            buf: BytesMut::with_capacity(4096),
            scanned: 0,
        }
    }

    /// Appends `bytes` and returns every frame completed by them.
    ///
    /// An empty slice is a no-op. When no frame completes, all bytes
    /// stay buffered.
    ///
    /// # Errors
    /// Returns [`ProtocolError::FrameTooLarge`] or
    /// [`ProtocolError::MalformedFrame`] when the stream can no longer be
    /// framed. Both are fatal for the connection.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        let mut frames = Vec::new();
        if bytes.is_empty() {
            return Ok(frames);
        }
        self.buf.extend_from_slice(bytes);

        loop {
            let next = match self.framing {
                Framing::Delimited => self.next_delimited(),
                Framing::LengthPrefixed => self.next_length_prefixed(),
            };
            match next {
                Ok(Some(frame)) => {
                    tracing::trace!(len = frame.len(), "frame complete");
                    frames.push(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    self.clear();
                    return Err(e);
                }
            }
        }

        if self.buf.len() > self.max_frame_size {
            let size = self.buf.len();
            self.clear();
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(frames)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn next_delimited(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let found = self.buf[self.scanned..]
            .windows(SENTINEL_LEN)
            .position(|w| w == SENTINEL);

        let Some(offset) = found else {
            // Back off so a marker split across two reads is still found.
            self.scanned = self.buf.len().saturating_sub(SENTINEL_LEN - 1);
            return Ok(None);
        };

        let end = self.scanned + offset + SENTINEL_LEN;
        self.scanned = 0;
        if end > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: end,
                max: self.max_frame_size,
            });
        }
        Ok(Some(self.buf.split_to(end).freeze()))
    }

    fn next_length_prefixed(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.buf.len() < LENGTH_LEN {
            return Ok(None);
        }
        let mut header = &self.buf[..LENGTH_LEN];
        let body_len = header.get_u32_le() as usize;
        if body_len < TYPE_LEN {
            return Err(ProtocolError::MalformedFrame(
                "body shorter than the type field",
            ));
        }
        let total = LENGTH_LEN + body_len;
        if total > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: total,
                max: self.max_frame_size,
            });
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(total).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(framing: Framing, kind: MessageType, payload: &[u8]) -> Bytes {
        framing
            .encode(&Message::new(kind, payload.to_vec()))
            .unwrap()
    }

    // =====================================================================
    // Encoding
    // =====================================================================

    #[test]
    fn test_sentinel_is_message_end_twice_little_endian() {
        assert_eq!(SENTINEL, [0xFE, 0xFF, 0xFE, 0xFF]);
    }

    #[test]
    fn test_sentinel_uses_same_byte_order_as_type_field() {
        let end = MessageType::MessageEnd.as_u16().to_le_bytes();
        assert_eq!(SENTINEL[..2], end);
        assert_eq!(SENTINEL[2..], end);

        let kind = MessageType::PlayerHurt;
        let bytes = frame(Framing::Delimited, kind, &[]);
        assert_eq!(bytes[..2], kind.as_u16().to_le_bytes());
    }

    #[test]
    fn test_encode_delimited_layout() {
        let bytes = frame(Framing::Delimited, MessageType::GameEnded, &[1]);
        assert_eq!(bytes.as_ref(), &[0x22, 0x00, 1, 0xFE, 0xFF, 0xFE, 0xFF]);
    }

    #[test]
    fn test_encode_length_prefixed_layout() {
        let bytes =
            frame(Framing::LengthPrefixed, MessageType::GameEnded, &[1]);
        assert_eq!(bytes.as_ref(), &[3, 0, 0, 0, 0x22, 0x00, 1]);
    }

    #[test]
    fn test_decode_inverts_encode_for_empty_payload() {
        for framing in [Framing::Delimited, Framing::LengthPrefixed] {
            let msg = Message::empty(MessageType::PlayerChangedState);
            let bytes = framing.encode(&msg).unwrap();
            assert_eq!(framing.decode(bytes).unwrap(), msg);
        }
    }

    #[test]
    fn test_decode_unknown_type_returns_error() {
        let bytes = Bytes::from_static(&[0x34, 0x12, 0xFE, 0xFF, 0xFE, 0xFF]);
        assert_eq!(
            Framing::Delimited.decode(bytes),
            Err(ProtocolError::UnknownType(0x1234))
        );
    }

    #[test]
    fn test_decode_reserved_type_returns_invalid_value() {
        let bytes = Bytes::from_static(&[0xFE, 0xFF, 0xFE, 0xFF, 0xFE, 0xFF]);
        assert!(matches!(
            Framing::Delimited.decode(bytes),
            Err(ProtocolError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_decode_frame_shorter_than_header_returns_truncated() {
        let bytes = Bytes::from_static(&[0xFE, 0xFF, 0xFE, 0xFF]);
        assert!(matches!(
            Framing::Delimited.decode(bytes),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    // =====================================================================
    // FrameDecoder: delimited
    // =====================================================================

    #[test]
    fn test_feed_empty_is_noop() {
        let mut decoder = FrameDecoder::new(Framing::Delimited);
        assert!(decoder.feed(&[]).unwrap().is_empty());
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_feed_partial_frame_retains_bytes() {
        let mut decoder = FrameDecoder::new(Framing::Delimited);
        let full = frame(Framing::Delimited, MessageType::GameEnded, &[1]);

        let frames = decoder.feed(&full[..4]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(decoder.buffered_len(), 4);

        let frames = decoder.feed(&full[4..]).unwrap();
        assert_eq!(frames, vec![full]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_feed_several_frames_in_one_read_keeps_order() {
        let mut decoder = FrameDecoder::new(Framing::Delimited);
        let a = frame(Framing::Delimited, MessageType::GameEnded, &[0]);
        let b = frame(Framing::Delimited, MessageType::GameEnded, &[1]);
        let c = frame(Framing::Delimited, MessageType::GameWillStartIn, &[]);

        let mut stream = Vec::new();
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);
        stream.extend_from_slice(&c[..3]);

        let frames = decoder.feed(&stream).unwrap();
        assert_eq!(frames, vec![a, b]);

        let frames = decoder.feed(&c[3..]).unwrap();
        assert_eq!(frames, vec![c]);
    }

    #[test]
    fn test_feed_marker_split_across_reads_is_found() {
        let mut decoder = FrameDecoder::new(Framing::Delimited);
        let full = frame(Framing::Delimited, MessageType::GameEnded, &[9]);
        // Split inside the end marker: FE FF | FE FF
        let split = full.len() - 2;

        assert!(decoder.feed(&full[..split]).unwrap().is_empty());
        assert_eq!(decoder.feed(&full[split..]).unwrap(), vec![full]);
    }

    #[test]
    fn test_feed_partial_frame_over_limit_returns_frame_too_large() {
        let mut decoder = FrameDecoder::with_max_frame_size(Framing::Delimited, 8);
        let err = decoder.feed(&[0u8; 9]).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooLarge { size: 9, max: 8 });
        assert_eq!(decoder.buffered_len(), 0, "buffer cleared on error");
    }

    #[test]
    fn test_feed_complete_frame_over_limit_returns_frame_too_large() {
        let mut decoder = FrameDecoder::with_max_frame_size(Framing::Delimited, 8);
        let full = frame(Framing::Delimited, MessageType::GameEnded, &[1; 4]);
        assert!(full.len() > 8);
        assert!(matches!(
            decoder.feed(&full),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    // =====================================================================
    // FrameDecoder: length-prefixed
    // =====================================================================

    #[test]
    fn test_length_prefixed_payload_with_marker_bytes_survives() {
        let mut decoder = FrameDecoder::new(Framing::LengthPrefixed);
        let payload = [1, 0xFE, 0xFF, 0xFE, 0xFF, 2];
        let full = frame(Framing::LengthPrefixed, MessageType::UnitQueued, &payload);

        let frames = decoder.feed(&full).unwrap();
        assert_eq!(frames.len(), 1);
        let msg = Framing::LengthPrefixed.decode(frames[0].clone()).unwrap();
        assert_eq!(msg.payload().as_ref(), &payload);
    }

    #[test]
    fn test_length_prefixed_declared_length_over_limit_fails_early() {
        let mut decoder =
            FrameDecoder::with_max_frame_size(Framing::LengthPrefixed, 64);
        // Declares a 1000 byte body; only the header has arrived.
        let err = decoder.feed(&1000u32.to_le_bytes()).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FrameTooLarge {
                size: 1004,
                max: 64
            }
        );
    }

    #[test]
    fn test_length_prefixed_body_shorter_than_type_is_malformed() {
        let mut decoder = FrameDecoder::new(Framing::LengthPrefixed);
        let err = decoder.feed(&[1, 0, 0, 0, 0xAA]).unwrap_err();
        assert!(err.is_stream_fatal());
    }

    #[test]
    fn test_accessors_report_configuration() {
        let decoder = FrameDecoder::new(Framing::LengthPrefixed);
        assert_eq!(decoder.framing(), Framing::LengthPrefixed);
        assert_eq!(decoder.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_framing_serde_snake_case() {
        let json = serde_json::to_string(&Framing::LengthPrefixed).unwrap();
        assert_eq!(json, "\"length_prefixed\"");
    }
}
