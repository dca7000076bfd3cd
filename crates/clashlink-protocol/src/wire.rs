//! Field-level encoding: the primitives every payload is built from.
//!
//! The layout is fixed and not self-describing. A reader has to know the
//! shape of the payload up front and read fields in the same order the
//! writer wrote them.
//!
//! | Field        | Encoding                                           |
//! |--------------|----------------------------------------------------|
//! | `u8`/`u16`/`u32` | little-endian, fixed width                     |
//! | `f32`        | IEEE-754 bits, little-endian                       |
//! | `bool`       | one byte, `0` or `1`                               |
//! | text         | `u16` code-unit count, then UTF-16LE code units    |
//! | blob         | `u16` byte count, then the bytes                   |
//! | list         | `u16` element count, then each element             |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{MessageType, ProtocolError};

/// Largest count a `u16` prefix can carry.
const MAX_COUNT: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// PayloadWriter
// ---------------------------------------------------------------------------

/// Appends fields to a growing payload buffer.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Writes a string as UTF-16LE with a code-unit count prefix.
    pub fn put_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.put_count("text", units.len())?;
        for unit in units {
            self.buf.put_u16_le(unit);
        }
        Ok(())
    }

    /// Writes raw bytes with a byte count prefix.
    pub fn put_blob(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.put_count("blob", data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Writes the element count that precedes a list.
    pub fn put_list_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.put_count("list", len)
    }

    /// Number of payload bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the encoded payload.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn put_count(
        &mut self,
        what: &'static str,
        len: usize,
    ) -> Result<(), ProtocolError> {
        let count = u16::try_from(len)
            .map_err(|_| ProtocolError::FieldTooLong { what, len })?;
        self.buf.put_u16_le(count);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PayloadReader
// ---------------------------------------------------------------------------

/// Reads fields off the front of a payload.
///
/// Every read checks the remaining length first, so a short payload
/// yields [`ProtocolError::Truncated`] instead of a panic.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self { buf: payload }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Reads a `bool`. Anything other than `0` or `1` is rejected.
    pub fn bool(&mut self) -> Result<bool, ProtocolError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidValue {
                what: "bool",
                value: u32::from(other),
            }),
        }
    }

    /// Reads a count-prefixed UTF-16LE string.
    pub fn text(&mut self) -> Result<String, ProtocolError> {
        let count = usize::from(self.u16()?);
        self.need(count * 2)?;
        let units: Vec<u16> =
            (0..count).map(|_| self.buf.get_u16_le()).collect();
        String::from_utf16(&units).map_err(|_| ProtocolError::InvalidText)
    }

    /// Reads a count-prefixed byte blob.
    pub fn blob(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let count = usize::from(self.u16()?);
        self.need(count)?;
        let data = self.buf[..count].to_vec();
        self.buf.advance(count);
        Ok(data)
    }

    /// Reads the element count that precedes a list.
    pub fn list_len(&mut self) -> Result<usize, ProtocolError> {
        Ok(usize::from(self.u16()?))
    }

    /// Verifies that the whole payload of `kind` was consumed.
    pub fn finish(self, kind: MessageType) -> Result<(), ProtocolError> {
        match self.buf.remaining() {
            0 => Ok(()),
            count => Err(ProtocolError::TrailingBytes { kind, count }),
        }
    }

    fn need(&self, needed: usize) -> Result<(), ProtocolError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Layout
    // =====================================================================

    #[test]
    fn test_put_integers_little_endian() {
        let mut w = PayloadWriter::new();
        w.put_u8(0xAB);
        w.put_u16(0x0102);
        w.put_u32(0x0304_0506);
        assert_eq!(
            w.finish().as_ref(),
            &[0xAB, 0x02, 0x01, 0x06, 0x05, 0x04, 0x03]
        );
    }

    #[test]
    fn test_put_text_utf16_with_unit_count() {
        let mut w = PayloadWriter::new();
        w.put_text("Hi").unwrap();
        assert_eq!(w.finish().as_ref(), &[2, 0, b'H', 0, b'i', 0]);
    }

    #[test]
    fn test_put_text_counts_code_units_not_chars() {
        // U+1F600 is one char but a surrogate pair in UTF-16.
        let mut w = PayloadWriter::new();
        w.put_text("\u{1F600}").unwrap();
        let bytes = w.finish();
        assert_eq!(&bytes[..2], &[2, 0]);
        assert_eq!(bytes.len(), 2 + 4);
    }

    #[test]
    fn test_put_text_empty_writes_zero_count() {
        let mut w = PayloadWriter::new();
        w.put_text("").unwrap();
        assert_eq!(w.finish().as_ref(), &[0, 0]);
    }

    #[test]
    fn test_put_blob_too_long_returns_error() {
        let mut w = PayloadWriter::new();
        let data = vec![0u8; MAX_COUNT + 1];
        let err = w.put_blob(&data).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FieldTooLong {
                what: "blob",
                len: MAX_COUNT + 1
            }
        );
        assert!(w.is_empty(), "nothing is written on failure");
    }

    // =====================================================================
    // Reading
    // =====================================================================

    #[test]
    fn test_reader_reads_fields_in_order() {
        let mut w = PayloadWriter::new();
        w.put_u32(7);
        w.put_text("Alice").unwrap();
        w.put_bool(true);
        w.put_f32(1.5);
        let bytes = w.finish();

        let mut r = PayloadReader::new(&bytes);
        assert_eq!(r.u32().unwrap(), 7);
        assert_eq!(r.text().unwrap(), "Alice");
        assert!(r.bool().unwrap());
        assert_eq!(r.f32().unwrap(), 1.5);
        r.finish(MessageType::PlayerConnected).unwrap();
    }

    #[test]
    fn test_reader_u32_truncated_returns_error() {
        let mut r = PayloadReader::new(&[1, 2]);
        assert_eq!(
            r.u32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_reader_text_length_exceeds_remaining_returns_error() {
        // Claims 10 code units, carries only one.
        let mut r = PayloadReader::new(&[10, 0, b'a', 0]);
        assert_eq!(
            r.text(),
            Err(ProtocolError::Truncated {
                needed: 20,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_reader_text_lone_surrogate_returns_invalid_text() {
        let mut r = PayloadReader::new(&[1, 0, 0x00, 0xD8]);
        assert_eq!(r.text(), Err(ProtocolError::InvalidText));
    }

    #[test]
    fn test_reader_bool_out_of_range_returns_invalid_value() {
        let mut r = PayloadReader::new(&[2]);
        assert_eq!(
            r.bool(),
            Err(ProtocolError::InvalidValue {
                what: "bool",
                value: 2
            })
        );
    }

    #[test]
    fn test_reader_blob_reads_exact_bytes() {
        let mut r = PayloadReader::new(&[3, 0, 9, 8, 7, 6]);
        assert_eq!(r.blob().unwrap(), vec![9, 8, 7]);
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_reader_finish_with_leftover_returns_trailing_bytes() {
        let mut r = PayloadReader::new(&[1, 2, 3]);
        r.u8().unwrap();
        assert_eq!(
            r.finish(MessageType::GameEnded),
            Err(ProtocolError::TrailingBytes {
                kind: MessageType::GameEnded,
                count: 2
            })
        );
    }
}
