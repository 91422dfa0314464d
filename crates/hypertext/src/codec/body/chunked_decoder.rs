//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module provides functionality to decode HTTP messages that use chunked transfer encoding
//! as specified in [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! Chunk data is handed out as soon as any of it is buffered, so a large chunk arriving over
//! several reads turns into several body fragments instead of being held back.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk, optional trailers and a final CRLF end the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: SizeStart, remaining_size: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the first hex digit of the chunk size
    SizeStart,
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Skip a trailer field
    Trailer,
    /// Read LF after trailer
    TrailerLf,
    /// Read final CR
    EndCr,
    /// Read final LF
    EndLf,
    /// Final state after reading last chunk
    End,
}

/// Outcome of one state machine step.
enum Step {
    /// Not enough buffered bytes to leave the current state.
    Pending,
    /// Moved to a new state without producing data.
    Next(ChunkedState),
    /// Moved to a new state and split off chunk data.
    Data(ChunkedState, Bytes),
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when chunk data is available
    /// - `Ok(Some(PayloadItem::Eof))` when the terminating chunk and trailers are consumed
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            match self.state.step(src, &mut self.remaining_size)? {
                Step::Pending => return Ok(None),
                Step::Next(state) => self.state = state,
                Step::Data(state, bytes) => {
                    self.state = state;
                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Ok(Step::Pending);
        }
        $src.get_u8()
    }};
}

impl ChunkedState {
    fn step(self, src: &mut BytesMut, remaining_size: &mut u64) -> Result<Step, ParseError> {
        match self {
            SizeStart => Self::read_size_start(src, remaining_size),
            Size => Self::read_size(src, remaining_size),
            SizeLws => Self::read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => Self::read_size_lf(src, *remaining_size),
            Body => Ok(Self::read_body(src, remaining_size)),
            BodyCr => Self::expect(src, b'\r', BodyLf, "invalid chunk body CR"),
            BodyLf => Self::expect(src, b'\n', SizeStart, "invalid chunk body LF"),
            Trailer => Self::read_trailer(src),
            TrailerLf => Self::expect(src, b'\n', EndCr, "invalid trailer end LF"),
            EndCr => Self::read_end_cr(src),
            EndLf => Self::expect(src, b'\n', End, "invalid chunk end LF"),
            End => Ok(Step::Next(End)),
        }
    }

    fn expect(src: &mut BytesMut, byte: u8, next: ChunkedState, reason: &'static str) -> Result<Step, ParseError> {
        if try_next_byte!(src) == byte { Ok(Step::Next(next)) } else { Err(ParseError::invalid_body(reason)) }
    }

    /// A size line must start with a hex digit; an empty size is not zero.
    fn read_size_start(src: &mut BytesMut, size: &mut u64) -> Result<Step, ParseError> {
        let digit = hex_digit(try_next_byte!(src)).ok_or_else(|| ParseError::invalid_body("invalid chunk size line: missing size"))?;
        *size = u64::from(digit);
        Ok(Step::Next(Size))
    }

    /// Accumulates one hex digit of the chunk size, or moves on at the first delimiter.
    fn read_size(src: &mut BytesMut, size: &mut u64) -> Result<Step, ParseError> {
        let digit = match try_next_byte!(src) {
            b'\t' | b' ' => return Ok(Step::Next(SizeLws)),
            b';' => return Ok(Step::Next(Extension)),
            b'\r' => return Ok(Step::Next(SizeLf)),
            b => hex_digit(b).ok_or_else(|| ParseError::invalid_body("invalid chunk size line: Invalid Size"))?,
        };

        *size = size
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("invalid overflow chunked length"))?;

        Ok(Step::Next(Size))
    }

    /// Whitespace may follow the size, but no more digits.
    fn read_size_lws(src: &mut BytesMut) -> Result<Step, ParseError> {
        match try_next_byte!(src) {
            b'\t' | b' ' => Ok(Step::Next(SizeLws)),
            b';' => Ok(Step::Next(Extension)),
            b'\r' => Ok(Step::Next(SizeLf)),
            _ => Err(ParseError::invalid_body("invalid chunk size linear white space")),
        }
    }

    /// Extensions are skipped up to the next CR; a bare LF inside one is rejected.
    fn read_extension(src: &mut BytesMut) -> Result<Step, ParseError> {
        match try_next_byte!(src) {
            b'\r' => Ok(Step::Next(SizeLf)),
            b'\n' => Err(ParseError::invalid_body("invalid chunk extension contains newline")),
            _ => Ok(Step::Next(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: u64) -> Result<Step, ParseError> {
        match try_next_byte!(src) {
            b'\n' if size == 0 => Ok(Step::Next(EndCr)),
            b'\n' => Ok(Step::Next(Body)),
            _ => Err(ParseError::invalid_body("invalid chunk size LF")),
        }
    }

    fn read_body(src: &mut BytesMut, remaining: &mut u64) -> Step {
        if *remaining == 0 {
            return Step::Next(BodyCr);
        }

        if src.is_empty() {
            return Step::Pending;
        }

        let available = u64::try_from(src.len()).unwrap_or(u64::MAX);
        let read_size = (*remaining).min(available);
        *remaining -= read_size;

        // read_size <= src.len(), so it always fits in usize
        let bytes = src.split_to(usize::try_from(read_size).unwrap_or(src.len())).freeze();
        let next = if *remaining > 0 { Body } else { BodyCr };
        Step::Data(next, bytes)
    }

    fn read_trailer(src: &mut BytesMut) -> Result<Step, ParseError> {
        match try_next_byte!(src) {
            b'\r' => Ok(Step::Next(TrailerLf)),
            _ => Ok(Step::Next(Trailer)),
        }
    }

    /// A CR here ends the body, anything else starts a trailer field.
    fn read_end_cr(src: &mut BytesMut) -> Result<Step, ParseError> {
        match try_next_byte!(src) {
            b'\r' => Ok(Step::Next(EndLf)),
            _ => Ok(Step::Next(Trailer)),
        }
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b + 10 - b'a'),
        b'A'..=b'F' => Some(b + 10 - b'A'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> Bytes {
        decoder.decode(buffer).unwrap().unwrap().as_bytes().unwrap().clone()
    }

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"1234567890abcdef"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hello"));
        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b", world"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_chunks_with_extensions_and_trailers() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\nTrailer: value\r\n\r\nNEXT"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hello"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        // bytes of the next message are left alone
        assert_eq!(&buffer[..], b"NEXT");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hel"));
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"lo"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_split_size_line() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"1"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"0\r");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"\n0123456789abcdef\r\n0\r\n\r\n");
        assert_eq!(chunk(&mut decoder, &mut buffer).len(), 16);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer = BytesMut::from(&b"xyz\r\n"[..]);
        assert!(matches!(ChunkedDecoder::new().decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn test_overflowing_chunk_size() {
        let mut buffer = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        assert!(matches!(ChunkedDecoder::new().decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hello"));
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_zero_size_chunk() {
        let mut buffer = BytesMut::from(&b"0\r\n\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_size_line_without_digits() {
        for line in [&b"\r\n"[..], b";ext\r\n", b" 5\r\n"] {
            let mut buffer = BytesMut::from(line);
            assert!(matches!(ChunkedDecoder::new().decode(&mut buffer), Err(ParseError::InvalidBody { .. })), "{line:?}");
        }

        // the same holds for the size line after a chunk
        let mut buffer = BytesMut::from(&b"2\r\nhi\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(chunk(&mut decoder, &mut buffer), Bytes::from_static(b"hi"));
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }
}
