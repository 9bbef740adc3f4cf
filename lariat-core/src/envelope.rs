//! Connect streaming envelope framing.
//!
//! The Connect protocol frames streaming bodies as envelopes:
//!
//! ```text
//! [flags:1][length:4 BE][payload:length]
//! ```
//!
//! Flag bit 0 (0x01) marks a payload compressed with the stream's
//! per-message codec; flag bit 1 (0x02) marks the end-of-stream sentinel,
//! whose payload is a small JSON document carrying trailing metadata and an
//! optional error. All other bits are reserved and must be zero.

use bytes::Bytes;

use crate::codec::BoxedCodec;
use crate::error::EnvelopeError;

/// Connect streaming envelope flags.
pub mod envelope_flags {
    /// Regular message (uncompressed).
    pub const MESSAGE: u8 = 0x00;
    /// Payload is compressed with the stream codec.
    pub const COMPRESSED: u8 = 0x01;
    /// End of stream sentinel.
    pub const END_STREAM: u8 = 0x02;
    /// Bits that must be zero.
    pub const RESERVED: u8 = !(COMPRESSED | END_STREAM);
}

/// Envelope header size (flags + big-endian length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// Whether the compressed bit is set.
pub fn is_compressed(flags: u8) -> bool {
    flags & envelope_flags::COMPRESSED != 0
}

/// Whether the end-stream bit is set.
pub fn is_end_stream(flags: u8) -> bool {
    flags & envelope_flags::END_STREAM != 0
}

/// Wrap a payload in a Connect streaming envelope.
///
/// `payload` must already be in its final (possibly compressed) form; the
/// encoded length is its exact byte count.
pub fn wrap_envelope(payload: &[u8], compressed: bool) -> Vec<u8> {
    let flags = if compressed {
        envelope_flags::COMPRESSED
    } else {
        envelope_flags::MESSAGE
    };

    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parse an envelope header from the front of `data`.
///
/// Returns `(flags, length)`. Fails when fewer than five bytes are
/// available or when reserved flag bits are set.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::TruncatedHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    if flags & envelope_flags::RESERVED != 0 {
        return Err(EnvelopeError::InvalidFlags(flags));
    }

    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    Ok((flags, length))
}

/// Undo per-envelope compression on a payload.
///
/// `codec` is the stream codec negotiated in headers; `None` means
/// identity. A set compressed bit on an identity stream is a protocol
/// violation.
pub fn decode_payload(
    flags: u8,
    payload: Bytes,
    codec: Option<&BoxedCodec>,
) -> Result<Bytes, EnvelopeError> {
    if !is_compressed(flags) {
        return Ok(payload);
    }

    let Some(codec) = codec else {
        return Err(EnvelopeError::CompressedWithoutCodec);
    };

    codec
        .decompress(&payload)
        .map_err(|e| EnvelopeError::Decompression(e.to_string()))
}

/// Compress a payload for emission.
///
/// Returns `(bytes, was_compressed)`; `None` codec is identity and passes
/// the payload through untouched.
pub fn compress_payload(
    payload: Bytes,
    codec: Option<&BoxedCodec>,
) -> Result<(Bytes, bool), EnvelopeError> {
    let Some(codec) = codec else {
        return Ok((payload, false));
    };

    let compressed = codec
        .compress(&payload)
        .map_err(|e| EnvelopeError::Compression(e.to_string()))?;

    Ok((compressed, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_envelope_uncompressed() {
        let payload = b"hello";
        let frame = wrap_envelope(payload, false);

        assert_eq!(frame[0], envelope_flags::MESSAGE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            5
        );
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_wrap_envelope_compressed() {
        let frame = wrap_envelope(b"hello", true);

        assert_eq!(frame[0], envelope_flags::COMPRESSED);
        assert_eq!(&frame[5..], b"hello");
    }

    #[test]
    fn test_wrap_envelope_empty_payload() {
        // Zero-length payloads are legal messages; the frame is the bare
        // 5-byte header.
        let frame = wrap_envelope(b"", false);
        assert_eq!(frame.len(), ENVELOPE_HEADER_SIZE);
        assert_eq!(
            u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]),
            0
        );
    }

    #[test]
    fn test_parse_envelope_header() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let (flags, length) = parse_envelope_header(&data).unwrap();

        assert_eq!(flags, envelope_flags::MESSAGE);
        assert_eq!(length, 5);
    }

    #[test]
    fn test_parse_envelope_header_incomplete() {
        let data = [0x00, 0x00, 0x00]; // only 3 bytes
        let result = parse_envelope_header(&data);

        assert!(matches!(
            result,
            Err(EnvelopeError::TruncatedHeader {
                expected: 5,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_parse_envelope_header_reserved_bits() {
        for flags in [0x04u8, 0x80, 0xff] {
            let data = [flags, 0x00, 0x00, 0x00, 0x00];
            assert!(matches!(
                parse_envelope_header(&data),
                Err(EnvelopeError::InvalidFlags(f)) if f == flags
            ));
        }
    }

    #[test]
    fn test_header_round_trip() {
        for (flags, payload) in [
            (false, &b""[..]),
            (false, &b"hello"[..]),
            (true, &b"compressed bytes"[..]),
        ] {
            let frame = wrap_envelope(payload, flags);
            let (parsed_flags, length) = parse_envelope_header(&frame).unwrap();
            assert_eq!(is_compressed(parsed_flags), flags);
            assert_eq!(length as usize, payload.len());
            assert_eq!(&frame[ENVELOPE_HEADER_SIZE..], payload);
        }
    }

    #[test]
    fn test_decode_payload_identity() {
        let payload = Bytes::from_static(b"hello");
        let decoded = decode_payload(envelope_flags::MESSAGE, payload.clone(), None).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_payload_compressed_without_codec() {
        let result = decode_payload(envelope_flags::COMPRESSED, Bytes::from_static(b"x"), None);
        assert!(matches!(result, Err(EnvelopeError::CompressedWithoutCodec)));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_payload_compression_round_trip() {
        use crate::codec::{BoxedCodec, GzipCodec};

        let codec = BoxedCodec::new(GzipCodec::default());
        let original = Bytes::from_static(b"a message worth compressing, repeated, repeated");

        let (compressed, was_compressed) =
            compress_payload(original.clone(), Some(&codec)).unwrap();
        assert!(was_compressed);

        let decoded =
            decode_payload(envelope_flags::COMPRESSED, compressed, Some(&codec)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_compress_payload_identity() {
        let payload = Bytes::from_static(b"hello");
        let (result, compressed) = compress_payload(payload.clone(), None).unwrap();

        assert_eq!(result, payload);
        assert!(!compressed);
    }

    #[test]
    fn test_end_stream_flag() {
        assert!(is_end_stream(envelope_flags::END_STREAM));
        assert!(is_end_stream(0x03));
        assert!(!is_end_stream(envelope_flags::MESSAGE));
        assert!(!is_end_stream(envelope_flags::COMPRESSED));
    }
}
