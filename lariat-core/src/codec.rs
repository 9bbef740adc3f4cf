//! Per-message compression codecs.
//!
//! The [`Codec`] trait is the interface the client consumes compression
//! through: one type per wire name, compressing and decompressing whole
//! message payloads. The codecs Connect names on the wire are provided
//! behind features: [`GzipCodec`] (`compression-gzip`), [`BrotliCodec`]
//! (`compression-br`, wire name "br"), and [`ZstdCodec`]
//! (`compression-zstd`).
//!
//! There is no identity codec type: streams negotiated as `identity`
//! carry no codec at all (`Option<BoxedCodec>` holding `None`), so the
//! registry resolves the name without ever constructing one.

use bytes::Bytes;
use std::io;
use std::sync::Arc;

#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-br",
    feature = "compression-zstd"
))]
use std::io::Read;

/// Whole-payload compression, one implementation per wire name.
///
/// Used both for unary bodies and for individual streaming envelopes.
/// Implementations must be stateless across calls; the same codec value
/// is shared by every call on a client.
///
/// Custom algorithms plug in through [`CodecRegistry::register`]:
///
/// ```ignore
/// struct SnappyCodec;
///
/// impl Codec for SnappyCodec {
///     fn name(&self) -> &'static str {
///         "snappy"
///     }
///     fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
///         Ok(snap::raw::Encoder::new().compress_vec(data)?.into())
///     }
///     fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
///         Ok(snap::raw::Decoder::new().decompress_vec(data)?.into())
///     }
/// }
/// ```
///
/// [`CodecRegistry::register`]: crate::CodecRegistry::register
pub trait Codec: Send + Sync + 'static {
    /// The encoding name carried in HTTP headers (e.g., "gzip", "zstd", "br").
    fn name(&self) -> &'static str;

    /// Compress data.
    fn compress(&self, data: &[u8]) -> io::Result<Bytes>;

    /// Decompress data.
    fn decompress(&self, data: &[u8]) -> io::Result<Bytes>;
}

/// A cheaply clonable, type-erased codec handle.
///
/// `Option<BoxedCodec>` is the shape negotiation produces: `None` is
/// identity, `Some` carries the negotiated algorithm.
#[derive(Clone)]
pub struct BoxedCodec(Arc<dyn Codec>);

impl BoxedCodec {
    /// Box a codec for storage in the registry or on a stream.
    pub fn new<C: Codec>(codec: C) -> Self {
        BoxedCodec(Arc::new(codec))
    }

    /// The wire name of the boxed codec.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Compress data.
    pub fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.compress(data)
    }

    /// Decompress data.
    pub fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        self.0.decompress(data)
    }
}

impl std::fmt::Debug for BoxedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoxedCodec({})", self.name())
    }
}

/// Gzip, via flate2's streaming readers.
///
/// Requires the `compression-gzip` feature.
#[cfg(feature = "compression-gzip")]
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: flate2::Compression,
}

#[cfg(feature = "compression-gzip")]
impl GzipCodec {
    /// Create a gzip codec. Levels above 9 are clamped to 9 (best).
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

#[cfg(feature = "compression-gzip")]
impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }
}

#[cfg(feature = "compression-gzip")]
impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut out = Vec::new();
        flate2::bufread::GzEncoder::new(data, self.level).read_to_end(&mut out)?;
        Ok(out.into())
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut out = Vec::new();
        flate2::bufread::GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out.into())
    }
}

/// Brotli ("br" on the wire).
///
/// Requires the `compression-br` feature.
#[cfg(feature = "compression-br")]
#[derive(Debug, Clone, Copy)]
pub struct BrotliCodec {
    quality: u32,
}

#[cfg(feature = "compression-br")]
const BROTLI_BUFFER: usize = 4096;

/// Brotli window size exponent; 22 is the format's maximum.
#[cfg(feature = "compression-br")]
const BROTLI_LGWIN: u32 = 22;

#[cfg(feature = "compression-br")]
impl BrotliCodec {
    /// Create a brotli codec. Quality runs 0 (fastest) to 11 (densest);
    /// out-of-range values are clamped.
    pub fn new(quality: u32) -> Self {
        Self {
            quality: quality.min(11),
        }
    }
}

#[cfg(feature = "compression-br")]
impl Default for BrotliCodec {
    fn default() -> Self {
        // Mid-scale quality: compresses well without the tail-end cost.
        Self::new(5)
    }
}

#[cfg(feature = "compression-br")]
impl Codec for BrotliCodec {
    fn name(&self) -> &'static str {
        "br"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut out = Vec::new();
        brotli::CompressorReader::new(data, BROTLI_BUFFER, self.quality, BROTLI_LGWIN)
            .read_to_end(&mut out)?;
        Ok(out.into())
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        let mut out = Vec::new();
        brotli::Decompressor::new(data, BROTLI_BUFFER).read_to_end(&mut out)?;
        Ok(out.into())
    }
}

/// Zstandard, via the one-shot stream helpers.
///
/// Requires the `compression-zstd` feature.
#[cfg(feature = "compression-zstd")]
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

#[cfg(feature = "compression-zstd")]
impl ZstdCodec {
    /// Create a zstd codec, clamping the level to the range the linked
    /// libzstd supports.
    pub fn new(level: i32) -> Self {
        let range = zstd::compression_level_range();
        Self {
            level: level.clamp(*range.start(), *range.end()),
        }
    }
}

#[cfg(feature = "compression-zstd")]
impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

#[cfg(feature = "compression-zstd")]
impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Bytes> {
        zstd::stream::encode_all(data, self.level).map(Bytes::from)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Bytes> {
        zstd::stream::decode_all(data).map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;

    /// Input long and repetitive enough that every codec shrinks it.
    #[cfg(any(
        feature = "compression-gzip",
        feature = "compression-br",
        feature = "compression-zstd"
    ))]
    const SAMPLE: &[u8] =
        b"how do you do. how do you do. how do you do. please state your problem.";

    #[cfg(any(
        feature = "compression-gzip",
        feature = "compression-br",
        feature = "compression-zstd"
    ))]
    fn assert_round_trip<C: Codec>(codec: C, name: &str) {
        assert_eq!(codec.name(), name);

        let packed = codec.compress(SAMPLE).unwrap();
        assert!(packed.len() < SAMPLE.len(), "{} did not compress", name);
        assert_eq!(codec.decompress(&packed).unwrap(), SAMPLE);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_round_trip() {
        assert_round_trip(GzipCodec::default(), "gzip");
        assert_round_trip(GzipCodec::new(9), "gzip");
        // Clamped rather than rejected.
        assert_round_trip(GzipCodec::new(100), "gzip");
    }

    #[cfg(feature = "compression-br")]
    #[test]
    fn test_brotli_round_trip() {
        assert_round_trip(BrotliCodec::default(), "br");
        assert_round_trip(BrotliCodec::new(11), "br");
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd_round_trip() {
        assert_round_trip(ZstdCodec::default(), "zstd");
        assert_round_trip(ZstdCodec::new(19), "zstd");
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_rejects_garbage() {
        let codec = GzipCodec::default();
        assert!(codec.decompress(b"definitely not a gzip stream").is_err());
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd_rejects_garbage() {
        let codec = ZstdCodec::default();
        assert!(codec.decompress(b"definitely not a zstd frame").is_err());
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_boxed_codec_round_trip_and_debug() {
        let codec = BoxedCodec::new(GzipCodec::default());
        assert_eq!(format!("{:?}", codec), "BoxedCodec(gzip)");

        let packed = codec.compress(SAMPLE).unwrap();
        assert_eq!(codec.decompress(&packed).unwrap(), SAMPLE);
    }
}
