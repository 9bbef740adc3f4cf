//! The name-to-codec registry used for compression negotiation.
//!
//! Callers advertise the registry's contents in `Accept-Encoding` /
//! `Connect-Accept-Encoding` and resolve incoming `Content-Encoding` /
//! `Connect-Content-Encoding` values against it. The registry is a plain
//! value passed into the client builder, so tests can inject their own.

use crate::codec::{BoxedCodec, Codec};

/// Wire name for the no-op encoding.
pub const IDENTITY: &str = "identity";

/// Error returned when resolving an encoding name that is not registered.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported compression encoding: {0:?}")]
pub struct UnknownEncoding(pub String);

/// A registry of compression codecs, keyed by wire name.
///
/// `identity` is always resolvable and means "no codec"; it does not occupy
/// a slot in the registry. Registration order is preserved and determines
/// the order names are advertised in.
///
/// # Example
///
/// ```ignore
/// use lariat_core::{CodecRegistry, GzipCodec};
///
/// let mut registry = CodecRegistry::empty();
/// registry.register(GzipCodec::default());
/// assert!(registry.supports("gzip"));
/// assert!(registry.supports("identity"));
/// assert!(!registry.supports("lz4"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct CodecRegistry {
    codecs: Vec<BoxedCodec>,
}

impl CodecRegistry {
    /// Create an empty registry (only `identity` resolves).
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Create a registry containing every codec compiled in: gzip, br, and
    /// zstd, per the enabled `compression-*` features.
    pub fn standard() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "compression-gzip")]
        registry.register(crate::codec::GzipCodec::default());
        #[cfg(feature = "compression-br")]
        registry.register(crate::codec::BrotliCodec::default());
        #[cfg(feature = "compression-zstd")]
        registry.register(crate::codec::ZstdCodec::default());
        registry
    }

    /// Register a codec, replacing any existing codec with the same name.
    pub fn register<C: Codec>(&mut self, codec: C) {
        let codec = BoxedCodec::new(codec);
        if let Some(slot) = self.codecs.iter_mut().find(|c| c.name() == codec.name()) {
            *slot = codec;
        } else {
            self.codecs.push(codec);
        }
    }

    /// Look up a registered codec by name.
    ///
    /// Returns `None` for `identity` and for unregistered names; use
    /// [`resolve`](Self::resolve) to distinguish the two.
    pub fn get(&self, name: &str) -> Option<&BoxedCodec> {
        self.codecs.iter().find(|c| c.name() == name)
    }

    /// Resolve an encoding header value to a codec.
    ///
    /// A missing or empty header, or `identity`, resolves to `Ok(None)`
    /// (no codec). A registered name resolves to `Ok(Some(codec))`. Any
    /// other name is an error; the caller decides which Connect code that
    /// maps to.
    pub fn resolve(&self, name: Option<&str>) -> Result<Option<BoxedCodec>, UnknownEncoding> {
        match name {
            None | Some("") | Some(IDENTITY) => Ok(None),
            Some(name) => self
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| UnknownEncoding(name.to_string())),
        }
    }

    /// Whether a name resolves without error. `identity` always does.
    pub fn supports(&self, name: &str) -> bool {
        name == IDENTITY || self.get(name).is_some()
    }

    /// Comma-separated list of registered codec names for `Accept-Encoding`
    /// style headers, in registration order.
    ///
    /// Only loaded codecs are advertised; returns `None` when the registry
    /// is empty (identity needs no advertisement).
    pub fn advertised(&self) -> Option<String> {
        if self.codecs.is_empty() {
            return None;
        }
        Some(
            self.codecs
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    /// A do-nothing codec for exercising the registry without any
    /// compression feature enabled.
    struct NullCodec;

    impl Codec for NullCodec {
        fn name(&self) -> &'static str {
            "null"
        }

        fn compress(&self, data: &[u8]) -> std::io::Result<Bytes> {
            Ok(Bytes::copy_from_slice(data))
        }

        fn decompress(&self, data: &[u8]) -> std::io::Result<Bytes> {
            Ok(Bytes::copy_from_slice(data))
        }
    }

    #[test]
    fn test_empty_registry_resolves_identity() {
        let registry = CodecRegistry::empty();
        assert!(registry.resolve(None).unwrap().is_none());
        assert!(registry.resolve(Some("")).unwrap().is_none());
        assert!(registry.resolve(Some("identity")).unwrap().is_none());
        assert!(registry.supports("identity"));
        assert_eq!(registry.advertised(), None);
    }

    #[test]
    fn test_unknown_encoding() {
        let registry = CodecRegistry::empty();
        let err = registry.resolve(Some("lz4")).unwrap_err();
        assert_eq!(err, UnknownEncoding("lz4".to_string()));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_resolve_registered() {
        let registry = CodecRegistry::standard();
        let codec = registry.resolve(Some("gzip")).unwrap().unwrap();
        assert_eq!(codec.name(), "gzip");
        assert!(registry.supports("gzip"));
    }

    #[cfg(all(
        feature = "compression-gzip",
        feature = "compression-br",
        feature = "compression-zstd"
    ))]
    #[test]
    fn test_standard_advertises_loaded_codecs() {
        let registry = CodecRegistry::standard();
        assert_eq!(registry.advertised().as_deref(), Some("gzip, br, zstd"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = CodecRegistry::empty();
        registry.register(NullCodec);
        registry.register(NullCodec);
        assert_eq!(registry.advertised().as_deref(), Some("null"));

        let codec = registry.resolve(Some("null")).unwrap().unwrap();
        assert_eq!(codec.decompress(b"payload").unwrap(), &b"payload"[..]);
    }
}
