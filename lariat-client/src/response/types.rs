//! Response metadata and the unary output wrapper.

use std::collections::HashMap;

use base64::Engine;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::ClientError;

/// Prefix a server puts on unary response headers that carry trailing
/// metadata.
const TRAILER_PREFIX: &str = "trailer-";

/// Response metadata: a case-insensitive, ordered, multi-valued map of
/// header names to values.
///
/// Leading metadata comes from HTTP response headers; trailing metadata
/// comes from `trailer-`-prefixed headers (unary) or the end-of-stream
/// envelope (streaming). Metadata handed to callers is immutable.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create metadata from an HTTP header map.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Build metadata from the `metadata` field of an end-of-stream
    /// envelope. Names or values that are not valid HTTP headers are
    /// dropped.
    pub(crate) fn from_end_stream(map: HashMap<String, Vec<String>>) -> Self {
        let mut headers = HeaderMap::new();
        for (key, values) in map {
            if let Ok(name) = HeaderName::try_from(key.as_str()) {
                for value in values {
                    if let Ok(value) = HeaderValue::try_from(value.as_str()) {
                        headers.append(name.clone(), value);
                    }
                }
            }
        }
        Self { headers }
    }

    /// Split unary response headers into leading metadata and trailing
    /// metadata (keys prefixed `trailer-`, returned with the prefix
    /// stripped).
    pub(crate) fn split_unary(headers: &HeaderMap) -> (Metadata, Metadata) {
        let mut leading = HeaderMap::new();
        let mut trailing = HeaderMap::new();
        for (name, value) in headers.iter() {
            match name.as_str().strip_prefix(TRAILER_PREFIX) {
                Some(stripped) => {
                    if let Ok(name) = HeaderName::try_from(stripped) {
                        trailing.append(name, value.clone());
                    }
                }
                None => {
                    leading.append(name.clone(), value.clone());
                }
            }
        }
        (Metadata::new(leading), Metadata::new(trailing))
    }

    /// Get the first value for a name. Lookup is case-insensitive.
    ///
    /// Returns `None` when the name is absent or the value is not valid
    /// UTF-8; use [`get_binary`](Self::get_binary) for `-bin` keys.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get all values for a name, in insertion order.
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Decode binary metadata for a `-bin` key.
    ///
    /// Values travel base64-encoded (URL-safe alphabet, unpadded); padded
    /// and standard-alphabet values are accepted for compatibility.
    pub fn get_binary(&self, name: &str) -> Option<Vec<u8>> {
        let value = self.get(name)?;
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(value)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(value))
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(value))
            .ok()
    }

    /// Whether the name is present.
    pub fn contains_key(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Number of values across all names.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the map holds no values.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all (name, value) pairs; repeated names yield one pair
    /// per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
    }

    /// Access the underlying header map.
    pub fn as_header_map(&self) -> &HeaderMap {
        &self.headers
    }
}

/// The result of a unary-shaped call, with errors recorded rather than
/// raised.
///
/// All fields are populated before the output is returned. When
/// [`error`](Self::error) is set, [`message`](Self::message) is `None`.
/// [`into_result`](Self::into_result) converts to raising semantics.
#[derive(Debug)]
pub struct UnaryOutput<T> {
    message: Option<T>,
    headers: Metadata,
    trailers: Metadata,
    error: Option<ClientError>,
}

impl<T> UnaryOutput<T> {
    pub(crate) fn from_message(message: T, headers: Metadata, trailers: Metadata) -> Self {
        Self {
            message: Some(message),
            headers,
            trailers,
            error: None,
        }
    }

    pub(crate) fn from_error(error: ClientError, headers: Metadata, trailers: Metadata) -> Self {
        Self {
            message: None,
            headers,
            trailers,
            error: Some(error),
        }
    }

    /// The response message, absent when the call failed.
    pub fn message(&self) -> Option<&T> {
        self.message.as_ref()
    }

    /// Consume the output, returning the message if the call succeeded.
    pub fn into_message(self) -> Option<T> {
        self.message
    }

    /// Leading response metadata (HTTP headers).
    pub fn response_headers(&self) -> &Metadata {
        &self.headers
    }

    /// Trailing response metadata.
    pub fn response_trailers(&self) -> &Metadata {
        &self.trailers
    }

    /// The recorded error, if the call failed.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    /// Convert to raising semantics: the message on success, the recorded
    /// error otherwise.
    pub fn into_result(self) -> Result<T, ClientError> {
        match self.error {
            Some(err) => Err(err),
            None => self
                .message
                .ok_or_else(|| ClientError::internal("response carried no message")),
        }
    }
}
