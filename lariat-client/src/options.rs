//! Call options for per-request configuration.
//!
//! This module provides [`CallOptions`] for configuring individual RPC
//! calls with timeouts and custom headers.

use base64::Engine;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Options for configuring individual RPC calls.
///
/// Use this to set per-call timeouts or custom headers that differ from
/// the client defaults.
///
/// # Example
///
/// ```ignore
/// use lariat_client::CallOptions;
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(5))
///     .header("authorization", "Bearer token123")
///     .header("x-request-id", "abc-123");
///
/// let response = client.call_unary_with_options::<Req, Res>(
///     "my.service/Method",
///     &request,
///     options,
/// ).await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Timeout for this specific call; overrides the client default.
    pub(crate) timeout: Option<Duration>,
    /// Custom headers for this specific call.
    pub(crate) headers: HeaderMap,
}

impl CallOptions {
    /// Create new default call options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout for this call.
    ///
    /// The timeout is propagated to the server via the `Connect-Timeout-Ms`
    /// header and also enforced locally; local expiry yields a
    /// `deadline_exceeded` error.
    ///
    /// The maximum supported timeout is ten digits of milliseconds
    /// (about 115 days); larger values and zero send no header.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the configured timeout, if any.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Add a custom header for this call.
    ///
    /// Header names are lowercased on the wire. Headers beginning with
    /// "Connect-" and "Grpc-" are reserved for the protocol and are
    /// silently skipped when the request is built.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid. Use
    /// [`try_header`](Self::try_header) for fallible insertion.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        let value = value.try_into().expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// Try to add a custom header for this call.
    ///
    /// Returns `None` if the header name or value is invalid.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    /// Add binary metadata for this call.
    ///
    /// The name must end in `-bin`; the value is base64-encoded on the wire
    /// (URL-safe alphabet, no padding) per the Connect protocol.
    ///
    /// # Panics
    ///
    /// Panics if the header name is invalid or does not end in `-bin`.
    pub fn binary_header<K>(mut self, name: K, value: &[u8]) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        assert!(
            name.as_str().ends_with("-bin"),
            "binary metadata keys must end in -bin"
        );
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value);
        let value = HeaderValue::try_from(encoded).expect("base64 is a valid header value");
        self.headers.insert(name, value);
        self
    }

    /// Set all custom headers for this call, replacing any existing headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get a reference to the custom headers.
    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the custom headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// Maximum timeout value in milliseconds (10 digits ≈ 115 days).
/// Larger values are treated as "no timeout" per the Connect protocol.
pub(crate) const MAX_TIMEOUT_MS: u128 = 9_999_999_999;

/// Convert a Duration to the `Connect-Timeout-Ms` header value.
///
/// Sub-millisecond remainders round up. Returns None for zero or oversized
/// timeouts.
pub(crate) fn duration_to_timeout_header(duration: Duration) -> Option<String> {
    let millis = ceil_millis(duration);
    if millis == 0 || millis > MAX_TIMEOUT_MS {
        return None;
    }
    Some(millis.to_string())
}

/// Round a timeout up to the whole milliseconds advertised in the header,
/// so the local deadline is never shorter than the advertised one.
pub(crate) fn round_up_to_millis(duration: Duration) -> Duration {
    let millis = ceil_millis(duration);
    if millis == 0 || millis > MAX_TIMEOUT_MS {
        duration
    } else {
        Duration::from_millis(millis as u64)
    }
}

fn ceil_millis(duration: Duration) -> u128 {
    let mut millis = duration.as_millis();
    if duration.as_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    millis
}
