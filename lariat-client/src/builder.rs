//! Client builder for the Connect RPC client.
//!
//! Provides a fluent API for configuring and building a [`ConnectClient`].

use std::sync::Arc;
use std::time::Duration;

use http::HeaderValue;
use http::Uri;
use lariat_core::{CodecRegistry, MessageEncoding};

use crate::client::ConnectClient;
use crate::transport::{HyperTransport, Transport};

/// Default User-Agent sent with every request.
const DEFAULT_USER_AGENT: &str = concat!("lariat/", env!("CARGO_PKG_VERSION"));

/// Errors raised while building a [`ConnectClient`].
///
/// These are caller errors and surface synchronously from
/// [`ClientBuilder::build`], never as Connect errors on an output.
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The base URL is not an absolute HTTP URI.
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The requested compression encoding is not in the codec registry.
    #[error("request compression {0:?} is not in the codec registry")]
    UnsupportedRequestEncoding(String),

    /// A registered codec name or configured user agent is not a valid
    /// header value.
    #[error("invalid header value for {field}: {value:?}")]
    InvalidHeaderValue { field: &'static str, value: String },
}

/// Builder for creating a [`ConnectClient`].
///
/// # Example
///
/// ```ignore
/// use lariat_client::ClientBuilder;
/// use std::time::Duration;
///
/// let client = ClientBuilder::new("http://localhost:3000")
///     .use_proto()  // protobuf encoding (default is JSON)
///     .request_compression("gzip")
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct ClientBuilder {
    /// Base URL for the service (e.g., "http://localhost:3000").
    base_url: String,
    /// Optional pre-configured transport.
    transport: Option<Arc<dyn Transport>>,
    /// Message encoding for requests and responses.
    encoding: MessageEncoding,
    /// Codec registry used for compression negotiation.
    registry: CodecRegistry,
    /// Wire name of the request compression codec.
    request_encoding: String,
    /// Default timeout for RPC calls.
    default_timeout: Option<Duration>,
    /// User-Agent header value.
    user_agent: String,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("transport", &self.transport.is_some())
            .field("encoding", &self.encoding)
            .field("registry", &self.registry)
            .field("request_encoding", &self.request_encoding)
            .field("default_timeout", &self.default_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientBuilder {
    /// Create a new ClientBuilder with the given base URL.
    ///
    /// The base URL should include the scheme and host, e.g.,
    /// "http://localhost:3000", without a trailing slash.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            transport: None,
            // JSON by default, for broader compatibility.
            encoding: MessageEncoding::Json,
            registry: CodecRegistry::standard(),
            request_encoding: lariat_core::IDENTITY.to_string(),
            default_timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Use a pre-configured transport.
    ///
    /// The transport (and its connection pool) is shared across every call
    /// made through the built client and is never closed by it.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use JSON encoding for requests and responses. This is the default.
    pub fn use_json(mut self) -> Self {
        self.encoding = MessageEncoding::Json;
        self
    }

    /// Use protobuf encoding for requests and responses.
    pub fn use_proto(mut self) -> Self {
        self.encoding = MessageEncoding::Proto;
        self
    }

    /// Replace the codec registry used for compression negotiation.
    ///
    /// The registry determines which encodings are advertised via
    /// `Accept-Encoding` / `Connect-Accept-Encoding` and which incoming
    /// encodings can be decoded.
    pub fn codec_registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Compress request bodies (unary) and request envelopes (streaming)
    /// with the named codec.
    ///
    /// The name must be `identity` or registered in the codec registry;
    /// [`build`](Self::build) fails otherwise.
    pub fn request_compression<S: Into<String>>(mut self, name: S) -> Self {
        self.request_encoding = name.into();
        self
    }

    /// Set the default timeout for RPC calls.
    ///
    /// The timeout is propagated to the server via `Connect-Timeout-Ms`
    /// and enforced locally; expiry yields `deadline_exceeded`. Individual
    /// calls can override it with [`CallOptions::timeout`].
    ///
    /// [`CallOptions::timeout`]: crate::CallOptions::timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Override the User-Agent header.
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Build the client.
    ///
    /// Fails on an invalid base URL, an unregistered request compression
    /// name, or an invalid user agent.
    pub fn build(self) -> Result<ConnectClient, ClientBuildError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        let uri: Uri = base_url
            .parse()
            .map_err(|e: http::uri::InvalidUri| ClientBuildError::InvalidBaseUrl {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ClientBuildError::InvalidBaseUrl {
                url: base_url,
                reason: "missing scheme or authority".to_string(),
            });
        }

        let request_codec = self
            .registry
            .resolve(Some(&self.request_encoding))
            .map_err(|e| ClientBuildError::UnsupportedRequestEncoding(e.0))?;

        let accept_header = match self.registry.advertised() {
            Some(names) => Some(HeaderValue::try_from(names.clone()).map_err(|_| {
                ClientBuildError::InvalidHeaderValue {
                    field: "codec registry",
                    value: names,
                }
            })?),
            None => None,
        };

        let user_agent = HeaderValue::try_from(self.user_agent.clone()).map_err(|_| {
            ClientBuildError::InvalidHeaderValue {
                field: "user agent",
                value: self.user_agent,
            }
        })?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new()));

        Ok(ConnectClient::new(
            transport,
            base_url,
            self.encoding,
            self.registry,
            request_codec,
            accept_header,
            user_agent,
            self.default_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let client = ClientBuilder::new("http://localhost:3000").build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.encoding(), MessageEncoding::Json);
    }

    #[test]
    fn test_build_strips_trailing_slash() {
        let client = ClientBuilder::new("http://localhost:3000/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_build_rejects_invalid_base_url() {
        let err = ClientBuilder::new("localhost without scheme")
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidBaseUrl { .. }));

        let err = ClientBuilder::new("/just/a/path").build().unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn test_build_rejects_unknown_request_compression() {
        let err = ClientBuilder::new("http://localhost:3000")
            .request_compression("lz4")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientBuildError::UnsupportedRequestEncoding(name) if name == "lz4"
        ));
    }

    #[test]
    fn test_build_accepts_identity_request_compression() {
        let client = ClientBuilder::new("http://localhost:3000")
            .request_compression("identity")
            .build();
        assert!(client.is_ok());
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_build_accepts_registered_request_compression() {
        let client = ClientBuilder::new("http://localhost:3000")
            .request_compression("gzip")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_use_proto() {
        let client = ClientBuilder::new("http://localhost:3000")
            .use_proto()
            .build()
            .unwrap();
        assert_eq!(client.encoding(), MessageEncoding::Proto);
    }
}
