//! HTTP transport seam for the Connect client.
//!
//! The client drives HTTP through the [`Transport`] trait: submit a
//! request (with a complete or streaming body), await the response head,
//! then stream the response body. Dropping the response body releases the
//! underlying connection; the client never closes the transport itself,
//! so one transport (and its connection pool) can be shared across calls.
//!
//! [`HyperTransport`] is the default implementation; tests inject
//! in-memory transports through [`ClientBuilder::transport`].
//!
//! [`ClientBuilder::transport`]: crate::ClientBuilder::transport

mod body;
mod connector;
mod hyper;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::ClientError;

pub use body::TransportBody;
pub use connector::{build_https_connector, default_tls_config};
pub use hyper::{HyperTransport, HyperTransportBuilder};

// Re-export the rustls config type users need for TLS configuration.
pub use rustls::ClientConfig as TlsClientConfig;

/// A streamed response body. Dropping it releases the transport slot.
pub type ResponseBody = http_body_util::combinators::UnsyncBoxBody<Bytes, ClientError>;

/// An HTTP transport capable of carrying Connect RPCs.
///
/// Implementations must resolve the returned future as soon as response
/// headers are available, leaving the body to stream lazily; streaming
/// request bodies must be fully driven before the response completes
/// (half-duplex on HTTP/1.1).
pub trait Transport: Send + Sync {
    /// Submit a request and await the response head.
    fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> BoxFuture<'static, Result<http::Response<ResponseBody>, ClientError>>;
}
