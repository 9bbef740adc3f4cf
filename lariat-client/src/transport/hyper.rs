//! Hyper-based HTTP transport.
//!
//! [`HyperTransport`] is the default [`Transport`] implementation, backed
//! by hyper_util's legacy pooled client.

use std::time::Duration;

use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;

use super::body::TransportBody;
use super::connector::build_https_connector;
use super::{ResponseBody, Transport};
use crate::ClientError;

/// Type alias for the hyper client with HTTPS connector.
type HyperClient = Client<HttpsConnector<HttpConnector>, TransportBody>;

/// HTTP transport using hyper_util's legacy client.
///
/// Provides HTTP/1.1 with TLS (rustls) and connection pooling. The pool is
/// shared by every call made through a client holding this transport;
/// dropping a response body returns its connection to the pool.
///
/// # Example
///
/// ```ignore
/// use lariat_client::transport::HyperTransport;
///
/// let transport = HyperTransport::builder()
///     .pool_idle_timeout(std::time::Duration::from_secs(60))
///     .build();
///
/// let client = ConnectClient::builder("https://api.example.com")
///     .transport(transport)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a new transport builder.
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a new transport with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> futures::future::BoxFuture<'static, Result<http::Response<ResponseBody>, ClientError>>
    {
        let future = self.client.request(request);
        Box::pin(async move {
            let response = future
                .await
                .map_err(|e| ClientError::Transport(format!("request failed: {}", e)))?;
            Ok(response.map(|body| {
                body.map_err(|e| ClientError::Transport(format!("body read failed: {}", e)))
                    .boxed_unsync()
            }))
        })
    }
}

/// Builder for [`HyperTransport`].
pub struct HyperTransportBuilder {
    /// Custom TLS configuration.
    tls_config: Option<ClientConfig>,
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self {
            tls_config: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }

    /// Use a custom rustls configuration (custom roots, client auth).
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Set how long idle pooled connections are kept alive.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Build the transport.
    pub fn build(self) -> HyperTransport {
        let connector = build_https_connector(self.tls_config);

        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.pool_max_idle_per_host);
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }

        HyperTransport {
            client: builder.build(connector),
        }
    }
}
