//! TLS connector setup for the hyper HTTP client.

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

/// Build an HTTPS-capable connector with the given TLS configuration.
///
/// If no custom TLS config is provided, the default webpki roots are used.
/// Plain `http://` URLs are allowed either way.
pub fn build_https_connector(tls_config: Option<ClientConfig>) -> HttpsConnector<HttpConnector> {
    match tls_config {
        Some(config) => HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .build(),
        None => HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build(),
    }
}

/// Create a default TLS client configuration with webpki roots.
///
/// Useful as a starting point for callers that want to add roots or client
/// auth before passing the config to [`HyperTransportBuilder::tls_config`].
///
/// [`HyperTransportBuilder::tls_config`]: super::HyperTransportBuilder::tls_config
pub fn default_tls_config() -> ClientConfig {
    ClientConfig::builder()
        .with_root_certificates(webpki_roots())
        .with_no_client_auth()
}

fn webpki_roots() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}
