//! Connect protocol client for Rust.
//!
//! This crate implements the client side of the [Connect RPC protocol]
//! over HTTP/1.1:
//!
//! - Unary RPC calls (request-response)
//! - Server streaming RPC calls
//! - Client streaming RPC calls
//! - Bidirectional streaming RPC calls (half-duplex)
//! - Protobuf and JSON message encodings
//! - Per-call compression (gzip, brotli, zstd) through an injectable
//!   codec registry
//!
//! [Connect RPC protocol]: https://connectrpc.com/docs/protocol
//!
//! ## Example
//!
//! ```ignore
//! use lariat_client::ConnectClient;
//!
//! let client = ConnectClient::builder("http://localhost:3000")
//!     .use_proto()
//!     .build()?;
//!
//! // A unary call that raises on failure:
//! let reply: SayResponse = client
//!     .unary("eliza.v1.ElizaService/Say", &SayRequest { sentence: "Hello".into() })
//!     .await?;
//!
//! // The same call with errors recorded instead of raised:
//! let output = client
//!     .call_unary::<SayRequest, SayResponse>(
//!         "eliza.v1.ElizaService/Say",
//!         &SayRequest { sentence: "Hello".into() },
//!     )
//!     .await;
//! if let Some(err) = output.error() {
//!     eprintln!("call failed: {err}");
//! }
//! ```
//!
//! ## Server streaming
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let mut stream = client
//!     .server_stream::<IntroduceRequest, IntroduceResponse>(
//!         "eliza.v1.ElizaService/Introduce",
//!         &IntroduceRequest { name: "Henry".into() },
//!     )
//!     .await?;
//!
//! while let Some(result) = stream.next().await {
//!     println!("got: {:?}", result?);
//! }
//!
//! // Trailers become readable once the stream is fully drained.
//! let trailers = stream.response_trailers()?;
//! ```
//!
//! ## Cancellation
//!
//! Dropping an in-flight call future or a [`StreamOutput`] cancels the
//! RPC and releases the underlying connection. For a handle that should
//! outlive its connection, [`StreamOutput::close`] releases the transport
//! slot explicitly and records a sticky `canceled` error if the stream had
//! not finished. Timeouts ([`ClientBuilder::timeout`],
//! [`CallOptions::timeout`]) are deadline-triggered cancellation and
//! surface as `deadline_exceeded`; the deadline is also propagated to the
//! server via the `Connect-Timeout-Ms` header.
//!
//! ## Feature flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `compression-gzip` (default) | Gzip codec | `flate2` |
//! | `compression-br` (default) | Brotli codec | `brotli` |
//! | `compression-zstd` (default) | Zstandard codec | `zstd` |
//! | `tracing` | Spans for RPC calls | `tracing` |
//!
//! With `tracing` enabled, each call creates a span carrying
//! `rpc.method`, `rpc.type`, `rpc.encoding`, and `otel.kind = "client"`.

mod builder;
mod client;
mod error;
mod options;
pub mod request;
pub mod response;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder};
pub use client::ConnectClient;
pub use error::ClientError;
pub use options::CallOptions;

// Re-export from the request/response modules.
pub use request::EnvelopeEncoder;
pub use response::{EnvelopeDecoder, Metadata, StreamOutput, StreamState, UnaryOutput};

// Re-export transport types at the top level for convenience.
pub use transport::{HyperTransport, HyperTransportBuilder, Transport, TransportBody};

// Re-export core types that users need.
pub use lariat_core::{
    BoxedCodec, Code, Codec, CodecRegistry, ErrorDetail, MessageEncoding, Status,
};
