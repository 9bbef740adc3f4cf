//! The Connect RPC client facade.
//!
//! [`ConnectClient`] exposes the four RPC shapes, each in two forms:
//!
//! - Raising methods (`unary`, `server_stream`, `client_stream`,
//!   `bidi_stream`) return the typed result or `Err(ClientError)`.
//! - Non-raising methods (`call_unary`, `call_server_stream`,
//!   `call_client_stream`, `call_bidi_stream`) always return a
//!   [`UnaryOutput`] / [`StreamOutput`] with protocol, transport, timeout,
//!   and server errors recorded on the output instead of raised.
//!
//! Caller errors (an unregistered compression name, an invalid base URL)
//! surface synchronously from [`ClientBuilder::build`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use http_body_util::BodyExt;
use prost::Message;
use serde::{Serialize, de::DeserializeOwned};

use lariat_core::{
    BoxedCodec, Code, CodecRegistry, MessageEncoding, compress_payload, wrap_envelope,
};
#[cfg(feature = "tracing")]
use tracing::info_span;

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::options::{CallOptions, duration_to_timeout_header, round_up_to_millis};
use crate::request::EnvelopeEncoder;
use crate::response::error_parser::parse_error_body;
use crate::response::{EnvelopeDecoder, Metadata, StreamOutput, UnaryOutput};
use crate::transport::{Transport, TransportBody};

/// Header name for the Connect protocol version.
const CONNECT_PROTOCOL_VERSION_HEADER: &str = "connect-protocol-version";

/// Connect protocol version.
const CONNECT_PROTOCOL_VERSION: &str = "1";

/// Header name for the Connect timeout in milliseconds.
const CONNECT_TIMEOUT_HEADER: &str = "connect-timeout-ms";

/// Header name for streaming (per-envelope) request compression.
const CONNECT_CONTENT_ENCODING: &str = "connect-content-encoding";

/// Header name for streaming response compression negotiation.
const CONNECT_ACCEPT_ENCODING: &str = "connect-accept-encoding";

/// Check if a header name is reserved by the Connect protocol.
///
/// Reserved headers are never taken from caller-supplied [`CallOptions`].
/// Per the protocol, headers beginning with "Connect-" and "Grpc-" are
/// reserved; the content-negotiation headers the client sets itself are
/// treated the same way.
fn is_reserved_header(name: &http::header::HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("connect-")
        || name.starts_with("grpc-")
        || name == "content-type"
        || name == "content-encoding"
        || name == "accept-encoding"
        || name == "content-length"
}

/// Bound a future by an optional deadline; expiry yields
/// `deadline_exceeded`.
async fn with_deadline<T>(
    deadline: Option<tokio::time::Instant>,
    future: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, future).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::deadline_exceeded("deadline exceeded")),
        },
        None => future.await,
    }
}

/// Connect RPC client.
///
/// Cheap to clone; clones share the transport and its connection pool.
/// Use [`ConnectClient::builder`] to create an instance.
///
/// # Example
///
/// ```ignore
/// use lariat_client::ConnectClient;
///
/// let client = ConnectClient::builder("http://localhost:3000")
///     .use_proto()
///     .build()?;
///
/// let reply: SayResponse = client
///     .unary("eliza.v1.ElizaService/Say", &SayRequest { sentence: "Hello".into() })
///     .await?;
/// ```
#[derive(Clone)]
pub struct ConnectClient {
    /// Shared HTTP transport; never closed by the client.
    transport: Arc<dyn Transport>,
    /// Base URL for the service.
    base_url: String,
    /// Message encoding for requests and responses.
    encoding: MessageEncoding,
    /// Codec registry for compression negotiation.
    registry: CodecRegistry,
    /// Codec for outgoing bodies and envelopes; `None` is identity.
    request_codec: Option<BoxedCodec>,
    /// Precomputed Accept-Encoding value listing the registry's codecs.
    accept_header: Option<HeaderValue>,
    /// User-Agent header value.
    user_agent: HeaderValue,
    /// Default timeout for RPC calls.
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectClient")
            .field("base_url", &self.base_url)
            .field("encoding", &self.encoding)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectClient {
    /// Create a new [`ClientBuilder`] with the given base URL.
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        base_url: String,
        encoding: MessageEncoding,
        registry: CodecRegistry,
        request_codec: Option<BoxedCodec>,
        accept_header: Option<HeaderValue>,
        user_agent: HeaderValue,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            base_url,
            encoding,
            registry,
            request_codec,
            accept_header,
            user_agent,
            default_timeout,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the message encoding.
    pub fn encoding(&self) -> MessageEncoding {
        self.encoding
    }

    fn encode_message<T>(&self, msg: &T) -> Result<Bytes, ClientError>
    where
        T: Message + Serialize,
    {
        match self.encoding {
            MessageEncoding::Proto => Ok(Bytes::from(msg.encode_to_vec())),
            MessageEncoding::Json => serde_json::to_vec(msg)
                .map(Bytes::from)
                .map_err(|e| ClientError::Encode(format!("JSON encoding failed: {}", e))),
        }
    }

    fn decode_message<T>(&self, bytes: &[u8]) -> Result<T, ClientError>
    where
        T: Message + DeserializeOwned + Default,
    {
        match self.encoding {
            MessageEncoding::Proto => T::decode(bytes)
                .map_err(|e| ClientError::Decode(format!("protobuf decoding failed: {}", e))),
            MessageEncoding::Json => serde_json::from_slice(bytes)
                .map_err(|e| ClientError::Decode(format!("JSON decoding failed: {}", e))),
        }
    }

    /// Build the common request headers for a call.
    fn request_headers(
        &self,
        content_type: &'static str,
        timeout: Option<Duration>,
        options: &CallOptions,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(
            CONNECT_PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static(CONNECT_PROTOCOL_VERSION),
        );
        headers.insert(header::USER_AGENT, self.user_agent.clone());

        if let Some(timeout) = timeout
            && let Some(timeout_ms) = duration_to_timeout_header(timeout)
        {
            headers.insert(
                CONNECT_TIMEOUT_HEADER,
                HeaderValue::try_from(timeout_ms).expect("digits are a valid header value"),
            );
        }

        // Caller-supplied headers; header names are lowercase on the wire
        // and reserved protocol headers cannot be overridden. Remove first
        // so caller values replace defaults while keeping their own
        // multi-value order.
        for name in options.headers.keys() {
            if !is_reserved_header(name) {
                headers.remove(name);
            }
        }
        for (name, value) in options.headers.iter() {
            if !is_reserved_header(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        headers
    }

    fn build_request(
        &self,
        procedure: &str,
        headers: HeaderMap,
        body: TransportBody,
    ) -> Result<http::Request<TransportBody>, ClientError> {
        // Strip a leading slash from the procedure to avoid double slashes.
        let procedure = procedure.strip_prefix('/').unwrap_or(procedure);
        let url = format!("{}/{}", self.base_url, procedure);

        let mut builder = http::Request::builder().method(Method::POST).uri(&url);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        builder
            .body(body)
            .map_err(|e| ClientError::Protocol(format!("failed to build request: {}", e)))
    }

    /// Undo whole-body compression on a non-200 body, best effort.
    fn decompress_error_body(&self, headers: &HeaderMap, body: Bytes) -> Bytes {
        let encoding = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        match self.registry.resolve(encoding) {
            Ok(Some(codec)) => codec.decompress(&body).unwrap_or(body),
            _ => body,
        }
    }

    // ------------------------------------------------------------------
    // Unary
    // ------------------------------------------------------------------

    /// Make a unary RPC call, returning the response message or an error.
    ///
    /// # Arguments
    ///
    /// * `procedure` - Full procedure path (e.g., "eliza.v1.ElizaService/Say")
    /// * `request` - The request message
    pub async fn unary<Req, Res>(&self, procedure: &str, request: &Req) -> Result<Res, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.call_unary(procedure, request).await.into_result()
    }

    /// [`unary`](Self::unary) with per-call options.
    pub async fn unary_with_options<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<Res, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.call_unary_with_options(procedure, request, options)
            .await
            .into_result()
    }

    /// Make a unary RPC call, never raising on protocol-level failures.
    ///
    /// The returned [`UnaryOutput`] carries either the response message or
    /// the error, plus leading headers and `trailer-`-prefixed trailing
    /// metadata.
    pub async fn call_unary<Req, Res>(&self, procedure: &str, request: &Req) -> UnaryOutput<Res>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.call_unary_with_options(procedure, request, CallOptions::new())
            .await
    }

    /// [`call_unary`](Self::call_unary) with per-call options.
    pub async fn call_unary_with_options<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> UnaryOutput<Res>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "unary",
            rpc.encoding = %self.encoding,
            otel.kind = "client",
        )
        .entered();

        match self.unary_inner(procedure, request, options).await {
            Ok(output) => output,
            Err(e) => UnaryOutput::from_error(e, Metadata::default(), Metadata::default()),
        }
    }

    async fn unary_inner<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<UnaryOutput<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        let timeout = options.timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + round_up_to_millis(t));

        let mut headers =
            self.request_headers(self.encoding.unary_content_type(), timeout, &options);

        // An empty request message serializes to a zero-byte body.
        let payload = self.encode_message(request)?;
        let (payload, compressed) = compress_payload(payload, self.request_codec.as_ref())?;
        if compressed
            && let Some(codec) = &self.request_codec
        {
            headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(codec.name()));
        }
        if let Some(accept) = &self.accept_header {
            headers.insert(header::ACCEPT_ENCODING, accept.clone());
        }

        let request = self.build_request(procedure, headers, TransportBody::full(payload))?;

        let (status, response_headers, body) = with_deadline(deadline, async {
            let response = self.transport.request(request).await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.into_body().collect().await?.to_bytes();
            Ok((status, headers, body))
        })
        .await?;

        let (leading, trailers) = Metadata::split_unary(&response_headers);

        if status != StatusCode::OK {
            let body = self.decompress_error_body(&response_headers, body);
            let error = parse_error_body(status, &body);
            return Ok(UnaryOutput::from_error(error, leading, trailers));
        }

        if let Some(content_type) = response_headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && !MessageEncoding::matches_content_type(
                self.encoding.unary_content_type(),
                content_type,
            )
        {
            let error =
                ClientError::Protocol(format!("unexpected response content-type: {}", content_type));
            return Ok(UnaryOutput::from_error(error, leading, trailers));
        }

        let encoding = response_headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let codec = match self.registry.resolve(encoding) {
            Ok(codec) => codec,
            Err(e) => return Ok(UnaryOutput::from_error(e.into(), leading, trailers)),
        };
        let body = match &codec {
            Some(codec) => match codec.decompress(&body) {
                Ok(body) => body,
                Err(e) => {
                    let error = ClientError::Decode(format!("decompression failed: {}", e));
                    return Ok(UnaryOutput::from_error(error, leading, trailers));
                }
            },
            None => body,
        };

        match self.decode_message(&body) {
            Ok(message) => Ok(UnaryOutput::from_message(message, leading, trailers)),
            Err(e) => Ok(UnaryOutput::from_error(e, leading, trailers)),
        }
    }

    // ------------------------------------------------------------------
    // Server streaming
    // ------------------------------------------------------------------

    /// Make a server-streaming RPC call.
    ///
    /// The request body carries exactly one envelope; the returned
    /// [`StreamOutput`] lazily yields response messages and exposes
    /// trailers after the stream is drained.
    pub async fn server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.server_stream_with_options(procedure, request, CallOptions::new())
            .await
    }

    /// [`server_stream`](Self::server_stream) with per-call options.
    pub async fn server_stream_with_options<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "server_stream",
            rpc.encoding = %self.encoding,
            otel.kind = "client",
        )
        .entered();

        let payload = self.encode_message(request)?;
        let (payload, compressed) = compress_payload(payload, self.request_codec.as_ref())?;
        let body = TransportBody::full(Bytes::from(wrap_envelope(&payload, compressed)));
        self.open_stream(procedure, body, &options).await
    }

    /// Non-raising form of [`server_stream`](Self::server_stream): open
    /// failures come back as a closed [`StreamOutput`] with the error
    /// recorded.
    pub async fn call_server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> StreamOutput<Res>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        self.call_server_stream_with_options(procedure, request, CallOptions::new())
            .await
    }

    /// [`call_server_stream`](Self::call_server_stream) with per-call options.
    pub async fn call_server_stream_with_options<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
        options: CallOptions,
    ) -> StreamOutput<Res>
    where
        Req: Message + Serialize,
        Res: Message + DeserializeOwned + Default,
    {
        match self
            .server_stream_with_options(procedure, request, options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => StreamOutput::failed(e, Metadata::default()),
        }
    }

    // ------------------------------------------------------------------
    // Client streaming
    // ------------------------------------------------------------------

    /// Make a client-streaming RPC call.
    ///
    /// One envelope is sent per message from `requests`; the body finishes
    /// before the response is read (half-duplex). The server's single
    /// reply is returned; a second reply is an `internal` error.
    pub async fn client_stream<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
    ) -> Result<Res, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        self.call_client_stream(procedure, requests)
            .await
            .into_result()
    }

    /// [`client_stream`](Self::client_stream) over an eager collection.
    pub async fn client_stream_iter<Req, Res, I>(
        &self,
        procedure: &str,
        requests: I,
    ) -> Result<Res, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        I: IntoIterator<Item = Req>,
        I::IntoIter: Send + 'static,
    {
        self.client_stream(procedure, futures::stream::iter(requests))
            .await
    }

    /// Non-raising form of [`client_stream`](Self::client_stream),
    /// returning a unary-shaped output.
    pub async fn call_client_stream<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
    ) -> UnaryOutput<Res>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        self.call_client_stream_with_options(procedure, requests, CallOptions::new())
            .await
    }

    /// [`call_client_stream`](Self::call_client_stream) with per-call options.
    pub async fn call_client_stream_with_options<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
        options: CallOptions,
    ) -> UnaryOutput<Res>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "client_stream",
            rpc.encoding = %self.encoding,
            otel.kind = "client",
        )
        .entered();

        let encoder = EnvelopeEncoder::new(requests, self.encoding, self.request_codec.clone());
        let body = TransportBody::streaming(encoder);
        match self.open_stream(procedure, body, &options).await {
            Ok(stream) => Self::single_message(stream).await,
            Err(e) => UnaryOutput::from_error(e, Metadata::default(), Metadata::default()),
        }
    }

    /// Collapse a response stream into a unary-shaped output: exactly one
    /// message is expected before the end-of-stream envelope.
    async fn single_message<Res>(mut stream: StreamOutput<Res>) -> UnaryOutput<Res>
    where
        Res: Message + DeserializeOwned + Default,
    {
        let headers = stream.response_headers().clone();
        let trailers_of = |stream: &StreamOutput<Res>| {
            stream
                .response_trailers()
                .ok()
                .cloned()
                .unwrap_or_default()
        };

        let first = match stream.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                let trailers = trailers_of(&stream);
                return UnaryOutput::from_error(e, headers, trailers);
            }
            None => {
                let trailers = trailers_of(&stream);
                let error = stream.error().cloned().unwrap_or_else(|| {
                    ClientError::new(Code::Internal, "response stream carried no message")
                });
                return UnaryOutput::from_error(error, headers, trailers);
            }
        };

        match stream.next().await {
            None => {
                let trailers = trailers_of(&stream);
                UnaryOutput::from_message(first, headers, trailers)
            }
            Some(Err(e)) => {
                let trailers = trailers_of(&stream);
                UnaryOutput::from_error(e, headers, trailers)
            }
            Some(Ok(_)) => {
                stream.close();
                UnaryOutput::from_error(
                    ClientError::new(
                        Code::Internal,
                        "client-streaming response has multiple messages",
                    ),
                    headers,
                    Metadata::default(),
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // Bidirectional streaming (half-duplex)
    // ------------------------------------------------------------------

    /// Make a bidirectional streaming RPC call.
    ///
    /// Half-duplex: the request body is fully sent before response
    /// iteration begins. Requires the server to tolerate HTTP/1.1
    /// sequencing; full-duplex operation is out of scope.
    pub async fn bidi_stream<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        self.bidi_stream_with_options(procedure, requests, CallOptions::new())
            .await
    }

    /// [`bidi_stream`](Self::bidi_stream) over an eager collection.
    pub async fn bidi_stream_iter<Req, Res, I>(
        &self,
        procedure: &str,
        requests: I,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        I: IntoIterator<Item = Req>,
        I::IntoIter: Send + 'static,
    {
        self.bidi_stream(procedure, futures::stream::iter(requests))
            .await
    }

    /// [`bidi_stream`](Self::bidi_stream) with per-call options.
    pub async fn bidi_stream_with_options<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
        options: CallOptions,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        #[cfg(feature = "tracing")]
        let _span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = "bidi_stream",
            rpc.encoding = %self.encoding,
            otel.kind = "client",
        )
        .entered();

        let encoder = EnvelopeEncoder::new(requests, self.encoding, self.request_codec.clone());
        let body = TransportBody::streaming(encoder);
        self.open_stream(procedure, body, &options).await
    }

    /// Non-raising form of [`bidi_stream`](Self::bidi_stream).
    pub async fn call_bidi_stream<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
    ) -> StreamOutput<Res>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        self.call_bidi_stream_with_options(procedure, requests, CallOptions::new())
            .await
    }

    /// [`call_bidi_stream`](Self::call_bidi_stream) with per-call options.
    pub async fn call_bidi_stream_with_options<Req, Res, S>(
        &self,
        procedure: &str,
        requests: S,
        options: CallOptions,
    ) -> StreamOutput<Res>
    where
        Req: Message + Serialize + 'static,
        Res: Message + DeserializeOwned + Default,
        S: Stream<Item = Req> + Send + Unpin + 'static,
    {
        match self
            .bidi_stream_with_options(procedure, requests, options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => StreamOutput::failed(e, Metadata::default()),
        }
    }

    // ------------------------------------------------------------------
    // Shared streaming plumbing
    // ------------------------------------------------------------------

    /// Send a streaming request and open the response as a
    /// [`StreamOutput`].
    async fn open_stream<Res>(
        &self,
        procedure: &str,
        body: TransportBody,
        options: &CallOptions,
    ) -> Result<StreamOutput<Res>, ClientError>
    where
        Res: Message + DeserializeOwned + Default,
    {
        let timeout = options.timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + round_up_to_millis(t));

        let mut headers =
            self.request_headers(self.encoding.streaming_content_type(), timeout, options);

        // Streaming requests advertise compression at the envelope level,
        // not with the HTTP content-coding headers.
        if let Some(codec) = &self.request_codec {
            headers.insert(CONNECT_CONTENT_ENCODING, HeaderValue::from_static(codec.name()));
        }
        if let Some(accept) = &self.accept_header {
            headers.insert(CONNECT_ACCEPT_ENCODING, accept.clone());
        }

        let request = self.build_request(procedure, headers, body)?;
        let response = with_deadline(deadline, self.transport.request(request)).await?;

        let status = response.status();
        let response_headers = response.headers().clone();

        if status != StatusCode::OK {
            let body = with_deadline(deadline, async {
                Ok(response.into_body().collect().await?.to_bytes())
            })
            .await?;
            let body = self.decompress_error_body(&response_headers, body);
            return Err(parse_error_body(status, &body));
        }

        if let Some(content_type) = response_headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && !MessageEncoding::matches_content_type(
                self.encoding.streaming_content_type(),
                content_type,
            )
        {
            return Err(ClientError::Protocol(format!(
                "unexpected response content-type: {}",
                content_type
            )));
        }

        let encoding = response_headers
            .get(CONNECT_CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let codec = self.registry.resolve(encoding)?;

        let byte_stream = response.into_body().into_data_stream();
        let decoder = EnvelopeDecoder::new(byte_stream, self.encoding, codec);

        Ok(StreamOutput::open(
            decoder,
            Metadata::new(response_headers),
            deadline,
        ))
    }
}
