//! Envelope decoding for streaming response bodies.
//!
//! [`EnvelopeDecoder`] wraps the raw byte stream of an HTTP response body
//! and yields decoded messages. The end-of-stream envelope is routed to the
//! trailing-metadata decoder instead of being yielded: its `metadata` field
//! is stored for retrieval after the stream finishes and its `error` field,
//! if present, is surfaced as the final stream item.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use lariat_core::{
    BoxedCodec, ENVELOPE_HEADER_SIZE, EnvelopeError, MessageEncoding, decode_payload,
    is_end_stream, parse_envelope_header,
};
use prost::Message;
use serde::{Deserialize, de::DeserializeOwned};

use crate::ClientError;
use crate::response::error_parser::{ErrorPayloadJson, status_from_payload};
use crate::response::types::Metadata;

/// Boxed byte stream of a response body.
pub(crate) type BodyByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// One decoded envelope.
enum DecodedFrame<T> {
    /// A message envelope carrying a decoded message.
    Message(T),
    /// The end-of-stream envelope (trailers are stored in the decoder).
    EndStream,
}

/// Stream adapter that decodes Connect envelopes from a byte stream.
///
/// Yields `Result<T, ClientError>`; the stream terminates after the
/// end-of-stream envelope. A body that ends without one fails with a
/// protocol error ("missing end-of-stream"), and a body cut off inside an
/// envelope fails with a truncation error.
pub struct EnvelopeDecoder<T> {
    /// The underlying byte stream.
    stream: BodyByteStream,
    /// Buffer for incomplete envelopes.
    buffer: BytesMut,
    /// Message encoding (protobuf or JSON).
    encoding: MessageEncoding,
    /// Stream codec for compressed envelopes; `None` is identity.
    codec: Option<BoxedCodec>,
    /// Trailers from the end-of-stream envelope.
    trailers: Option<Metadata>,
    /// Whether a terminal state was reached (end-of-stream or error).
    finished: bool,
    /// Error carried by the end-of-stream envelope, surfaced on the next
    /// poll so buffered messages drain first.
    end_stream_error: Option<ClientError>,
    _marker: PhantomData<T>,
}

impl<T> EnvelopeDecoder<T> {
    /// Create a decoder over a response body stream.
    pub fn new<S>(stream: S, encoding: MessageEncoding, codec: Option<BoxedCodec>) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            buffer: BytesMut::new(),
            encoding,
            codec,
            trailers: None,
            finished: false,
            end_stream_error: None,
            _marker: PhantomData,
        }
    }

    /// Take the trailers received in the end-of-stream envelope.
    pub fn take_trailers(&mut self) -> Option<Metadata> {
        self.trailers.take()
    }

    /// Whether a terminal state was reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode_message(&self, bytes: &[u8]) -> Result<T, ClientError>
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

    /// Try to parse one complete envelope out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    fn try_parse_frame(&mut self) -> Result<Option<DecodedFrame<T>>, ClientError>
    where
        T: Message + DeserializeOwned + Default,
    {
        if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buffer)?;
        let frame_size = ENVELOPE_HEADER_SIZE + length as usize;

        if self.buffer.len() < frame_size {
            return Ok(None);
        }

        let frame = self.buffer.split_to(frame_size);
        let payload = Bytes::copy_from_slice(&frame[ENVELOPE_HEADER_SIZE..]);
        let payload = decode_payload(flags, payload, self.codec.as_ref())?;

        if is_end_stream(flags) {
            let (error, trailers) = parse_end_stream(&payload)?;
            self.trailers = trailers;
            self.finished = true;
            self.end_stream_error = error;
            return Ok(Some(DecodedFrame::EndStream));
        }

        let message = self.decode_message(&payload)?;
        Ok(Some(DecodedFrame::Message(message)))
    }

    /// Interpret EOF from the underlying byte stream.
    fn eof_error(&self) -> ClientError {
        if self.buffer.is_empty() {
            ClientError::Protocol("missing end-of-stream".into())
        } else if self.buffer.len() < ENVELOPE_HEADER_SIZE {
            EnvelopeError::TruncatedHeader {
                expected: ENVELOPE_HEADER_SIZE,
                actual: self.buffer.len(),
            }
            .into()
        } else {
            // A complete, valid header must already be buffered or
            // try_parse_frame would have failed earlier.
            let length = u32::from_be_bytes([
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
                self.buffer[4],
            ]);
            EnvelopeError::TruncatedBody {
                expected: length as usize,
                actual: self.buffer.len() - ENVELOPE_HEADER_SIZE,
            }
            .into()
        }
    }
}

// The PhantomData never holds a T.
impl<T> Unpin for EnvelopeDecoder<T> {}

impl<T> Stream for EnvelopeDecoder<T>
where
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(err) = this.end_stream_error.take() {
                return Poll::Ready(Some(Err(err)));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match this.try_parse_frame() {
                Ok(Some(DecodedFrame::Message(msg))) => {
                    return Poll::Ready(Some(Ok(msg)));
                }
                Ok(Some(DecodedFrame::EndStream)) => {
                    if let Some(err) = this.end_stream_error.take() {
                        return Poll::Ready(Some(Err(err)));
                    }
                    return Poll::Ready(None);
                }
                Ok(None) => {
                    // Need more bytes.
                }
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(this.eof_error())));
                }
                Poll::Pending => {
                    return Poll::Pending;
                }
            }
        }
    }
}

/// JSON form of the end-of-stream envelope payload.
#[derive(Deserialize)]
struct EndStreamJson {
    #[serde(default)]
    error: Option<ErrorPayloadJson>,
    #[serde(default)]
    metadata: Option<HashMap<String, Vec<String>>>,
}

/// Parse an end-of-stream payload into `(error, trailers)`.
fn parse_end_stream(
    payload: &[u8],
) -> Result<(Option<ClientError>, Option<Metadata>), ClientError> {
    // An empty payload is valid: no error, no trailers.
    if payload.is_empty() {
        return Ok((None, None));
    }

    let end_stream: EndStreamJson = serde_json::from_slice(payload)
        .map_err(|e| ClientError::Protocol(format!("invalid end-of-stream JSON: {}", e)))?;

    let error = end_stream
        .error
        .map(|payload| ClientError::Rpc(status_from_payload(payload)));
    let trailers = end_stream.metadata.map(Metadata::from_end_stream);

    Ok((error, trailers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};
    use lariat_core::Code;

    // Helper to build a raw envelope.
    fn make_frame(flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.push(flags);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn decoder_for(
        chunks: Vec<Vec<u8>>,
        encoding: MessageEncoding,
        codec: Option<BoxedCodec>,
    ) -> EnvelopeDecoder<TestMessage> {
        let items: Vec<Result<Bytes, ClientError>> =
            chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        EnvelopeDecoder::new(stream::iter(items), encoding, codec)
    }

    // A minimal message type implementing both prost and serde.
    #[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct TestMessage {
        value: String,
    }

    impl prost::Message for TestMessage {
        fn encode_raw(&self, buf: &mut impl bytes::BufMut)
        where
            Self: Sized,
        {
            if !self.value.is_empty() {
                prost::encoding::string::encode(1, &self.value, buf);
            }
        }

        fn merge_field(
            &mut self,
            tag: u32,
            wire_type: prost::encoding::WireType,
            buf: &mut impl bytes::Buf,
            ctx: prost::encoding::DecodeContext,
        ) -> Result<(), prost::DecodeError>
        where
            Self: Sized,
        {
            if tag == 1 {
                prost::encoding::string::merge(wire_type, &mut self.value, buf, ctx)
            } else {
                prost::encoding::skip_field(wire_type, tag, buf, ctx)
            }
        }

        fn encoded_len(&self) -> usize {
            if self.value.is_empty() {
                0
            } else {
                prost::encoding::string::encoded_len(1, &self.value)
            }
        }

        fn clear(&mut self) {
            self.value.clear();
        }
    }

    #[tokio::test]
    async fn test_decode_single_json_message() {
        let mut data = make_frame(0x00, br#"{"value":"hello"}"#);
        data.extend_from_slice(&make_frame(0x02, b"{}"));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        assert!(decoder.next().await.is_none());
        assert!(decoder.is_finished());
    }

    #[tokio::test]
    async fn test_decode_proto_message() {
        let encoded = prost::Message::encode_to_vec(&TestMessage {
            value: "hello".to_string(),
        });
        let mut data = make_frame(0x00, &encoded);
        data.extend_from_slice(&make_frame(0x02, b"{}"));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Proto, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_multiple_messages_in_order() {
        let mut data = make_frame(0x00, br#"{"value":"one"}"#);
        data.extend_from_slice(&make_frame(0x00, br#"{"value":"two"}"#));
        data.extend_from_slice(&make_frame(0x02, b"{}"));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        assert_eq!(decoder.next().await.unwrap().unwrap().value, "one");
        assert_eq!(decoder.next().await.unwrap().unwrap().value, "two");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_zero_length_message() {
        // An empty payload is a legal user message (decodes to default).
        let mut data = make_frame(0x00, b"");
        data.extend_from_slice(&make_frame(0x02, b"{}"));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Proto, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg, TestMessage::default());
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_chunked_data() {
        let mut data = make_frame(0x00, br#"{"value":"hello"}"#);
        data.extend_from_slice(&make_frame(0x02, b"{}"));

        // Split into chunks that straddle the envelope boundaries.
        let chunks = vec![data[..3].to_vec(), data[3..10].to_vec(), data[10..].to_vec()];

        let mut decoder = decoder_for(chunks, MessageEncoding::Json, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_end_stream_error_after_messages() {
        let mut data = make_frame(0x00, br#"{"value":"hello"}"#);
        data.extend_from_slice(&make_frame(
            0x02,
            br#"{"error":{"code":"aborted","message":"stop"}}"#,
        ));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        // The buffered message drains before the error surfaces.
        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Aborted);
        assert_eq!(err.message(), Some("stop"));

        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_trailers() {
        let mut data = make_frame(0x00, br#"{"value":"hello"}"#);
        data.extend_from_slice(&make_frame(0x02, br#"{"metadata":{"x":["1"]}}"#));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        while decoder.next().await.is_some() {}

        let trailers = decoder.take_trailers().unwrap();
        let values: Vec<_> = trailers.get_all("x").collect();
        assert_eq!(values, vec!["1"]);
    }

    #[tokio::test]
    async fn test_decode_missing_end_stream() {
        let data = make_frame(0x00, br#"{"value":"hello"}"#);
        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "hello");

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), Some("missing end-of-stream"));

        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_truncated_header() {
        let mut decoder = decoder_for(vec![vec![0x00, 0x00, 0x00]], MessageEncoding::Json, None);

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().unwrap().contains("truncated envelope header"));
    }

    #[tokio::test]
    async fn test_decode_truncated_body() {
        // Header promises 10 bytes, body delivers 4.
        let mut data = vec![0x00];
        data.extend_from_slice(&10u32.to_be_bytes());
        data.extend_from_slice(b"onl");
        data.push(b'y');

        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().unwrap().contains("truncated envelope body"));
    }

    #[tokio::test]
    async fn test_decode_reserved_flags() {
        let data = make_frame(0x04, b"payload");
        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().unwrap().contains("invalid envelope flags"));
    }

    #[tokio::test]
    async fn test_decode_compressed_on_identity_stream() {
        let data = make_frame(0x01, b"compressed?");
        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, None);

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[cfg(feature = "compression-gzip")]
    #[tokio::test]
    async fn test_decode_compressed_message() {
        use lariat_core::GzipCodec;

        let codec = BoxedCodec::new(GzipCodec::default());
        let compressed = codec.compress(br#"{"value":"squeezed"}"#).unwrap();

        let mut data = make_frame(0x01, &compressed);
        data.extend_from_slice(&make_frame(0x02, b"{}"));

        let mut decoder = decoder_for(vec![data], MessageEncoding::Json, Some(codec));

        let msg = decoder.next().await.unwrap().unwrap();
        assert_eq!(msg.value, "squeezed");
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_transport_error_propagates() {
        let items: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from(make_frame(0x00, br#"{"value":"one"}"#))),
            Err(ClientError::Transport("connection reset".into())),
        ];
        let mut decoder: EnvelopeDecoder<TestMessage> =
            EnvelopeDecoder::new(stream::iter(items), MessageEncoding::Json, None);

        assert_eq!(decoder.next().await.unwrap().unwrap().value, "one");

        let err = decoder.next().await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert!(decoder.next().await.is_none());
    }

    #[test]
    fn test_parse_end_stream_empty() {
        let (error, trailers) = parse_end_stream(b"").unwrap();
        assert!(error.is_none());
        assert!(trailers.is_none());

        let (error, trailers) = parse_end_stream(b"{}").unwrap();
        assert!(error.is_none());
        assert!(trailers.is_none());
    }

    #[test]
    fn test_parse_end_stream_with_error() {
        let payload = br#"{"error":{"code":"not_found","message":"resource not found"}}"#;
        let (error, trailers) = parse_end_stream(payload).unwrap();

        let err = error.unwrap();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), Some("resource not found"));
        assert!(trailers.is_none());
    }

    #[test]
    fn test_parse_end_stream_with_metadata() {
        let payload = br#"{"metadata":{"x-request-id":["123"]}}"#;
        let (error, trailers) = parse_end_stream(payload).unwrap();

        assert!(error.is_none());
        let meta = trailers.unwrap();
        assert_eq!(meta.get("x-request-id"), Some("123"));
    }

    #[test]
    fn test_parse_end_stream_invalid_json() {
        let result = parse_end_stream(b"not json");
        assert!(result.is_err());
    }
}
