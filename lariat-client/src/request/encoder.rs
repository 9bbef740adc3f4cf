//! Envelope encoding for streaming request bodies.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use lariat_core::{BoxedCodec, MessageEncoding, compress_payload, wrap_envelope};
use prost::Message;
use serde::Serialize;

use crate::ClientError;

/// Stream adapter that encodes messages into Connect envelopes.
///
/// Wraps a stream of request messages and yields framed bytes suitable for
/// a streaming request body. Each message becomes one envelope; the body
/// ends with plain EOF when the message stream is exhausted — the client
/// side sends no end-of-stream envelope.
///
/// # Example
///
/// ```ignore
/// use futures::stream;
///
/// let messages = stream::iter(vec![
///     SayRequest { sentence: "hello".into() },
///     SayRequest { sentence: "world".into() },
/// ]);
///
/// let encoder = EnvelopeEncoder::new(messages, MessageEncoding::Proto, None);
/// let body = TransportBody::streaming(encoder);
/// ```
pub struct EnvelopeEncoder<S, T> {
    /// The underlying message stream.
    stream: S,
    /// Message encoding (protobuf or JSON).
    encoding: MessageEncoding,
    /// Per-envelope compression codec; `None` is identity.
    codec: Option<BoxedCodec>,
    /// Set once the inner stream is exhausted or an encode error occurred.
    finished: bool,
    _marker: PhantomData<T>,
}

impl<S, T> EnvelopeEncoder<S, T> {
    /// Create a new envelope encoder.
    pub fn new(stream: S, encoding: MessageEncoding, codec: Option<BoxedCodec>) -> Self {
        Self {
            stream,
            encoding,
            codec,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Whether all envelopes have been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn encode_message(&self, msg: &T) -> Result<Bytes, ClientError>
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

    /// Serialize, optionally compress, and frame one message.
    fn encode_frame(&self, msg: &T) -> Result<Bytes, ClientError>
    where
        T: Message + Serialize,
    {
        let payload = self.encode_message(msg)?;
        let (payload, compressed) = compress_payload(payload, self.codec.as_ref())?;
        Ok(Bytes::from(wrap_envelope(&payload, compressed)))
    }
}

impl<S: Unpin, T> Unpin for EnvelopeEncoder<S, T> {}

impl<S, T> Stream for EnvelopeEncoder<S, T>
where
    S: Stream<Item = T> + Unpin,
    T: Message + Serialize,
{
    type Item = Result<Bytes, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.stream).poll_next(cx) {
            Poll::Ready(Some(msg)) => match this.encode_frame(&msg) {
                Ok(frame) => Poll::Ready(Some(Ok(frame))),
                Err(e) => {
                    this.finished = true;
                    Poll::Ready(Some(Err(e)))
                }
            },
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};

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

    fn parse_frame(frame: &[u8]) -> (u8, &[u8]) {
        let length = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        (frame[0], &frame[5..5 + length])
    }

    #[tokio::test]
    async fn test_encode_json_messages() {
        let messages = stream::iter(vec![
            TestMessage {
                value: "one".to_string(),
            },
            TestMessage {
                value: "two".to_string(),
            },
        ]);

        let mut encoder = EnvelopeEncoder::new(messages, MessageEncoding::Json, None);

        let frame = encoder.next().await.unwrap().unwrap();
        let (flags, payload) = parse_frame(&frame);
        assert_eq!(flags, 0x00);
        assert_eq!(payload, br#"{"value":"one"}"#);

        let frame = encoder.next().await.unwrap().unwrap();
        let (_, payload) = parse_frame(&frame);
        assert_eq!(payload, br#"{"value":"two"}"#);

        // No end-of-stream envelope: the body just ends.
        assert!(encoder.next().await.is_none());
        assert!(encoder.is_finished());
    }

    #[tokio::test]
    async fn test_encode_proto_message() {
        let messages = stream::iter(vec![TestMessage {
            value: "hello".to_string(),
        }]);

        let mut encoder = EnvelopeEncoder::new(messages, MessageEncoding::Proto, None);

        let frame = encoder.next().await.unwrap().unwrap();
        let (flags, payload) = parse_frame(&frame);
        assert_eq!(flags, 0x00);

        let decoded = <TestMessage as prost::Message>::decode(payload).unwrap();
        assert_eq!(decoded.value, "hello");

        assert!(encoder.next().await.is_none());
    }

    #[tokio::test]
    async fn test_encode_empty_stream() {
        let messages = stream::iter(Vec::<TestMessage>::new());
        let mut encoder = EnvelopeEncoder::new(messages, MessageEncoding::Json, None);

        assert!(encoder.next().await.is_none());
        assert!(encoder.is_finished());
    }

    #[cfg(feature = "compression-gzip")]
    #[tokio::test]
    async fn test_encode_compressed() {
        use lariat_core::GzipCodec;

        let codec = BoxedCodec::new(GzipCodec::default());
        let messages = stream::iter(vec![TestMessage {
            value: "squeeze me".to_string(),
        }]);

        let mut encoder =
            EnvelopeEncoder::new(messages, MessageEncoding::Json, Some(codec.clone()));

        let frame = encoder.next().await.unwrap().unwrap();
        let (flags, payload) = parse_frame(&frame);
        assert_eq!(flags, 0x01);

        let decompressed = codec.decompress(payload).unwrap();
        assert_eq!(&decompressed[..], br#"{"value":"squeeze me"}"#);
    }
}
