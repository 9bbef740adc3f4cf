//! Request body construction for the HTTP transport.
//!
//! Connect requests need exactly two body shapes: a complete buffer
//! (unary, and the single-envelope server-stream request) and a lazy
//! envelope stream (client/bidi streaming). Rather than hand-rolling a
//! body state machine, [`TransportBody`] assembles them from
//! `http-body-util`'s combinators and erases the result behind one type
//! the [`Transport`] trait can name.
//!
//! [`Transport`]: super::Transport

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};

use crate::ClientError;

/// A request body for Connect RPC calls.
///
/// Built by the call paths via [`empty`](Self::empty),
/// [`full`](Self::full), or [`streaming`](Self::streaming); transports
/// only ever poll it as an opaque [`Body`].
pub struct TransportBody(UnsyncBoxBody<Bytes, ClientError>);

/// `Empty`/`Full` cannot fail; align their error type with the stream case.
fn infallible(never: Infallible) -> ClientError {
    match never {}
}

impl TransportBody {
    /// A body with no payload.
    pub fn empty() -> Self {
        Self(Empty::new().map_err(infallible).boxed_unsync())
    }

    /// A complete body, sent with an exact content length.
    pub fn full(data: Bytes) -> Self {
        Self(Full::new(data).map_err(infallible).boxed_unsync())
    }

    /// A body produced lazily from a stream of byte chunks, one per
    /// envelope. The body ends when the stream does.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self(StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync())
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = ClientError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, ClientError>>> {
        Pin::new(&mut self.get_mut().0).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.0.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.0.size_hint()
    }
}

impl Default for TransportBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBody").finish_non_exhaustive()
    }
}
