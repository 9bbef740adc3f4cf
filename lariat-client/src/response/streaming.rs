//! The streaming response handle.
//!
//! [`StreamOutput`] owns one transport slot from open to close and moves
//! through three states:
//!
//! - `Open`: response headers received; [`response_headers`] is valid.
//! - `Draining`: iteration has started; each pull awaits one envelope.
//! - `Closed`: the end-of-stream envelope was consumed, an error occurred,
//!   or the handle was closed early. Trailers become readable, iteration
//!   terminates, and the transport slot has been released.
//!
//! The handle releases its connection on every exit path: normal drain,
//! early [`close`], and drop (Rust's scope exit). Closing before the
//! end-of-stream envelope records a sticky `canceled` error.
//!
//! [`response_headers`]: StreamOutput::response_headers
//! [`close`]: StreamOutput::close

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use lariat_core::Code;
use prost::Message;
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::response::decoder::EnvelopeDecoder;
use crate::response::types::Metadata;

/// Lifecycle state of a [`StreamOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Headers received, no envelope pulled yet.
    Open,
    /// Iteration in progress.
    Draining,
    /// Terminal; the transport slot has been released.
    Closed,
}

/// Handle for a streaming RPC response.
///
/// Iterate it as a [`futures::Stream`] of `Result<T, ClientError>`. After
/// the stream finishes, [`response_trailers`](Self::response_trailers)
/// exposes trailing metadata and [`error`](Self::error) the sticky error,
/// if any. Errors are sticky: once recorded, `error()` keeps reporting the
/// same error for the life of the handle.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut stream = client
///     .server_stream::<IntroduceRequest, IntroduceResponse>(
///         "eliza.v1.ElizaService/Introduce",
///         &request,
///     )
///     .await?;
///
/// while let Some(result) = stream.next().await {
///     println!("got: {:?}", result?);
/// }
///
/// let trailers = stream.response_trailers()?;
/// ```
pub struct StreamOutput<T> {
    /// Decoder over the response body; dropped to release the transport
    /// slot, exactly once.
    decoder: Option<EnvelopeDecoder<T>>,
    headers: Metadata,
    /// Trailing metadata; set only when a terminal envelope (or EOF) was
    /// actually observed, not when the handle was closed early.
    trailers: Option<Metadata>,
    /// Sticky error.
    error: Option<ClientError>,
    state: StreamState,
    /// Local deadline for the whole call, armed at open.
    deadline: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl<T> StreamOutput<T> {
    /// Create a handle for a successfully opened stream.
    pub(crate) fn open(
        decoder: EnvelopeDecoder<T>,
        headers: Metadata,
        deadline: Option<tokio::time::Instant>,
    ) -> Self {
        Self {
            decoder: Some(decoder),
            headers,
            trailers: None,
            error: None,
            state: StreamState::Open,
            deadline: deadline.map(|d| Box::pin(tokio::time::sleep_until(d))),
        }
    }

    /// Create a handle for a call that failed before any message could be
    /// yielded. The handle is born `Closed` with empty trailers.
    pub(crate) fn failed(error: ClientError, headers: Metadata) -> Self {
        Self {
            decoder: None,
            headers,
            trailers: Some(Metadata::default()),
            error: Some(error),
            state: StreamState::Closed,
            deadline: None,
        }
    }

    /// Leading response metadata, available from open.
    pub fn response_headers(&self) -> &Metadata {
        &self.headers
    }

    /// Trailing response metadata.
    ///
    /// Fails with `failed_precondition` until the stream is `Closed`, and
    /// when the handle was closed before the end-of-stream envelope
    /// arrived.
    pub fn response_trailers(&self) -> Result<&Metadata, ClientError> {
        if self.state != StreamState::Closed {
            return Err(ClientError::failed_precondition(
                "response trailers are not available until the stream is fully consumed",
            ));
        }
        self.trailers.as_ref().ok_or_else(|| {
            ClientError::failed_precondition("stream was closed before the end-of-stream envelope")
        })
    }

    /// The sticky error, if one was recorded.
    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the handle reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Release the transport slot. Idempotent.
    ///
    /// Closing before the end-of-stream envelope records a sticky
    /// `canceled` error and leaves trailers unavailable. Dropping the
    /// handle has the same release effect; `close` exists for callers that
    /// want the handle to outlive the connection.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        let finished = self.decoder.as_ref().is_none_or(|d| d.is_finished());
        if !finished {
            self.error.get_or_insert_with(|| {
                ClientError::new(Code::Canceled, "stream closed before completion")
            });
        }
        self.finish(finished);
    }

    /// Move to `Closed`, dropping the decoder (releasing the connection).
    /// `keep_trailers` is true when a terminal state was observed through
    /// iteration, making trailing metadata well-defined.
    fn finish(&mut self, keep_trailers: bool) {
        if let Some(mut decoder) = self.decoder.take()
            && keep_trailers
        {
            self.trailers = Some(decoder.take_trailers().unwrap_or_default());
        }
        self.deadline = None;
        self.state = StreamState::Closed;
    }
}

impl<T> StreamOutput<T>
where
    T: Message + DeserializeOwned + Default,
{
    /// Drain all remaining messages without processing them.
    ///
    /// Consumes the stream to its end so trailers become available and the
    /// connection can be reused. Returns the number of messages drained
    /// (not counting errors).
    pub async fn drain(&mut self) -> usize {
        use futures::StreamExt;
        let mut count = 0;
        while let Some(result) = self.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Drain remaining messages, giving up after `timeout`.
    ///
    /// Returns `Ok(count)` when the stream was fully drained, `Err(count)`
    /// when the timeout expired first.
    pub async fn drain_timeout(&mut self, timeout: std::time::Duration) -> Result<usize, usize> {
        use futures::StreamExt;
        let mut count = 0;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(count);
                }

                item = self.next() => {
                    match item {
                        Some(Ok(_)) => count += 1,
                        Some(Err(_)) => {}
                        None => return Ok(count),
                    }
                }
            }
        }
    }
}

impl<T> Unpin for StreamOutput<T> {}

impl<T> Stream for StreamOutput<T>
where
    T: Message + DeserializeOwned + Default,
{
    type Item = Result<T, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.state == StreamState::Closed {
            return Poll::Ready(None);
        }
        this.state = StreamState::Draining;

        if let Some(deadline) = this.deadline.as_mut()
            && deadline.as_mut().poll(cx).is_ready()
        {
            let err = ClientError::new(
                Code::DeadlineExceeded,
                "deadline exceeded while reading stream",
            );
            this.error.get_or_insert(err.clone());
            this.finish(false);
            return Poll::Ready(Some(Err(err)));
        }

        let Some(decoder) = this.decoder.as_mut() else {
            this.state = StreamState::Closed;
            return Poll::Ready(None);
        };

        match Pin::new(decoder).poll_next(cx) {
            Poll::Ready(Some(Ok(msg))) => Poll::Ready(Some(Ok(msg))),
            Poll::Ready(Some(Err(e))) => {
                this.error.get_or_insert(e.clone());
                this.finish(true);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(true);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for StreamOutput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutput")
            .field("state", &self.state)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
