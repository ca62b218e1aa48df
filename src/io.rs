//! Readiness-based I/O contracts for one exchange.
//!
//! The transport never blocks a worker on socket I/O. Request bodies are
//! drained through [`BodySource`] and responses are written through
//! [`ResponseSink`]; both expose a non-blocking readiness check plus an
//! asynchronous notification that fires when progress is possible again.
//!
//! The `channel` adapters implement both contracts on top of tokio channels
//! so an HTTP front end (or a test) can feed bodies in and collect
//! responses out.

mod channel;

use std::{
    future::poll_fn,
    io,
    task::{Context, Poll},
};

use bytes::Bytes;
pub use channel::{
    BodySender,
    ChannelBody,
    ChannelSink,
    CollectedResponse,
    DEFAULT_BODY_CHANNEL_CAPACITY,
    DEFAULT_HIGH_WATER_MARK,
    ResponsePart,
    ResponseReceiver,
    body_channel,
    response_channel,
};

/// Non-blocking source of request body bytes.
pub trait BodySource {
    /// Returns `true` if [`read`](Self::read) can make progress without
    /// waiting.
    ///
    /// This check may pull pending data from the underlying transport, so it
    /// must be evaluated before [`is_finished`](Self::is_finished).
    fn is_ready(&mut self) -> bool;

    /// Returns `true` once the whole body has been read.
    fn is_finished(&self) -> bool;

    /// Copy available bytes into `buf`, returning how many were copied.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the underlying transport.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Resolve when data (or end of body) is available.
    ///
    /// An `Err` is the transport's error notification for this exchange.
    fn poll_data_available(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

/// Non-blocking sink for a response.
///
/// Writes are always accepted and buffered; [`is_ready`](Self::is_ready)
/// reports whether the caller should keep writing or wait for
/// [`poll_write_possible`](Self::poll_write_possible).
pub trait ResponseSink {
    /// Set the response status. Ignored once the head is committed.
    fn set_status(&mut self, status: u16);

    /// Set the response content type. Ignored once the head is committed.
    fn set_content_type(&mut self, content_type: &'static str);

    /// Queue `bytes` for delivery, committing the head first if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the client has gone or the response was
    /// already completed.
    fn write(&mut self, bytes: Bytes) -> io::Result<()>;

    /// Returns `true` if more bytes may be written without waiting.
    fn is_ready(&mut self) -> bool;

    /// Resolve when writing may continue.
    ///
    /// An `Err` is the transport's error notification for this exchange.
    fn poll_write_possible(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Resolve with the error notification once the client has gone.
    ///
    /// Polled while a suspended exchange is not writing. The default never
    /// resolves.
    fn poll_closed(&mut self, _cx: &mut Context<'_>) -> Poll<io::Error> { Poll::Pending }

    /// Finish the response, committing the head if nothing was written.
    fn complete(&mut self);
}

/// Wait for the next data-available notification on `body`.
///
/// # Errors
///
/// Returns the I/O error notified by the body source.
pub async fn data_available<B: BodySource + ?Sized>(body: &mut B) -> io::Result<()> {
    poll_fn(|cx| body.poll_data_available(cx)).await
}

/// Wait for the next write-possible notification on `sink`.
///
/// # Errors
///
/// Returns the I/O error notified by the sink.
pub async fn write_possible<S: ResponseSink + ?Sized>(sink: &mut S) -> io::Result<()> {
    poll_fn(|cx| sink.poll_write_possible(cx)).await
}

/// Wait until `sink` reports that the client has gone.
pub async fn closed<S: ResponseSink + ?Sized>(sink: &mut S) -> io::Error {
    poll_fn(|cx| sink.poll_closed(cx)).await
}
