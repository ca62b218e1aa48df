//! One request/response exchange.
//!
//! An [`Exchange`] owns the response half of a request and guarantees it is
//! completed exactly once: normally after the reply array is flushed, or
//! with an error status when reading, processing, or writing fails. An
//! exchange dropped before completing (for example while a panicking task
//! unwinds) answers with `500`.

use std::{
    fmt,
    io,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, warn};

use crate::{
    error::{INTERNAL_SERVER_ERROR, TransportError},
    io::{ResponseSink, closed, write_possible},
    metrics,
    writer::{ReplyWriter, WriteProgress},
};

/// Content type of every poll response.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);
static ACTIVE_EXCHANGES: AtomicU64 = AtomicU64::new(0);

/// Identifier assigned to an exchange, used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeId(u64);

impl ExchangeId {
    /// Allocate the next process-wide identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ExchangeId({})", self.0) }
}

/// RAII guard counting exchanges that have not completed yet.
struct ActiveExchange;

impl ActiveExchange {
    fn new() -> Self {
        ACTIVE_EXCHANGES.fetch_add(1, Ordering::Relaxed);
        metrics::inc_exchanges();
        Self
    }
}

impl Drop for ActiveExchange {
    fn drop(&mut self) {
        ACTIVE_EXCHANGES.fetch_sub(1, Ordering::Relaxed);
        metrics::dec_exchanges();
    }
}

/// Return the number of exchanges that are reading, suspended, or writing.
#[must_use]
pub fn active_exchange_count() -> u64 { ACTIVE_EXCHANGES.load(Ordering::Relaxed) }

/// The response side of one request.
pub struct Exchange<S: ResponseSink> {
    id: ExchangeId,
    sink: S,
    completed: bool,
    _active: Option<ActiveExchange>,
}

impl<S: ResponseSink> fmt::Debug for Exchange<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl<S: ResponseSink> Exchange<S> {
    /// Start an exchange answering through `sink` with a JSON content type.
    pub fn new(mut sink: S) -> Self {
        sink.set_content_type(JSON_CONTENT_TYPE);
        Self {
            id: ExchangeId::next(),
            sink,
            completed: false,
            _active: Some(ActiveExchange::new()),
        }
    }

    /// Identifier of this exchange.
    #[must_use]
    pub fn id(&self) -> ExchangeId { self.id }

    /// Returns `true` once the response has been completed.
    #[must_use]
    pub fn is_completed(&self) -> bool { self.completed }

    /// Mutable access to the underlying sink.
    pub fn sink_mut(&mut self) -> &mut S { &mut self.sink }

    /// Complete the response. Later calls do nothing.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.sink.complete();
        self._active = None;
        debug!("exchange completed: id={}", self.id);
    }

    /// Answer with `status` and no body, then complete.
    ///
    /// Ignored once the exchange has completed. If body bytes were already
    /// written the status can no longer change; the response is just ended.
    pub fn error(&mut self, status: u16) {
        if self.completed {
            debug!("exchange already completed, ignoring error: id={}, status={status}", self.id);
            return;
        }
        self.sink.set_status(status);
        self.complete();
    }

    /// Log `error`, count it, and answer with its status.
    pub fn fail(&mut self, error: &TransportError) {
        warn!("exchange failed: id={}, kind={}, error={error}", self.id, error.kind());
        metrics::inc_errors(error.kind());
        self.error(error.status());
    }

    /// Wait for the sink's error notification that the client has gone.
    pub async fn disconnected(&mut self) -> io::Error { closed(&mut self.sink).await }

    /// Drive `writer` from write-possible notifications until the reply
    /// array is flushed, then complete the exchange.
    ///
    /// # Errors
    ///
    /// Returns the first notified or write error. The exchange is left
    /// uncompleted so the caller can answer with an error.
    pub async fn write(&mut self, mut writer: ReplyWriter) -> Result<(), TransportError> {
        loop {
            write_possible(&mut self.sink).await?;
            if writer.on_write_possible(&mut self.sink)? == WriteProgress::Complete {
                debug!(
                    "reply written: id={}, bytes={}",
                    self.id,
                    writer.bytes_written()
                );
                self.complete();
                return Ok(());
            }
        }
    }
}

impl<S: ResponseSink> Drop for Exchange<S> {
    fn drop(&mut self) {
        if !self.completed {
            warn!("exchange dropped before completion: id={}", self.id);
            self.error(INTERNAL_SERVER_ERROR);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        batch::Delivery,
        io::{ResponsePart, response_channel},
        message::Message,
    };

    #[tokio::test]
    async fn error_sets_status_and_completes_once() {
        let (sink, rx) = response_channel(64);
        let mut exchange = Exchange::new(sink);
        exchange.error(500);
        exchange.error(503);
        exchange.complete();
        assert!(exchange.is_completed());
        drop(exchange);

        let response = rx.collect().await;
        assert_eq!(response.status, Some(500));
        assert_eq!(response.content_type, Some(JSON_CONTENT_TYPE));
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn write_flushes_the_array_and_completes() {
        let (sink, rx) = response_channel(64);
        let mut exchange = Exchange::new(sink);
        let delivery = Delivery {
            replies: vec![Some(Message::builder("/meta/connect").successful(true).build())],
            ..Delivery::default()
        };
        exchange
            .write(ReplyWriter::new(delivery, Duration::ZERO))
            .await
            .expect("write succeeds");
        assert!(exchange.is_completed());
        drop(exchange);

        let response = rx.collect().await;
        assert_eq!(response.status, Some(200));
        assert_eq!(
            response.text(),
            r#"[{"channel":"/meta/connect","successful":true}]"#
        );
    }

    #[tokio::test]
    async fn write_to_a_vanished_client_fails() {
        let (sink, rx) = response_channel(64);
        drop(rx);
        let mut exchange = Exchange::new(sink);
        let err = exchange
            .write(ReplyWriter::new(Delivery::default(), Duration::ZERO))
            .await
            .expect_err("receiver is gone");
        assert!(err.is_io());
        assert!(!exchange.is_completed());
    }

    #[tokio::test]
    async fn dropping_an_open_exchange_answers_500() {
        let (sink, mut rx) = response_channel(64);
        drop(Exchange::new(sink));
        assert_eq!(
            rx.recv().await,
            Some(ResponsePart::Head {
                status: 500,
                content_type: Some(JSON_CONTENT_TYPE),
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn ids_are_unique() {
        let ids: Vec<_> = (0..4).map(|_| ExchangeId::next()).collect();
        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(distinct.len(), ids.len());
    }
}
