//! The long-polling JSON transport.
//!
//! [`LongPollTransport`] serves one exchange per accepted request: it reads
//! and decodes the body without blocking, runs the [`BatchProcessor`] with
//! the [`DispatchContext`] installed, then either writes the reply array
//! straight away or suspends the exchange on a [`LongPollScheduler`].
//!
//! Every failure before the first response byte (unsupported charset, read
//! error, oversized or undecodable body, malformed batch, misaligned replies)
//! answers the exchange with a bare error status.

mod spawn;

use std::sync::Arc;

use log::debug;
use tokio_util::task::TaskTracker;

use crate::{
    batch::{BatchProcessor, Dispatch},
    config::{ConfigError, OptionSource, TransportConfig},
    context::{self, DispatchContext},
    decoder::BodyReader,
    error::TransportError,
    exchange::Exchange,
    io::{BodySource, ResponseSink},
    request::RequestHead,
    scheduler::{LongPollScheduler, Wakeup},
    writer::ReplyWriter,
};

/// Transport name, used for logging and dispatch context.
pub const NAME: &str = "long-polling";
/// Prefix under which transport options are looked up.
pub const PREFIX: &str = "long-polling.json";

/// How an exchange ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The reply array was written immediately.
    Replied,
    /// The exchange was suspended and later resumed.
    Resumed(Wakeup),
    /// The exchange was answered with an error status; carries the error kind.
    Failed(&'static str),
}

/// Long-polling transport carrying JSON message batches.
pub struct LongPollTransport<P> {
    config: TransportConfig,
    processor: Arc<P>,
    tracker: TaskTracker,
}

impl<P> Clone for LongPollTransport<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            processor: Arc::clone(&self.processor),
            tracker: self.tracker.clone(),
        }
    }
}

impl<P> std::fmt::Debug for LongPollTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongPollTransport")
            .field("config", &self.config)
            .field("tasks", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl<P: BatchProcessor> LongPollTransport<P> {
    /// Create a transport with the default configuration.
    pub fn new(processor: P) -> Self {
        Self {
            config: TransportConfig::default(),
            processor: Arc::new(processor),
            tracker: TaskTracker::new(),
        }
    }

    /// Create a transport configured from `source` under [`PREFIX`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an option value is malformed.
    pub fn from_options(processor: P, source: &impl OptionSource) -> Result<Self, ConfigError> {
        Ok(Self::new(processor).with_config(TransportConfig::from_options(PREFIX, source)?))
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport name.
    #[must_use]
    pub fn name(&self) -> &'static str { NAME }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TransportConfig { &self.config }

    /// Returns `true` if this transport serves `request`. Only `POST` is
    /// accepted.
    #[must_use]
    pub fn accept(&self, request: &RequestHead) -> bool { request.method().eq_ignore_ascii_case("POST") }

    /// Serve one exchange to completion.
    ///
    /// The caller is expected to have checked [`accept`](Self::accept).
    pub async fn handle<B, S>(&self, head: RequestHead, body: &mut B, sink: S) -> Outcome
    where
        B: BodySource + ?Sized,
        S: ResponseSink,
    {
        let mut exchange = Exchange::new(sink);
        let head = Arc::new(head);
        debug!(
            "exchange started: id={}, path={}, peer_addr={:?}",
            exchange.id(),
            head.path(),
            head.peer_addr()
        );

        let dispatch = match self.read_and_dispatch(&head, body).await {
            Ok(dispatch) => dispatch,
            Err(error) => {
                exchange.fail(&error);
                return Outcome::Failed(error.kind());
            }
        };

        match dispatch {
            Dispatch::Reply(delivery) => {
                let writer = ReplyWriter::new(delivery, self.config.interval_duration());
                match exchange.write(writer).await {
                    Ok(()) => Outcome::Replied,
                    Err(error) => {
                        exchange.fail(&error);
                        Outcome::Failed(error.kind())
                    }
                }
            }
            Dispatch::Suspend(suspension) => {
                let scheduler = LongPollScheduler::new(exchange, suspension, &self.config);
                match scheduler.run().await {
                    Ok(wakeup) => Outcome::Resumed(wakeup),
                    Err(error) => Outcome::Failed(error.kind()),
                }
            }
        }
    }

    async fn read_and_dispatch<B>(
        &self,
        head: &Arc<RequestHead>,
        body: &mut B,
    ) -> Result<Dispatch, TransportError>
    where
        B: BodySource + ?Sized,
    {
        let charset = head.charset()?;
        let text = BodyReader::for_config(charset, &self.config)
            .read_to_end(body)
            .await?;
        let ctx = DispatchContext::new(NAME, self.config, Arc::clone(head));
        context::scope(ctx.clone(), || self.dispatch(&ctx, &text))
    }

    fn dispatch(&self, ctx: &DispatchContext, text: &str) -> Result<Dispatch, TransportError> {
        let messages = self.processor.parse(text)?;
        let expected = messages.len();
        let dispatch = self.processor.process(ctx, messages);
        let actual = dispatch.reply_slots();
        if actual != expected {
            return Err(TransportError::ReplyMisaligned { expected, actual });
        }
        Ok(dispatch)
    }
}
