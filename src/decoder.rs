//! Inbound body decoding.
//!
//! A [`BodyReader`] is driven by data-available notifications. Each
//! notification drains whatever the [`BodySource`] can deliver without
//! waiting and feeds it to a [`BodyDecoder`]; once the body is finished the
//! decoder yields the request text.
//!
//! Two strategies exist. UTF-8 bodies are decoded as they arrive. Any other
//! charset is accumulated in a [`GrowableBuffer`] and decoded once at the
//! end, so multi-byte units split across reads are never misread.

mod utf8;

use log::debug;
pub use utf8::Utf8Accumulator;

use crate::{
    buffer::{GrowableBuffer, INITIAL_CAPACITY, MessageTooLarge},
    charset::Charset,
    config::TransportConfig,
    error::TransportError,
    io::{BodySource, data_available},
};

/// Decoding strategy for one request body.
#[derive(Debug)]
pub enum BodyDecoder {
    /// Decode UTF-8 fragments as they arrive.
    Streaming {
        /// Text decoded so far.
        text: Utf8Accumulator,
        /// Largest number of body bytes accepted.
        limit: usize,
    },
    /// Buffer raw bytes and decode them once with `charset`.
    Buffered {
        /// Accumulated body bytes.
        buffer: GrowableBuffer,
        /// Charset applied at end of body.
        charset: Charset,
    },
}

impl BodyDecoder {
    /// Pick the strategy for `charset`.
    ///
    /// `body_limit` caps the body size under either strategy.
    #[must_use]
    pub fn for_charset(charset: Charset, body_limit: usize) -> Self {
        if charset.is_self_synchronizing() {
            Self::Streaming {
                text: Utf8Accumulator::with_capacity(INITIAL_CAPACITY.min(body_limit)),
                limit: body_limit,
            }
        } else {
            Self::Buffered {
                buffer: GrowableBuffer::with_limit(INITIAL_CAPACITY, body_limit),
                charset,
            }
        }
    }

    /// Returns `true` for the incremental UTF-8 strategy.
    #[must_use]
    pub fn is_streaming(&self) -> bool { matches!(self, Self::Streaming { .. }) }

    /// Feed one fragment of the body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] for invalid UTF-8 on the streaming
    /// path, or [`TransportError::MessageTooLarge`] when the body outgrows
    /// its limit.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Streaming { text, limit } => {
                let required = text.received().saturating_add(bytes.len());
                if required > *limit {
                    return Err(MessageTooLarge {
                        required,
                        limit: *limit,
                    }
                    .into());
                }
                text.append(bytes)?;
            }
            Self::Buffered { buffer, .. } => buffer.append(bytes)?,
        }
        Ok(())
    }

    /// Produce the decoded body text.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if a UTF-8 body ended mid-sequence.
    pub fn finish(self) -> Result<String, TransportError> {
        match self {
            Self::Streaming { text, .. } => Ok(text.finish()?),
            Self::Buffered { buffer, charset } => Ok(buffer.decode(charset)),
        }
    }
}

/// Lifecycle of a [`BodyReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// More body bytes are expected.
    Reading,
    /// The whole body has been consumed.
    Finished,
    /// Reading failed; the exchange must be answered with an error.
    Errored,
}

/// Result of handling one data-available notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadProgress {
    /// No more data right now; wait for the next notification.
    Pending,
    /// End of body reached; call [`BodyReader::finish`].
    Finished,
}

/// Readiness-driven reader accumulating one request body.
#[derive(Debug)]
pub struct BodyReader {
    decoder: BodyDecoder,
    scratch: Vec<u8>,
    bytes_read: usize,
    state: ReadState,
}

impl BodyReader {
    /// Create a reader that reads at most `chunk_size` bytes per call.
    #[must_use]
    pub fn new(decoder: BodyDecoder, chunk_size: usize) -> Self {
        Self {
            decoder,
            scratch: vec![0; chunk_size.max(1)],
            bytes_read: 0,
            state: ReadState::Reading,
        }
    }

    /// Create a reader for `charset` sized by `config`.
    #[must_use]
    pub fn for_config(charset: Charset, config: &TransportConfig) -> Self {
        Self::new(
            BodyDecoder::for_charset(charset, config.body_limit()),
            config.chunk_size(),
        )
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReadState { self.state }

    /// Total body bytes consumed so far.
    #[must_use]
    pub fn bytes_read(&self) -> usize { self.bytes_read }

    /// Drain everything `body` can deliver without waiting.
    ///
    /// Readiness is checked before end of body on every iteration because
    /// the readiness check may itself pull data from the transport.
    ///
    /// # Errors
    ///
    /// Returns the read or decode failure; the reader is then `Errored`.
    pub fn on_data_available<B>(&mut self, body: &mut B) -> Result<ReadProgress, TransportError>
    where
        B: BodySource + ?Sized,
    {
        match self.state {
            ReadState::Reading => {}
            ReadState::Finished => return Ok(ReadProgress::Finished),
            ReadState::Errored => {
                return Err(TransportError::Io(std::io::Error::other(
                    "body reader already failed",
                )));
            }
        }
        debug!("Asynchronous read start: read_so_far={}", self.bytes_read);
        let result = self.drain(body);
        if result.is_err() {
            self.state = ReadState::Errored;
        }
        result
    }

    fn drain<B>(&mut self, body: &mut B) -> Result<ReadProgress, TransportError>
    where
        B: BodySource + ?Sized,
    {
        loop {
            if !body.is_ready() {
                debug!("Asynchronous read pending: read_so_far={}", self.bytes_read);
                return Ok(ReadProgress::Pending);
            }
            if body.is_finished() {
                self.state = ReadState::Finished;
                return Ok(ReadProgress::Finished);
            }
            let read = body.read(&mut self.scratch)?;
            debug!("Asynchronous read {read} bytes");
            if read > 0 {
                self.decoder.append(&self.scratch[..read])?;
                self.bytes_read += read;
            }
        }
    }

    /// Decode the complete body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] for a truncated UTF-8 body.
    pub fn finish(self) -> Result<String, TransportError> {
        let text = self.decoder.finish()?;
        debug!("Asynchronous read end: bytes={}", self.bytes_read);
        Ok(text)
    }

    /// Drive the reader from data-available notifications until the body is
    /// complete, then decode it.
    ///
    /// No timeout applies: a slow client only parks this future.
    ///
    /// # Errors
    ///
    /// Returns the first notified I/O error, read error, or decode error.
    pub async fn read_to_end<B>(mut self, body: &mut B) -> Result<String, TransportError>
    where
        B: BodySource + ?Sized,
    {
        loop {
            if let Err(error) = data_available(body).await {
                self.state = ReadState::Errored;
                return Err(error.into());
            }
            if self.on_data_available(body)? == ReadProgress::Finished {
                return self.finish();
            }
        }
    }
}
