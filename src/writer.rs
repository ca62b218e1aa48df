//! Resumable writer for a poll response.
//!
//! A response body is a single JSON array: the delivered messages in wire
//! order followed by the non-null replies in request order. [`ReplyWriter`]
//! emits it one element per flush and returns as soon as the sink reports
//! that it is not ready, keeping its cursors so the next write-possible
//! notification resumes at the next unwritten element. Nothing is
//! serialized or flushed twice.
//!
//! Once the delivered messages are exhausted, and before any reply is
//! written, the session's interval timeout is armed (at most once) when the
//! response was asked to start it. Arming does not wait for the replies, so
//! a slow reply flush cannot keep an idle session out of the sweeper.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use log::debug;

use crate::{
    batch::{Delivery, Replies},
    error::TransportError,
    io::ResponseSink,
    message::Message,
    metrics::{self, Element},
    session::SessionHandle,
};

const INITIAL_BUFFER: usize = 512;

/// Outcome of one write-possible notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteProgress {
    /// The sink stalled; call again on the next notification.
    Pending,
    /// The whole array has been flushed; the exchange can complete.
    Complete,
}

/// Streams `messages` then `replies` as one JSON array across any number of
/// write-possible notifications.
#[derive(Debug)]
pub struct ReplyWriter {
    session: Option<SessionHandle>,
    start_interval: bool,
    interval: Duration,
    messages: Vec<Message>,
    replies: Replies,
    message_index: usize,
    reply_index: usize,
    opened: bool,
    closed: bool,
    needs_comma: bool,
    interval_checked: bool,
    buffer: BytesMut,
    bytes_written: usize,
}

impl ReplyWriter {
    /// Create a writer for `delivery`, arming `interval` on its session when
    /// requested.
    #[must_use]
    pub fn new(delivery: Delivery, interval: Duration) -> Self {
        let Delivery {
            session,
            start_interval,
            messages,
            replies,
        } = delivery;
        Self {
            session,
            start_interval,
            interval,
            messages,
            replies,
            message_index: 0,
            reply_index: 0,
            opened: false,
            closed: false,
            needs_comma: false,
            interval_checked: false,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER),
            bytes_written: 0,
        }
    }

    /// Index of the next message to write.
    #[must_use]
    pub fn message_index(&self) -> usize { self.message_index }

    /// Index of the next reply slot to examine.
    #[must_use]
    pub fn reply_index(&self) -> usize { self.reply_index }

    /// Bytes handed to the sink so far.
    #[must_use]
    pub fn bytes_written(&self) -> usize { self.bytes_written }

    /// Returns `true` once the closing bracket has been flushed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }

    /// Write as much as the sink accepts without stalling.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the sink rejects a write. Bytes
    /// already flushed stay flushed.
    pub fn on_write_possible<S>(&mut self, sink: &mut S) -> Result<WriteProgress, TransportError>
    where
        S: ResponseSink + ?Sized,
    {
        if self.closed {
            return Ok(WriteProgress::Complete);
        }
        if !self.opened {
            self.opened = true;
            self.buffer.put_u8(b'[');
        }

        match self.write_messages(sink) {
            Ok(WriteProgress::Pending) => {
                if self.message_index == self.messages.len() {
                    self.start_interval_once();
                }
                return Ok(WriteProgress::Pending);
            }
            Ok(WriteProgress::Complete) => self.start_interval_once(),
            Err(error) => {
                // Still arm the interval so a failing client can be swept.
                self.start_interval_once();
                return Err(error);
            }
        }

        self.write_replies(sink)
    }

    fn write_messages<S>(&mut self, sink: &mut S) -> Result<WriteProgress, TransportError>
    where
        S: ResponseSink + ?Sized,
    {
        debug!(
            "Messages to write for session {}: {}",
            self.session_label(),
            self.messages.len() - self.message_index
        );
        while let Some(message) = self.messages.get(self.message_index) {
            if self.needs_comma {
                self.buffer.put_u8(b',');
            }
            self.buffer.extend_from_slice(message.json().as_bytes());
            self.message_index += 1;
            self.needs_comma = true;
            self.flush(sink)?;
            metrics::inc_elements(Element::Message);
            if !sink.is_ready() {
                return Ok(WriteProgress::Pending);
            }
        }
        Ok(WriteProgress::Complete)
    }

    fn write_replies<S>(&mut self, sink: &mut S) -> Result<WriteProgress, TransportError>
    where
        S: ResponseSink + ?Sized,
    {
        debug!(
            "Replies to write for session {}: {}",
            self.session_label(),
            self.replies.len() - self.reply_index
        );
        while self.reply_index < self.replies.len() {
            let slot = self.reply_index;
            self.reply_index += 1;
            let Some(reply) = &self.replies[slot] else {
                continue;
            };
            if self.needs_comma {
                self.buffer.put_u8(b',');
            }
            self.needs_comma = true;
            self.buffer.extend_from_slice(reply.json().as_bytes());
            if self.reply_index == self.replies.len() {
                self.buffer.put_u8(b']');
                self.closed = true;
            }
            self.flush(sink)?;
            metrics::inc_elements(Element::Reply);
            if !sink.is_ready() {
                return Ok(WriteProgress::Pending);
            }
        }

        if !self.closed {
            self.buffer.put_u8(b']');
            self.closed = true;
            self.flush(sink)?;
            if !sink.is_ready() {
                return Ok(WriteProgress::Pending);
            }
        }
        Ok(WriteProgress::Complete)
    }

    fn flush<S>(&mut self, sink: &mut S) -> Result<(), TransportError>
    where
        S: ResponseSink + ?Sized,
    {
        let chunk = self.buffer.split().freeze();
        self.bytes_written += chunk.len();
        sink.write(chunk)?;
        Ok(())
    }

    fn start_interval_once(&mut self) {
        if self.interval_checked {
            return;
        }
        self.interval_checked = true;
        if !self.start_interval {
            return;
        }
        if let Some(session) = &self.session
            && session.is_connected()
        {
            session.start_interval_timeout(self.interval);
        }
    }

    fn session_label(&self) -> String {
        self.session
            .as_ref()
            .map_or_else(|| "none".to_owned(), |session| session.id().to_string())
    }
}
