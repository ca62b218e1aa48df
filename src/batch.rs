//! Boundary between the transport and the message processor.
//!
//! The transport hands decoded body text to a [`BatchProcessor`], which
//! parses it into a message batch and decides whether the exchange is
//! answered straight away ([`Dispatch::Reply`]) or held open as a long poll
//! ([`Dispatch::Suspend`]). Either way the reply batch must be index-aligned
//! with the request batch.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::{context::DispatchContext, message::Message, session::SessionHandle};

/// Reply slots aligned one-to-one with the request batch.
///
/// `None` means the request message at that index gets no reply.
pub type Replies = Vec<Option<Message>>;

/// Errors raised when body text is not a message batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The text is not well-formed JSON.
    #[error("malformed JSON at line {line}, column {column}: {reason}")]
    Syntax {
        /// One-based line of the failure.
        line: usize,
        /// One-based column of the failure.
        column: usize,
        /// Parser diagnostic.
        reason: String,
    },
    /// The JSON is well-formed but is neither a message object nor an array
    /// of message objects.
    #[error("expected a message object or an array of message objects")]
    NotABatch,
}

impl From<serde_json::Error> for ParseError {
    fn from(error: serde_json::Error) -> Self {
        Self::Syntax {
            line: error.line(),
            column: error.column(),
            reason: error.to_string(),
        }
    }
}

/// Parse body text into a message batch.
///
/// A bare object is accepted as a batch of one.
///
/// # Errors
///
/// Returns [`ParseError`] if the text is not JSON, or is JSON of the wrong
/// shape.
pub fn parse_batch(text: &str) -> Result<Vec<Message>, ParseError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => Ok(Message::from_fields(fields)),
                _ => Err(ParseError::NotABatch),
            })
            .collect(),
        Value::Object(fields) => Ok(vec![Message::from_fields(fields)]),
        _ => Err(ParseError::NotABatch),
    }
}

/// Messages and replies to write to an exchange right away.
#[derive(Debug, Default)]
pub struct Delivery {
    /// Session the exchange belongs to, absent for session-less requests.
    pub session: Option<SessionHandle>,
    /// Arm the session's interval timeout once `messages` are flushed.
    pub start_interval: bool,
    /// Messages delivered to the client, in wire order.
    pub messages: Vec<Message>,
    /// Replies aligned with the request batch.
    pub replies: Replies,
}

/// An exchange to hold open until messages arrive or the timeout elapses.
#[derive(Debug)]
pub struct Suspension {
    /// Session whose queue is flushed when the exchange resumes.
    pub session: SessionHandle,
    /// Replies aligned with the request batch, written after the queue.
    pub replies: Replies,
    /// Hold time; the transport's configured timeout when `None`.
    pub timeout: Option<Duration>,
}

/// Outcome of processing one request batch.
#[derive(Debug)]
pub enum Dispatch {
    /// Write the response now.
    Reply(Delivery),
    /// Suspend the exchange as a long poll.
    Suspend(Suspension),
}

impl Dispatch {
    /// Number of reply slots carried by this outcome.
    #[must_use]
    pub fn reply_slots(&self) -> usize {
        match self {
            Self::Reply(delivery) => delivery.replies.len(),
            Self::Suspend(suspension) => suspension.replies.len(),
        }
    }
}

/// Turns decoded body text into a dispatch decision.
///
/// `process` runs synchronously while the [`DispatchContext`] is also
/// reachable through [`crate::context::current`].
pub trait BatchProcessor: Send + Sync + 'static {
    /// Parse body text into a message batch.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for malformed input.
    fn parse(&self, text: &str) -> Result<Vec<Message>, ParseError> { parse_batch(text) }

    /// Process a parsed batch, returning replies aligned with `messages`.
    fn process(&self, ctx: &DispatchContext, messages: Vec<Message>) -> Dispatch;
}

impl<F> BatchProcessor for F
where
    F: Fn(&DispatchContext, Vec<Message>) -> Dispatch + Send + Sync + 'static,
{
    fn process(&self, ctx: &DispatchContext, messages: Vec<Message>) -> Dispatch {
        self(ctx, messages)
    }
}
