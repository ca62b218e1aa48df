#![doc(html_root_url = "https://docs.rs/wirepoll/latest")]
//! Public API for the `wirepoll` library.
//!
//! This crate provides a readiness-driven long-polling transport for JSON
//! message batches: non-blocking body decoding, resumable reply writing,
//! suspended exchanges woken by session activity or a timeout, and a
//! scoped dispatch context for processing code.

pub mod batch;
pub mod buffer;
pub mod charset;
pub mod config;
pub mod context;
pub mod decoder;
pub mod error;
pub mod exchange;
pub mod io;
pub mod message;
pub mod metrics;
pub mod request;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod writer;

pub use batch::{BatchProcessor, Delivery, Dispatch, ParseError, Replies, Suspension, parse_batch};
pub use buffer::{GrowableBuffer, MessageTooLarge};
pub use charset::{Charset, DecodeError, UnsupportedCharset};
pub use config::{ConfigError, OptionSource, TransportConfig};
pub use context::DispatchContext;
pub use decoder::{BodyDecoder, BodyReader, ReadProgress, ReadState};
pub use error::{INTERNAL_SERVER_ERROR, Result, TransportError};
pub use exchange::{Exchange, ExchangeId, JSON_CONTENT_TYPE, active_exchange_count};
pub use io::{BodySource, ResponsePart, ResponseSink};
pub use message::{Message, MessageBuilder};
pub use metrics::{ELEMENTS_WRITTEN, ERRORS_TOTAL, EXCHANGES_ACTIVE, Element};
pub use request::RequestHead;
pub use scheduler::{LongPollScheduler, SchedulerHandle, Wakeup};
pub use session::{ClientSession, Session, SessionHandle, SessionId};
pub use transport::{LongPollTransport, Outcome};
pub use writer::{ReplyWriter, WriteProgress};
