//! Test doubles for driving `wirepoll` exchanges without a network.
//!
//! [`ScriptedBody`] and [`ScriptedSink`] replay readiness scripts so tests
//! can pin down exactly when the transport pauses and resumes, and
//! [`RecordingSession`] records every interval-timeout arming.
//!
//! ```rust
//! use wirepoll::{ReplyWriter, Delivery, WriteProgress};
//! use wirepoll_testing::ScriptedSink;
//!
//! let (mut sink, probe) = ScriptedSink::new();
//! let mut writer = ReplyWriter::new(Delivery::default(), std::time::Duration::ZERO);
//! assert_eq!(writer.on_write_possible(&mut sink).unwrap(), WriteProgress::Complete);
//! assert_eq!(probe.text(), "[]");
//! ```

pub mod body;
pub mod logging;
pub mod session;
pub mod sink;

pub use body::{BodyCall, BodyStep, ScriptedBody};
pub use logging::{LoggerHandle, logger};
pub use session::RecordingSession;
pub use sink::{ScriptedSink, SinkProbe};

/// Result alias for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
