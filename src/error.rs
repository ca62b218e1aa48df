//! Canonical error and result types for the crate.
//!
//! Every failure an exchange can suffer collapses into [`TransportError`].
//! The transport converts each of them into a best-effort HTTP error
//! response carrying [`INTERNAL_SERVER_ERROR`]; nothing at this layer is
//! retried.

use std::io;

use thiserror::Error;

use crate::{
    batch::ParseError,
    buffer::MessageTooLarge,
    charset::{DecodeError, UnsupportedCharset},
};

/// Status written for any decode, parse or I/O failure.
pub const INTERNAL_SERVER_ERROR: u16 = 500;

/// Top-level error type exposed by `wirepoll`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The decoded body was not a valid message batch.
    #[error("invalid message batch: {0}")]
    Parse(#[from] ParseError),
    /// The request body outgrew the decode buffer.
    #[error(transparent)]
    MessageTooLarge(#[from] MessageTooLarge),
    /// The request body could not be decoded with its declared charset.
    #[error("body decoding failed: {0}")]
    Decode(#[from] DecodeError),
    /// The request declared a charset this transport cannot decode.
    #[error(transparent)]
    UnsupportedCharset(#[from] UnsupportedCharset),
    /// The processor returned a reply batch that does not line up with the
    /// request batch.
    #[error("reply batch misaligned: expected {expected} slots, got {actual}")]
    ReplyMisaligned {
        /// Number of messages in the request batch.
        expected: usize,
        /// Number of reply slots produced.
        actual: usize,
    },
    /// A read or write error reported by the underlying exchange.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// HTTP status used when answering an exchange that failed with this error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Parse(_)
            | Self::MessageTooLarge(_)
            | Self::Decode(_)
            | Self::UnsupportedCharset(_)
            | Self::ReplyMisaligned { .. }
            | Self::Io(_) => INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label identifying the error category in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::MessageTooLarge(_) => "message_too_large",
            Self::Decode(_) => "decode",
            Self::UnsupportedCharset(_) => "unsupported_charset",
            Self::ReplyMisaligned { .. } => "reply_misaligned",
            Self::Io(_) => "io",
        }
    }

    /// Returns true if the failure came from the underlying exchange I/O.
    #[must_use]
    pub fn is_io(&self) -> bool { matches!(self, Self::Io(_)) }
}

/// Canonical result alias used by `wirepoll` public APIs.
pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::io(TransportError::Io(io::Error::other("reset")), "io")]
    #[case::charset(TransportError::UnsupportedCharset(UnsupportedCharset("EBCDIC".into())), "unsupported_charset")]
    #[case::misaligned(TransportError::ReplyMisaligned { expected: 2, actual: 1 }, "reply_misaligned")]
    #[case::too_large(
        TransportError::MessageTooLarge(MessageTooLarge { required: 9, limit: 8 }),
        "message_too_large"
    )]
    fn every_error_maps_to_internal_server_error(
        #[case] error: TransportError,
        #[case] kind: &str,
    ) {
        assert_eq!(error.status(), INTERNAL_SERVER_ERROR);
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn misaligned_display_names_both_lengths() {
        let error = TransportError::ReplyMisaligned {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            error.to_string(),
            "reply batch misaligned: expected 3 slots, got 2"
        );
    }
}
