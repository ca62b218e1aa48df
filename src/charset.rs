//! Request body encodings understood by the transport.
//!
//! UTF-8 is self-synchronizing and is decoded incrementally as bytes arrive.
//! Every other encoding is buffered and decoded once, at end of body, so a
//! multi-byte unit is never split across read boundaries.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Encoding assumed when a request does not declare one.
pub const DEFAULT_CHARSET: Charset = Charset::Utf8;

/// Errors raised while decoding a request body.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte sequence that can never form valid UTF-8.
    #[error("invalid UTF-8 sequence at byte {offset}")]
    InvalidUtf8 {
        /// Offset of the first offending byte from the start of the body.
        offset: usize,
    },
    /// The body ended in the middle of a multi-byte UTF-8 sequence.
    #[error("body ended inside a {missing} byte incomplete UTF-8 sequence")]
    IncompleteUtf8 {
        /// Continuation bytes still expected when the body ended.
        missing: usize,
    },
}

/// A request encoding.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Charset {
    /// `UTF-8`.
    Utf8,
    /// `ISO-8859-1`; every byte maps to the code point of the same value.
    Iso8859_1,
    /// `US-ASCII`; bytes above `0x7F` decode to U+FFFD.
    UsAscii,
    /// `UTF-16BE`.
    Utf16Be,
    /// `UTF-16LE`.
    Utf16Le,
    /// `UTF-16`, byte order taken from a leading BOM, big-endian otherwise.
    Utf16,
}

impl Charset {
    /// Canonical name, as it would appear in a `charset` parameter.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Iso8859_1 => "ISO-8859-1",
            Self::UsAscii => "US-ASCII",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16 => "UTF-16",
        }
    }

    /// Returns `true` if fragments can be decoded independently of each
    /// other.
    #[must_use]
    pub fn is_self_synchronizing(self) -> bool { matches!(self, Self::Utf8) }

    /// Decode `bytes` in one shot.
    ///
    /// Malformed input is replaced with U+FFFD rather than rejected.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Iso8859_1 => bytes.iter().copied().map(char::from).collect(),
            Self::UsAscii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Self::Utf16 => match bytes {
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
                _ => decode_utf16(bytes, u16::from_be_bytes),
            },
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let dangling = !chunks.remainder().is_empty();
    let units = chunks.map(|pair| unit([pair[0], pair[1]]));
    let mut text: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if dangling {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Returned when a charset label is not recognised.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported charset: {0}")]
pub struct UnsupportedCharset(pub String);

impl FromStr for Charset {
    type Err = UnsupportedCharset;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let trimmed = label.trim().trim_matches('"');
        let charset = match trimmed.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Self::Utf8,
            "iso-8859-1" | "iso8859-1" | "iso_8859_1" | "latin1" | "l1" => Self::Iso8859_1,
            "us-ascii" | "ascii" => Self::UsAscii,
            "utf-16be" => Self::Utf16Be,
            "utf-16le" => Self::Utf16Le,
            "utf-16" | "utf16" => Self::Utf16,
            _ => return Err(UnsupportedCharset(trimmed.to_owned())),
        };
        Ok(charset)
    }
}
