//! Incremental UTF-8 text accumulator.

use crate::charset::DecodeError;

/// Builds a `String` from UTF-8 fragments split at arbitrary byte
/// boundaries.
///
/// A multi-byte sequence cut by a fragment boundary is held back (at most
/// three bytes) until the next fragment completes it. Invalid sequences are
/// rejected as soon as they are seen.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    text: String,
    partial: [u8; 4],
    partial_len: usize,
    consumed: usize,
}

impl Utf8Accumulator {
    /// Create an accumulator with room for `capacity` bytes of text.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            text: String::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Decode and append one fragment.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] for bytes that can never form
    /// valid UTF-8.
    pub fn append(&mut self, mut bytes: &[u8]) -> Result<(), DecodeError> {
        if self.partial_len > 0 {
            let width = sequence_width(self.partial[0]);
            let take = (width - self.partial_len).min(bytes.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&bytes[..take]);
            self.partial_len += take;
            bytes = &bytes[take..];
            if self.partial_len < width {
                return Ok(());
            }
            let start = self.consumed;
            let sequence = std::str::from_utf8(&self.partial[..width])
                .map_err(|_| DecodeError::InvalidUtf8 { offset: start })?;
            self.text.push_str(sequence);
            self.consumed += width;
            self.partial_len = 0;
        }

        match std::str::from_utf8(bytes) {
            Ok(text) => {
                self.text.push_str(text);
                self.consumed += bytes.len();
            }
            Err(error) => {
                let valid = error.valid_up_to();
                // The prefix was just validated by `from_utf8`.
                self.text
                    .push_str(std::str::from_utf8(&bytes[..valid]).unwrap_or_default());
                self.consumed += valid;
                if error.error_len().is_some() {
                    return Err(DecodeError::InvalidUtf8 {
                        offset: self.consumed,
                    });
                }
                let tail = &bytes[valid..];
                self.partial[..tail.len()].copy_from_slice(tail);
                self.partial_len = tail.len();
            }
        }
        Ok(())
    }

    /// Text decoded so far.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.text }

    /// Bytes taken in so far, including a held-back partial sequence.
    #[must_use]
    pub fn received(&self) -> usize { self.consumed + self.partial_len }

    /// Finish decoding, returning the accumulated text.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::IncompleteUtf8`] if the input ended inside a
    /// multi-byte sequence.
    pub fn finish(self) -> Result<String, DecodeError> {
        if self.partial_len > 0 {
            return Err(DecodeError::IncompleteUtf8 {
                missing: sequence_width(self.partial[0]) - self.partial_len,
            });
        }
        Ok(self.text)
    }
}

/// Length of the sequence introduced by `lead`.
///
/// Only called on bytes `from_utf8` accepted as the start of an incomplete
/// sequence.
fn sequence_width(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}
