//! Append-only byte accumulator used when the request body must be held in
//! full before it can be decoded.
//!
//! Capacity doubles until the pending append fits. Growth past the
//! configured limit fails with [`MessageTooLarge`], which terminates the
//! owning exchange.

use thiserror::Error;

use crate::charset::Charset;

/// Capacity a fresh buffer starts with.
pub const INITIAL_CAPACITY: usize = 512;

/// Largest capacity a buffer may reach by default.
pub const MAX_CAPACITY: usize = isize::MAX.unsigned_abs();

/// Raised when doubling the buffer would overflow its limit.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("message too large: {required} bytes exceed the {limit} byte limit")]
pub struct MessageTooLarge {
    /// Total bytes the buffer would have to hold.
    pub required: usize,
    /// Largest capacity the buffer is allowed to reach.
    pub limit: usize,
}

/// Growable byte buffer with capacity-doubling growth.
///
/// Capacity is tracked explicitly so that it is always the initial capacity
/// times a power of two, and never shrinks.
#[derive(Debug)]
pub struct GrowableBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    limit: usize,
}

impl Default for GrowableBuffer {
    fn default() -> Self { Self::new() }
}

impl GrowableBuffer {
    /// Create a buffer with [`INITIAL_CAPACITY`] and the default limit.
    #[must_use]
    pub fn new() -> Self { Self::with_limit(INITIAL_CAPACITY, MAX_CAPACITY) }

    /// Create a buffer with an explicit starting capacity and growth limit.
    ///
    /// A zero `initial` capacity is raised to one so that doubling can make
    /// progress. The starting capacity never exceeds `limit`.
    #[must_use]
    pub fn with_limit(initial: usize, limit: usize) -> Self {
        let capacity = initial.min(limit).max(1);
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            limit,
        }
    }

    /// Append `data`, doubling capacity as often as needed.
    ///
    /// # Errors
    ///
    /// Returns [`MessageTooLarge`] when the required capacity cannot be
    /// reached by doubling without exceeding the limit. The buffer is left
    /// untouched in that case.
    pub fn append(&mut self, data: &[u8]) -> Result<(), MessageTooLarge> {
        let too_large = |required| MessageTooLarge {
            required,
            limit: self.limit,
        };
        let required = self
            .bytes
            .len()
            .checked_add(data.len())
            .ok_or_else(|| too_large(usize::MAX))?;
        if required > self.limit {
            return Err(too_large(required));
        }

        let mut capacity = self.capacity;
        while capacity < required {
            capacity = capacity
                .checked_mul(2)
                .filter(|grown| *grown <= self.limit)
                .ok_or_else(|| too_large(required))?;
        }

        if capacity != self.capacity {
            self.bytes.reserve_exact(capacity - self.bytes.len());
            self.capacity = capacity;
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Current logical capacity.
    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }

    /// Number of bytes accumulated so far.
    #[must_use]
    pub fn len(&self) -> usize { self.bytes.len() }

    /// Returns `true` if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Decode the accumulated bytes in one shot, consuming the buffer.
    #[must_use]
    pub fn decode(self, charset: Charset) -> String { charset.decode(&self.bytes) }
}
