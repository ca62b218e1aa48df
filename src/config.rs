//! Transport configuration.
//!
//! [`TransportConfig`] carries the values the long-polling transport reads
//! per instance. Values can be set directly through the builder-style
//! setters or resolved from an external option store with
//! [`TransportConfig::from_options`], which walks the transport's dotted
//! option prefix from most to least specific.

use std::{collections::HashMap, time::Duration};

use thiserror::Error;

use crate::buffer::{INITIAL_CAPACITY, MAX_CAPACITY};

/// Option name of the long-poll hold time, in milliseconds.
pub const TIMEOUT_OPTION: &str = "timeout";
/// Option name of the session interval timeout, in milliseconds.
pub const INTERVAL_OPTION: &str = "interval";
/// Option name of the largest accepted request body, in bytes.
pub const MAX_BODY_SIZE_OPTION: &str = "maxBodySize";
/// Option name of the per-read scratch buffer size, in bytes.
pub const READ_CHUNK_SIZE_OPTION: &str = "readChunkSize";

/// Default long-poll hold time.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read access to an external option store.
pub trait OptionSource {
    /// Look up a fully qualified option name.
    fn option(&self, qualified_name: &str) -> Option<String>;
}

impl OptionSource for HashMap<String, String> {
    fn option(&self, qualified_name: &str) -> Option<String> { self.get(qualified_name).cloned() }
}

/// Errors raised while resolving configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An option was present but could not be parsed.
    #[error("invalid value {value:?} for option {name}")]
    InvalidValue {
        /// Qualified name the value was found under.
        name: String,
        /// The rejected value.
        value: String,
    },
    /// A size option was zero.
    #[error("option {0} must be greater than zero")]
    Zero(&'static str),
}

/// Per-instance transport settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    timeout: Duration,
    interval: Duration,
    max_body_size: usize,
    read_chunk_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: Duration::ZERO,
            max_body_size: MAX_CAPACITY,
            read_chunk_size: INITIAL_CAPACITY,
        }
    }
}

impl TransportConfig {
    /// Resolve settings from `source` under the dotted `prefix`.
    ///
    /// For option `timeout` and prefix `long-polling.json` the names
    /// `long-polling.json.timeout`, `long-polling.timeout` and `timeout` are
    /// tried in that order. Options that are absent keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a present value is malformed or a size is
    /// zero.
    pub fn from_options(prefix: &str, source: &impl OptionSource) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = lookup::<u64>(prefix, TIMEOUT_OPTION, source)? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = lookup::<u64>(prefix, INTERVAL_OPTION, source)? {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(size) = lookup::<usize>(prefix, MAX_BODY_SIZE_OPTION, source)? {
            config.max_body_size = non_zero(size, MAX_BODY_SIZE_OPTION)?;
        }
        if let Some(size) = lookup::<usize>(prefix, READ_CHUNK_SIZE_OPTION, source)? {
            config.read_chunk_size = non_zero(size, READ_CHUNK_SIZE_OPTION)?;
        }
        Ok(config)
    }

    /// Set how long a suspended exchange is held before it is answered.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the interval armed on the session after a poll response.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the largest body the decode buffer may grow to.
    #[must_use]
    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size.max(1);
        self
    }

    /// Set the scratch buffer size used by one read call.
    #[must_use]
    pub fn read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size.max(1);
        self
    }

    /// Long-poll hold time.
    #[must_use]
    pub fn timeout_duration(&self) -> Duration { self.timeout }

    /// Session interval timeout.
    #[must_use]
    pub fn interval_duration(&self) -> Duration { self.interval }

    /// Largest accepted body size.
    #[must_use]
    pub fn body_limit(&self) -> usize { self.max_body_size }

    /// Scratch buffer size for one read call.
    #[must_use]
    pub fn chunk_size(&self) -> usize { self.read_chunk_size }
}

/// Candidate qualified names for `name`, most specific first.
fn qualified_names(prefix: &str, name: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut scope = prefix.trim_matches('.');
    while !scope.is_empty() {
        names.push(format!("{scope}.{name}"));
        scope = scope.rsplit_once('.').map_or("", |(parent, _)| parent);
    }
    names.push(name.to_owned());
    names
}

fn lookup<T: std::str::FromStr>(
    prefix: &str,
    name: &str,
    source: &impl OptionSource,
) -> Result<Option<T>, ConfigError> {
    for qualified in qualified_names(prefix, name) {
        if let Some(value) = source.option(&qualified) {
            return value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    name: qualified,
                    value,
                });
        }
    }
    Ok(None)
}

fn non_zero(value: usize, name: &'static str) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(name))
    } else {
        Ok(value)
    }
}
