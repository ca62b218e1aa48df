//! Response sink with scripted readiness.

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};

use bytes::Bytes;
use wirepoll::ResponseSink;

#[derive(Debug)]
struct Record {
    status: u16,
    content_type: Option<&'static str>,
    chunks: Vec<Bytes>,
    completions: usize,
    ready_checks: usize,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: None,
            chunks: Vec::new(),
            completions: 0,
            ready_checks: 0,
        }
    }
}

/// Read-only view of what a [`ScriptedSink`] received.
///
/// The probe stays usable after the sink has moved into an exchange.
#[derive(Clone, Debug, Default)]
pub struct SinkProbe(Arc<Mutex<Record>>);

impl SinkProbe {
    fn lock(&self) -> MutexGuard<'_, Record> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Last status set on the sink; `200` if none was set.
    pub fn status(&self) -> u16 { self.lock().status }

    /// Content type set on the sink.
    pub fn content_type(&self) -> Option<&'static str> { self.lock().content_type }

    /// Every chunk written, in order.
    pub fn chunks(&self) -> Vec<Bytes> { self.lock().chunks.clone() }

    /// Written bytes as UTF-8 text.
    pub fn text(&self) -> String {
        self.lock()
            .chunks
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    /// Number of `complete` calls.
    pub fn completions(&self) -> usize { self.lock().completions }

    /// Number of `is_ready` calls.
    pub fn ready_checks(&self) -> usize { self.lock().ready_checks }
}

/// Sink whose readiness follows a script and which can fail on demand.
///
/// Each `is_ready` call consumes one scripted answer; once the script is
/// exhausted the sink is always ready.
#[derive(Debug, Default)]
pub struct ScriptedSink {
    probe: SinkProbe,
    readiness: VecDeque<bool>,
    fail_on_write: Option<usize>,
}

impl ScriptedSink {
    /// Create an always-ready sink and its probe.
    pub fn new() -> (Self, SinkProbe) {
        let sink = Self::default();
        let probe = sink.probe.clone();
        (sink, probe)
    }

    /// Answer successive `is_ready` calls from `readiness`.
    #[must_use]
    pub fn with_readiness(mut self, readiness: impl IntoIterator<Item = bool>) -> Self {
        self.readiness = readiness.into_iter().collect();
        self
    }

    /// Fail the write with zero-based index `index`.
    #[must_use]
    pub fn failing_on_write(mut self, index: usize) -> Self {
        self.fail_on_write = Some(index);
        self
    }
}

impl ResponseSink for ScriptedSink {
    fn set_status(&mut self, status: u16) { self.probe.lock().status = status; }

    fn set_content_type(&mut self, content_type: &'static str) {
        self.probe.lock().content_type = Some(content_type);
    }

    fn write(&mut self, bytes: Bytes) -> io::Result<()> {
        let mut record = self.probe.lock();
        if self.fail_on_write == Some(record.chunks.len()) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        record.chunks.push(bytes);
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        self.probe.lock().ready_checks += 1;
        self.readiness.pop_front().unwrap_or(true)
    }

    fn poll_write_possible(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> { Poll::Ready(Ok(())) }

    fn complete(&mut self) { self.probe.lock().completions += 1; }
}
