//! Request body replaying a fixed script.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io,
    task::{Context, Poll},
};

use bytes::Bytes;
use wirepoll::BodySource;

/// One step of a [`ScriptedBody`] script.
#[derive(Debug)]
pub enum BodyStep {
    /// Bytes made available to the next reads.
    Chunk(Bytes),
    /// Report "not ready" once, ending the current drain.
    Stall,
    /// Fail the next read.
    Fail(io::ErrorKind),
}

impl BodyStep {
    /// Convenience constructor for a chunk step.
    pub fn chunk(bytes: impl AsRef<[u8]>) -> Self { Self::Chunk(Bytes::copy_from_slice(bytes.as_ref())) }
}

/// A call observed by a [`ScriptedBody`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyCall {
    /// `is_ready` was called.
    IsReady,
    /// `is_finished` was called.
    IsFinished,
    /// `read` was called.
    Read,
}

/// Body source whose readiness and data follow a script.
///
/// The body is finished once the script is exhausted and readiness has been
/// checked, mirroring transports where the readiness check discovers end
/// of stream.
#[derive(Debug, Default)]
pub struct ScriptedBody {
    steps: VecDeque<BodyStep>,
    eof: bool,
    calls: RefCell<Vec<BodyCall>>,
}

impl ScriptedBody {
    /// Create a body from `steps`.
    pub fn new(steps: impl IntoIterator<Item = BodyStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Create a body delivering `chunks` with a stall after each one.
    pub fn stalling(chunks: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Self {
        Self::new(
            chunks
                .into_iter()
                .flat_map(|chunk| [BodyStep::chunk(chunk), BodyStep::Stall]),
        )
    }

    /// Calls observed so far, in order.
    pub fn calls(&self) -> Vec<BodyCall> { self.calls.borrow().clone() }

    fn record(&self, call: BodyCall) { self.calls.borrow_mut().push(call); }
}

impl BodySource for ScriptedBody {
    fn is_ready(&mut self) -> bool {
        self.record(BodyCall::IsReady);
        match self.steps.front() {
            Some(BodyStep::Stall) => {
                self.steps.pop_front();
                false
            }
            Some(_) => true,
            None => {
                self.eof = true;
                true
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.record(BodyCall::IsFinished);
        self.eof
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.record(BodyCall::Read);
        match self.steps.pop_front() {
            Some(BodyStep::Chunk(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk.split_to(n));
                if !chunk.is_empty() {
                    self.steps.push_front(BodyStep::Chunk(chunk));
                }
                Ok(n)
            }
            Some(BodyStep::Fail(kind)) => Err(io::Error::new(kind, "scripted read failure")),
            Some(step @ BodyStep::Stall) => {
                self.steps.push_front(step);
                Ok(0)
            }
            None => Ok(0),
        }
    }

    fn poll_data_available(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> { Poll::Ready(Ok(())) }
}
