//! Tokio channel adapters for [`BodySource`] and [`ResponseSink`].
//!
//! The body side is a bounded channel of chunks: producers await capacity,
//! so a fast client is paced by the decoder. The response side behaves like
//! a servlet output buffer: every write is accepted, but once the bytes not
//! yet taken by the [`ResponseReceiver`] reach the high-water mark the sink
//! reports "not ready" until the receiver drains below it.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::task::AtomicWaker;
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::{BodySource, ResponseSink};

/// Default capacity, in chunks, of a request body channel.
pub const DEFAULT_BODY_CHANNEL_CAPACITY: usize = 16;

/// Default number of undelivered response bytes before the sink stalls.
pub const DEFAULT_HIGH_WATER_MARK: usize = 8 * 1024;

/// Sending half of a request body channel.
pub type BodySender = mpsc::Sender<io::Result<Bytes>>;

/// Create a bounded request body channel.
///
/// Dropping every [`BodySender`] marks the end of the body. Sending an
/// `Err` delivers an error notification to the reader.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn body_channel(capacity: usize) -> (BodySender, ChannelBody) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        tx,
        ChannelBody {
            rx,
            pending: None,
            error: None,
            closed: false,
        },
    )
}

/// Request body fed by a [`BodySender`].
#[derive(Debug)]
pub struct ChannelBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    pending: Option<Bytes>,
    error: Option<io::Error>,
    closed: bool,
}

impl ChannelBody {
    fn has_progress(&self) -> bool {
        self.pending.is_some() || self.error.is_some() || self.closed
    }

    fn stash(&mut self, item: Option<io::Result<Bytes>>) {
        match item {
            Some(Ok(chunk)) if chunk.is_empty() => {}
            Some(Ok(chunk)) => self.pending = Some(chunk),
            Some(Err(error)) => self.error = Some(error),
            None => self.closed = true,
        }
    }
}

impl BodySource for ChannelBody {
    fn is_ready(&mut self) -> bool {
        while !self.has_progress() {
            match self.rx.try_recv() {
                Ok(item) => self.stash(Some(item)),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => self.stash(None),
            }
        }
        true
    }

    fn is_finished(&self) -> bool {
        self.closed && self.pending.is_none() && self.error.is_none()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        let Some(chunk) = self.pending.as_mut() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk.split_to(n));
        if chunk.is_empty() {
            self.pending = None;
        }
        Ok(n)
    }

    fn poll_data_available(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            if let Some(error) = self.error.take() {
                return Poll::Ready(Err(error));
            }
            if self.has_progress() {
                return Poll::Ready(Ok(()));
            }
            match self.rx.poll_recv(cx) {
                Poll::Ready(item) => self.stash(item),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// One item observed by a [`ResponseReceiver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponsePart {
    /// Status line and content type, sent once before any body bytes.
    Head {
        /// HTTP status code.
        status: u16,
        /// Content type, if one was set.
        content_type: Option<&'static str>,
    },
    /// A run of body bytes, in write order.
    Body(Bytes),
}

#[derive(Debug, Default)]
struct Shared {
    in_flight: AtomicUsize,
    receiver_gone: AtomicBool,
    writable: AtomicWaker,
    closed: AtomicWaker,
}

/// Create a response channel whose sink stalls at `high_water_mark`
/// undelivered bytes.
#[must_use]
pub fn response_channel(high_water_mark: usize) -> (ChannelSink, ResponseReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::default());
    (
        ChannelSink {
            tx: Some(tx),
            shared: Arc::clone(&shared),
            high_water_mark: high_water_mark.max(1),
            status: 200,
            content_type: None,
            committed: false,
        },
        ResponseReceiver { rx, shared },
    )
}

/// Response sink delivering parts to a [`ResponseReceiver`].
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<ResponsePart>>,
    shared: Arc<Shared>,
    high_water_mark: usize,
    status: u16,
    content_type: Option<&'static str>,
    committed: bool,
}

impl ChannelSink {
    /// Returns `true` once the head has been sent.
    #[must_use]
    pub fn is_committed(&self) -> bool { self.committed }

    fn send(&mut self, part: ResponsePart) -> io::Result<()> {
        let tx = self.tx.as_ref().ok_or_else(completed)?;
        tx.send(part).map_err(|_| receiver_gone())
    }

    fn commit(&mut self) -> io::Result<()> {
        if !self.committed {
            self.committed = true;
            let head = ResponsePart::Head {
                status: self.status,
                content_type: self.content_type,
            };
            self.send(head)?;
        }
        Ok(())
    }

    fn below_high_water(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) < self.high_water_mark
    }

    fn gone(&self) -> bool { self.shared.receiver_gone.load(Ordering::Acquire) }
}

impl ResponseSink for ChannelSink {
    fn set_status(&mut self, status: u16) {
        if !self.committed {
            self.status = status;
        }
    }

    fn set_content_type(&mut self, content_type: &'static str) {
        if !self.committed {
            self.content_type = Some(content_type);
        }
    }

    fn write(&mut self, bytes: Bytes) -> io::Result<()> {
        if self.gone() {
            return Err(receiver_gone());
        }
        self.commit()?;
        let len = bytes.len();
        self.shared.in_flight.fetch_add(len, Ordering::AcqRel);
        self.send(ResponsePart::Body(bytes))
    }

    fn is_ready(&mut self) -> bool { !self.gone() && self.below_high_water() }

    fn poll_write_possible(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.gone() {
            return Poll::Ready(Err(receiver_gone()));
        }
        if self.below_high_water() {
            return Poll::Ready(Ok(()));
        }
        self.shared.writable.register(cx.waker());
        // Re-check after registering so a drain racing the registration is
        // not missed.
        if self.gone() {
            Poll::Ready(Err(receiver_gone()))
        } else if self.below_high_water() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    fn poll_closed(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        if self.gone() {
            return Poll::Ready(receiver_gone());
        }
        self.shared.closed.register(cx.waker());
        if self.gone() {
            Poll::Ready(receiver_gone())
        } else {
            Poll::Pending
        }
    }

    fn complete(&mut self) {
        if self.tx.is_some() {
            // A vanished receiver has nothing left to be told.
            let _ = self.commit();
            self.tx = None;
        }
    }
}

/// Receiving half of a response channel.
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: mpsc::UnboundedReceiver<ResponsePart>,
    shared: Arc<Shared>,
}

impl ResponseReceiver {
    /// Receive the next part, or `None` once the response is complete.
    ///
    /// Taking body bytes frees sink capacity and wakes a stalled writer.
    pub async fn recv(&mut self) -> Option<ResponsePart> {
        let part = self.rx.recv().await;
        if let Some(ResponsePart::Body(bytes)) = &part {
            self.shared
                .in_flight
                .fetch_sub(bytes.len(), Ordering::AcqRel);
            self.shared.writable.wake();
        }
        part
    }

    /// Drain the response to completion.
    pub async fn collect(mut self) -> CollectedResponse {
        let mut response = CollectedResponse::default();
        while let Some(part) = self.recv().await {
            match part {
                ResponsePart::Head {
                    status,
                    content_type,
                } => {
                    response.status = Some(status);
                    response.content_type = content_type;
                }
                ResponsePart::Body(bytes) => {
                    response.chunks += 1;
                    response.body.extend_from_slice(&bytes);
                }
            }
        }
        response
    }
}

impl Drop for ResponseReceiver {
    fn drop(&mut self) {
        self.shared.receiver_gone.store(true, Ordering::Release);
        self.shared.writable.wake();
        self.shared.closed.wake();
    }
}

/// A fully received response.
#[derive(Debug, Default)]
pub struct CollectedResponse {
    /// Status from the head, `None` if the sink was dropped uncompleted.
    pub status: Option<u16>,
    /// Content type from the head.
    pub content_type: Option<&'static str>,
    /// Concatenated body bytes.
    pub body: BytesMut,
    /// Number of body parts received.
    pub chunks: usize,
}

impl CollectedResponse {
    /// Body as UTF-8 text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }
}

fn receiver_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response receiver dropped")
}

fn completed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response already completed")
}
