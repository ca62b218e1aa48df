//! Exchange task spawning for [`LongPollTransport`].

use std::{any::Any, fmt};

use futures::FutureExt;
use log::error;
use tokio::task::JoinHandle;

use super::{LongPollTransport, Outcome};
use crate::{
    batch::BatchProcessor,
    io::{BodySource, ResponseSink},
    request::RequestHead,
};

/// Formats a panic payload for logging.
///
/// `String` and `&'static str` payloads print as-is; anything else falls
/// back to `Debug`.
struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

impl<P: BatchProcessor> LongPollTransport<P> {
    /// Serve one exchange on a tracked task, logging and discarding panics.
    ///
    /// A panic escaping the processor leaves the exchange answered with
    /// `500`. The returned handle resolves to `None` in that case.
    pub fn spawn<B, S>(&self, head: RequestHead, mut body: B, sink: S) -> JoinHandle<Option<Outcome>>
    where
        B: BodySource + Send + 'static,
        S: ResponseSink + Send + 'static,
    {
        let transport = self.clone();
        let path = head.path().to_owned();
        let peer_addr = head.peer_addr();
        self.tracker.spawn(async move {
            let fut = std::panic::AssertUnwindSafe(transport.handle(head, &mut body, sink))
                .catch_unwind();
            match fut.await {
                Ok(outcome) => Some(outcome),
                Err(panic) => {
                    crate::metrics::inc_errors("panic");
                    let panic_msg = PanicMessage(panic);
                    // Emit via both `log` and `tracing` for tests that capture either.
                    error!(
                        "exchange task panicked: panic={panic_msg}, path={path}, \
                         peer_addr={peer_addr:?}"
                    );
                    tracing::error!(panic = %panic_msg, %path, ?peer_addr, "exchange task panicked");
                    None
                }
            }
        })
    }

    /// Number of spawned exchanges still running.
    #[must_use]
    pub fn running(&self) -> usize { self.tracker.len() }

    /// Close the task tracker and wait for every spawned exchange to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
