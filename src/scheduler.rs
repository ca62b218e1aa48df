//! Suspended long-poll exchanges.
//!
//! A [`LongPollScheduler`] owns one exchange that the processor chose to
//! hold open. It parks a [`SchedulerHandle`] on the session and waits,
//! without occupying a worker, until either the session schedules it
//! (messages were queued) or the poll timeout elapses. Either way it then
//! drains the session queue and writes it, followed by the pending replies,
//! starting the session's interval timeout once the messages are out.

use std::{sync::Arc, time::Duration};

use log::debug;
use tokio::{sync::Notify, time::sleep};

use crate::{
    batch::{Delivery, Replies, Suspension},
    config::TransportConfig,
    error::TransportError,
    exchange::Exchange,
    io::ResponseSink,
    session::SessionHandle,
    writer::ReplyWriter,
};

/// Wakes a suspended exchange.
///
/// A wake-up requested before the exchange starts waiting is remembered, so
/// scheduling never races the suspension itself.
#[derive(Clone, Debug, Default)]
pub struct SchedulerHandle {
    notify: Arc<Notify>,
}

impl SchedulerHandle {
    /// Create an unscheduled handle.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Request that the exchange resume and deliver queued messages.
    pub fn schedule(&self) { self.notify.notify_one(); }

    async fn scheduled(&self) { self.notify.notified().await; }
}

/// Why a suspended exchange resumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wakeup {
    /// The session scheduled the exchange.
    Scheduled,
    /// The poll timeout elapsed first.
    Expired,
}

/// One suspended long-poll exchange.
pub struct LongPollScheduler<S: ResponseSink> {
    exchange: Exchange<S>,
    session: SessionHandle,
    replies: Replies,
    timeout: Duration,
    interval: Duration,
    handle: SchedulerHandle,
}

impl<S: ResponseSink> LongPollScheduler<S> {
    /// Suspend `exchange` according to `suspension`.
    ///
    /// The hold time is the suspension's own timeout, or the configured poll
    /// timeout when it has none.
    pub fn new(exchange: Exchange<S>, suspension: Suspension, config: &TransportConfig) -> Self {
        let Suspension {
            session,
            replies,
            timeout,
        } = suspension;
        Self {
            exchange,
            session,
            replies,
            timeout: timeout.unwrap_or_else(|| config.timeout_duration()),
            interval: config.interval_duration(),
            handle: SchedulerHandle::new(),
        }
    }

    /// Handle that resumes this exchange.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle { self.handle.clone() }

    /// Hold time before the exchange resumes on its own.
    #[must_use]
    pub fn timeout(&self) -> Duration { self.timeout }

    /// Wait for a wake-up or the timeout, then dispatch.
    ///
    /// A client that goes away while suspended is answered with an error
    /// status straight away and its queued messages stay on the session.
    ///
    /// # Errors
    ///
    /// Returns the disconnect or write failure. The exchange has already been
    /// answered with an error status.
    pub async fn run(mut self) -> Result<Wakeup, TransportError> {
        self.session.set_scheduler(Some(self.handle.clone()));
        debug!(
            "exchange suspended: id={}, session={}, timeout={:?}",
            self.exchange.id(),
            self.session.id(),
            self.timeout
        );
        let resumed = tokio::select! {
            biased;
            error = self.exchange.disconnected() => Err(TransportError::Io(error)),
            () = self.handle.scheduled() => Ok(Wakeup::Scheduled),
            () = sleep(self.timeout) => Ok(Wakeup::Expired),
        };
        let wakeup = match resumed {
            Ok(wakeup) => wakeup,
            Err(error) => {
                debug!("client gone while suspended: id={}", self.exchange.id());
                self.fail(&error);
                return Err(error);
            }
        };
        debug!("exchange resumed: id={}, wakeup={wakeup:?}", self.exchange.id());
        if let Err(error) = self.dispatch().await {
            self.fail(&error);
            return Err(error);
        }
        Ok(wakeup)
    }

    /// Write the session's queued messages followed by the pending replies.
    ///
    /// Does nothing once the exchange has completed.
    ///
    /// # Errors
    ///
    /// Returns the write failure; the exchange is left for [`error`](Self::error).
    pub async fn dispatch(&mut self) -> Result<(), TransportError> {
        if self.exchange.is_completed() {
            return Ok(());
        }
        // Messages queued from here on wait for the next poll.
        self.session.set_scheduler(None);
        let delivery = Delivery {
            session: Some(Arc::clone(&self.session)),
            start_interval: true,
            messages: self.session.take_queue(),
            replies: std::mem::take(&mut self.replies),
        };
        self.exchange
            .write(ReplyWriter::new(delivery, self.interval))
            .await
    }

    /// Answer with `status` and no body. Later calls do nothing.
    pub fn error(&mut self, status: u16) {
        self.session.set_scheduler(None);
        self.exchange.error(status);
    }

    fn fail(&mut self, error: &TransportError) {
        self.session.set_scheduler(None);
        self.exchange.fail(error);
    }

    /// Returns `true` once the exchange has been answered.
    #[must_use]
    pub fn is_completed(&self) -> bool { self.exchange.is_completed() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        io::response_channel,
        message::Message,
        session::{ClientSession, SessionId},
    };

    fn suspension(session: &Arc<ClientSession>, timeout: Option<Duration>) -> Suspension {
        Suspension {
            session: session.clone(),
            replies: vec![Some(Message::builder("/meta/connect").successful(true).build())],
            timeout,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_flushes_replies_and_arms_interval() {
        let session = ClientSession::new(SessionId::new(1));
        let (sink, rx) = response_channel(1024);
        let scheduler = LongPollScheduler::new(
            Exchange::new(sink),
            suspension(&session, Some(Duration::from_secs(10))),
            &TransportConfig::default(),
        );

        assert_eq!(scheduler.run().await.expect("resumed"), Wakeup::Expired);
        let response = rx.collect().await;
        assert_eq!(
            response.text(),
            r#"[{"channel":"/meta/connect","successful":true}]"#
        );
        assert_eq!(session.interval_arms(), 1);
        assert!(!session.is_suspended());
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_resumes_before_timeout() {
        let session = ClientSession::new(SessionId::new(2));
        let (sink, rx) = response_channel(1024);
        let scheduler = LongPollScheduler::new(
            Exchange::new(sink),
            suspension(&session, None),
            &TransportConfig::default(),
        );
        let task = tokio::spawn(scheduler.run());
        tokio::task::yield_now().await;
        assert!(session.is_suspended());

        session.deliver(Message::builder("/chat").data("hi").build());
        assert_eq!(
            task.await.expect("scheduler task").expect("resumed"),
            Wakeup::Scheduled
        );

        let response = rx.collect().await;
        assert_eq!(
            response.text(),
            r#"[{"channel":"/chat","data":"hi"},{"channel":"/meta/connect","successful":true}]"#
        );
        assert_eq!(session.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_queued_before_suspension_wake_immediately() {
        let session = ClientSession::new(SessionId::new(3));
        session.deliver(Message::builder("/early").build());
        let (sink, _rx) = response_channel(1024);
        let scheduler = LongPollScheduler::new(
            Exchange::new(sink),
            suspension(&session, None),
            &TransportConfig::default(),
        );
        assert_eq!(scheduler.run().await.expect("resumed"), Wakeup::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn client_gone_while_suspended_keeps_the_queue() {
        let session = ClientSession::new(SessionId::new(6));
        let (sink, rx) = response_channel(1024);
        let scheduler = LongPollScheduler::new(
            Exchange::new(sink),
            suspension(&session, Some(Duration::from_secs(30))),
            &TransportConfig::default(),
        );
        let task = tokio::spawn(scheduler.run());
        tokio::task::yield_now().await;
        assert!(session.is_suspended());

        drop(rx);
        let error = task
            .await
            .expect("scheduler task")
            .expect_err("disconnect fails the exchange");
        assert!(error.is_io());
        assert!(!session.is_suspended());

        session.deliver(Message::builder("/chat").data("later").build());
        assert_eq!(session.queued(), 1);
        assert_eq!(session.interval_arms(), 0);
    }

    #[tokio::test]
    async fn error_is_status_only_and_guarded() {
        let session = ClientSession::new(SessionId::new(4));
        let (sink, rx) = response_channel(1024);
        let mut scheduler = LongPollScheduler::new(
            Exchange::new(sink),
            suspension(&session, None),
            &TransportConfig::default(),
        );
        scheduler.error(500);
        scheduler.error(500);
        assert!(scheduler.is_completed());
        scheduler.dispatch().await.expect("dispatch after completion is a no-op");
        drop(scheduler);

        let response = rx.collect().await;
        assert_eq!(response.status, Some(500));
        assert!(response.body.is_empty());
        assert_eq!(session.interval_arms(), 0);
    }

    #[test]
    fn suspension_timeout_defaults_to_config() {
        let session = ClientSession::new(SessionId::new(5));
        let (sink, _rx) = response_channel(1024);
        let config = TransportConfig::default().timeout(Duration::from_secs(7));
        let scheduler = LongPollScheduler::new(Exchange::new(sink), suspension(&session, None), &config);
        assert_eq!(scheduler.timeout(), Duration::from_secs(7));
    }
}
