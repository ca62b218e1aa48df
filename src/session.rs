//! Session collaborator seen by the transport.
//!
//! Sessions are owned by the surrounding registry. The transport only asks
//! whether a session is still connected, arms its interval timeout after a
//! poll response, drains its queue when a suspended exchange resumes, and
//! parks a [`SchedulerHandle`] on it while suspended.
//!
//! [`ClientSession`] is a self-contained implementation suitable for
//! embedding and tests.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use log::debug;

use crate::{message::Message, scheduler::SchedulerHandle};

/// Identifier assigned to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionId {
    /// Create a new [`SessionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// Operations the transport needs from a session.
///
/// Implementations must be thread-safe: arming and queue draining can race
/// with the registry's own sweeper.
pub trait Session: Send + Sync + fmt::Debug {
    /// Session identifier, used for logging.
    fn id(&self) -> SessionId;

    /// Returns `true` while the client is considered connected.
    fn is_connected(&self) -> bool;

    /// Arm the idle timer measuring client silence after a poll response.
    fn start_interval_timeout(&self, interval: Duration);

    /// Remove and return every queued message, in delivery order.
    fn take_queue(&self) -> Vec<Message>;

    /// Install or clear the scheduler woken when messages are queued.
    fn set_scheduler(&self, scheduler: Option<SchedulerHandle>);
}

/// Shared handle to a session.
pub type SessionHandle = Arc<dyn Session>;

/// In-process session with a message queue and an interval deadline.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    connected: AtomicBool,
    queue: Mutex<VecDeque<Message>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    interval_deadline: Mutex<Option<Instant>>,
    interval_arms: AtomicU64,
}

impl ClientSession {
    /// Create a connected session.
    #[must_use]
    pub fn new(id: SessionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            connected: AtomicBool::new(true),
            queue: Mutex::new(VecDeque::new()),
            scheduler: Mutex::new(None),
            interval_deadline: Mutex::new(None),
            interval_arms: AtomicU64::new(0),
        })
    }

    /// Queue `message` and wake the suspended exchange, if any.
    pub fn deliver(&self, message: Message) {
        lock(&self.queue).push_back(message);
        if let Some(scheduler) = lock(&self.scheduler).as_ref() {
            scheduler.schedule();
        }
    }

    /// Mark the session disconnected.
    pub fn disconnect(&self) { self.connected.store(false, Ordering::Release); }

    /// Number of messages waiting to be delivered.
    #[must_use]
    pub fn queued(&self) -> usize { lock(&self.queue).len() }

    /// Number of times the interval timeout has been armed.
    #[must_use]
    pub fn interval_arms(&self) -> u64 { self.interval_arms.load(Ordering::Acquire) }

    /// Returns `true` if an armed interval has elapsed at `now`.
    #[must_use]
    pub fn interval_expired(&self, now: Instant) -> bool {
        lock(&self.interval_deadline).is_some_and(|deadline| now >= deadline)
    }

    /// Returns `true` while an exchange is suspended on this session.
    #[must_use]
    pub fn is_suspended(&self) -> bool { lock(&self.scheduler).is_some() }
}

impl Session for ClientSession {
    fn id(&self) -> SessionId { self.id }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    fn start_interval_timeout(&self, interval: Duration) {
        *lock(&self.interval_deadline) = Some(Instant::now() + interval);
        self.interval_arms.fetch_add(1, Ordering::AcqRel);
        debug!("interval timeout armed: session={}, interval={interval:?}", self.id);
    }

    fn take_queue(&self) -> Vec<Message> { lock(&self.queue).drain(..).collect() }

    fn set_scheduler(&self, scheduler: Option<SchedulerHandle>) {
        let pending = !lock(&self.queue).is_empty();
        let mut slot = lock(&self.scheduler);
        *slot = scheduler;
        // Messages queued before the exchange suspended must still wake it.
        if pending && let Some(scheduler) = slot.as_ref() {
            scheduler.schedule();
        }
    }
}

/// Lock `mutex`, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_queue_drains_in_delivery_order() {
        let session = ClientSession::new(SessionId::new(1));
        session.deliver(Message::builder("/a").build());
        session.deliver(Message::builder("/b").build());

        let drained: Vec<_> = session
            .take_queue()
            .iter()
            .filter_map(|m| m.channel().map(str::to_owned))
            .collect();
        assert_eq!(drained, ["/a", "/b"]);
        assert_eq!(session.queued(), 0);
    }

    #[test]
    fn interval_deadline_tracks_arming() {
        let session = ClientSession::new(SessionId::new(2));
        let before = Instant::now();
        assert!(!session.interval_expired(before));

        session.start_interval_timeout(Duration::ZERO);
        assert_eq!(session.interval_arms(), 1);
        assert!(session.interval_expired(Instant::now()));
    }

    #[test]
    fn disconnect_clears_connectivity() {
        let session = ClientSession::new(SessionId::new(3));
        assert!(session.is_connected());
        session.disconnect();
        assert!(!session.is_connected());
    }

    #[test]
    fn session_id_display() {
        assert_eq!(SessionId::from(7).to_string(), "SessionId(7)");
    }
}
