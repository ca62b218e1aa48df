//! Session double recording interval arming.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use wirepoll::{Message, SchedulerHandle, Session, SessionId};

/// Session that records every `start_interval_timeout` call.
#[derive(Debug)]
pub struct RecordingSession {
    id: SessionId,
    connected: AtomicBool,
    intervals: Mutex<Vec<Duration>>,
    queue: Mutex<VecDeque<Message>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl RecordingSession {
    /// Create a connected session.
    pub fn connected(id: u64) -> Arc<Self> { Self::build(id, true) }

    /// Create a session that reports itself disconnected.
    pub fn disconnected(id: u64) -> Arc<Self> { Self::build(id, false) }

    fn build(id: u64, connected: bool) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(id),
            connected: AtomicBool::new(connected),
            intervals: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            scheduler: Mutex::new(None),
        })
    }

    /// Change the connectivity flag.
    pub fn set_connected(&self, connected: bool) { self.connected.store(connected, Ordering::SeqCst); }

    /// Intervals armed so far, in call order.
    pub fn intervals(&self) -> Vec<Duration> { lock(&self.intervals).clone() }

    /// Number of times the interval was armed.
    pub fn arms(&self) -> usize { lock(&self.intervals).len() }

    /// Queue `message`, waking a parked scheduler.
    pub fn push(&self, message: Message) {
        lock(&self.queue).push_back(message);
        if let Some(scheduler) = lock(&self.scheduler).as_ref() {
            scheduler.schedule();
        }
    }

    /// Returns `true` while a scheduler is parked on this session.
    pub fn has_scheduler(&self) -> bool { lock(&self.scheduler).is_some() }
}

impl Session for RecordingSession {
    fn id(&self) -> SessionId { self.id }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::SeqCst) }

    fn start_interval_timeout(&self, interval: Duration) { lock(&self.intervals).push(interval); }

    fn take_queue(&self) -> Vec<Message> { lock(&self.queue).drain(..).collect() }

    fn set_scheduler(&self, scheduler: Option<SchedulerHandle>) {
        let pending = !lock(&self.queue).is_empty();
        let mut slot = lock(&self.scheduler);
        *slot = scheduler;
        if pending && let Some(scheduler) = slot.as_ref() {
            scheduler.schedule();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
