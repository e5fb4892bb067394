//! In-process publish/subscribe for tracking events
//!
//! Every subscription owns a bounded mailbox. `publish` only pushes into
//! mailboxes and never waits for a consumer: when a mailbox is full its
//! oldest pending event is discarded and the drop counters are bumped.
//! Each subscriber sees its own events in publish order.

use crate::events::TrackingEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Unique identifier of a subscription on one bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct MailboxState {
    events: VecDeque<TrackingEvent>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct Mailbox {
    state: Mutex<MailboxState>,
    ready: Condvar,
    capacity: usize,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Returns true if an older event had to be discarded
    fn push(&self, event: TrackingEvent) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }

        let mut overflowed = false;
        if state.events.len() >= self.capacity {
            state.events.pop_front();
            state.dropped += 1;
            overflowed = true;
        }
        state.events.push_back(event);
        drop(state);

        self.ready.notify_one();
        overflowed
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Wait for the next event; None once closed or when `deadline` passes
    fn pop(&self, deadline: Option<Instant>) -> Option<TrackingEvent> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }

            state = match deadline {
                None => self.ready.wait(state).unwrap_or_else(|p| p.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|p| p.into_inner())
                        .0
                }
            };
        }
    }
}

#[derive(Debug)]
struct BusShared {
    subscribers: Mutex<HashMap<SubscriptionId, Arc<Mailbox>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

impl BusShared {
    fn remove(&self, id: SubscriptionId) -> Option<Arc<Mailbox>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id)
    }
}

/// Publish/subscribe channel for [`TrackingEvent`]s
///
/// Cheap to clone; all clones share the same subscriber set.
#[derive(Debug, Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
}

impl EventBus {
    /// Bus whose subscribers each buffer at most `capacity` pending events
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(BusShared {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                dropped: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Deliver `event` to every current subscriber without blocking on any of them
    pub fn publish(&self, event: TrackingEvent) {
        let mailboxes: Vec<Arc<Mailbox>> = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();

        for mailbox in mailboxes {
            if mailbox.push(event.clone()) {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("Subscriber queue full, oldest pending event dropped");
            }
        }
    }

    /// Register a pull-style subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let mailbox = Arc::new(Mailbox::new(self.shared.capacity));

        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, mailbox.clone());

        log::trace!("Subscriber {:?} registered", id);
        Subscription {
            id,
            mailbox,
            bus: Arc::downgrade(&self.shared),
            worker: None,
        }
    }

    /// Register a handler run on a dedicated delivery thread
    ///
    /// The handler stops receiving events when the returned subscription is
    /// dropped or unsubscribed.
    pub fn subscribe_with<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(TrackingEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let mailbox = subscription.mailbox.clone();

        let worker = thread::Builder::new()
            .name(format!("event-bus-{}", subscription.id.0))
            .spawn(move || {
                while let Some(event) = mailbox.pop(None) {
                    handler(event);
                }
            });

        match worker {
            Ok(handle) => subscription.worker = Some(handle),
            Err(e) => log::error!("Failed to spawn delivery thread: {}", e),
        }
        subscription
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(mailbox) = self.shared.remove(id) {
            mailbox.close();
            log::trace!("Subscriber {:?} removed", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Events discarded across all subscribers because of full queues
    pub fn backpressure_dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::BusConfig::default().queue_capacity)
    }
}

/// A consumer's registration on the bus
///
/// Dropping it unsubscribes, so a subscription never outlives its owner.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    mailbox: Arc<Mailbox>,
    bus: Weak<BusShared>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Block until the next event; None after unsubscribe
    pub fn recv(&self) -> Option<TrackingEvent> {
        self.mailbox.pop(None)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<TrackingEvent> {
        self.mailbox.pop(Some(Instant::now() + timeout))
    }

    pub fn try_recv(&self) -> Option<TrackingEvent> {
        let mut state = self.mailbox.lock();
        if state.closed {
            return None;
        }
        state.events.pop_front()
    }

    /// Take every pending event
    pub fn drain(&self) -> Vec<TrackingEvent> {
        self.mailbox.lock().events.drain(..).collect()
    }

    /// Events this subscriber lost to backpressure
    pub fn dropped(&self) -> u64 {
        self.mailbox.lock().dropped
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
        self.mailbox.close();

        if let Some(worker) = self.worker.take() {
            // A handler may drop its own subscription; never join ourselves
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                log::error!("Event handler for {:?} panicked", self.id);
            }
        }
    }
}
