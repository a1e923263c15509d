//! The Event Bus (C6): a global bounded ring plus per-subscriber filtered,
//! bounded delivery queues.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use controller_core::{defaults, Counter, SubscriptionId};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::event::{Event, EventDraft, FilterPredicate};
use crate::queue::{BusMessage, SubscriberQueue};

struct Ring {
    events: VecDeque<Event>,
    capacity: usize,
}

impl Ring {
    /// Pushes the event, returning whether it evicted the oldest entry.
    fn push(&mut self, event: Event) -> bool {
        let evicted = self.events.len() >= self.capacity;
        if evicted {
            self.events.pop_front();
        }
        self.events.push_back(event);
        evicted
    }

    fn backlog_from(&self, start_from_seq: u64) -> Result<Vec<Event>, u64> {
        match self.events.front() {
            Some(oldest) if start_from_seq < oldest.seq => Err(oldest.seq),
            _ => Ok(self.events.iter().filter(|e| e.seq >= start_from_seq).cloned().collect()),
        }
    }
}

struct Subscriber {
    predicate: RwLock<FilterPredicate>,
    queue: SubscriberQueue,
}

struct EventBusInner {
    ring: Mutex<Ring>,
    next_seq: AtomicU64,
    subscriber_queue_capacity: usize,
    subscribers: DashMap<SubscriptionId, Arc<Subscriber>>,
    ring_evictions: Counter,
    subscriber_drops: Counter,
}

/// Snapshot of the bus's drop-oldest backpressure counters (§4.6, §8
/// invariant 6): how often the global ring evicted its oldest entry, and how
/// many individual messages were dropped across every subscriber queue.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EventBusMetrics {
    pub ring_evictions: u64,
    pub subscriber_drops: u64,
}

/// Cheaply cloneable handle to the bus; all clones share the same ring and
/// subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

impl EventBus {
    pub fn new(ring_capacity: usize, subscriber_queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                ring: Mutex::new(Ring { events: VecDeque::with_capacity(ring_capacity), capacity: ring_capacity }),
                next_seq: AtomicU64::new(1),
                subscriber_queue_capacity,
                subscribers: DashMap::new(),
                ring_evictions: Counter::new(),
                subscriber_drops: Counter::new(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(defaults::DEFAULT_BUS_RING_CAPACITY, defaults::DEFAULT_SUBSCRIBER_QUEUE_CAPACITY)
    }

    /// Assigns `seq`/`timestamp`, appends to the ring, and fans the event
    /// out to every subscriber whose predicate matches. The ring lock also
    /// serializes against concurrent `subscribe` calls so a subscriber can
    /// never miss or double-receive an event published around its backlog
    /// read (see `subscribe`'s comment).
    #[tracing::instrument(level = "debug", skip(self, draft), fields(event_type = %draft.event_type))]
    pub fn publish(&self, draft: EventDraft) -> Event {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            event_type: draft.event_type,
            workspace_id: draft.workspace_id,
            credential_id: draft.credential_id,
            operation_id: draft.operation_id,
            payload: draft.payload,
            seq,
            timestamp: Utc::now(),
        };

        let mut ring = self.inner.ring.lock();
        if ring.push(event.clone()) {
            self.inner.ring_evictions.incr();
        }
        for entry in self.inner.subscribers.iter() {
            let subscriber = entry.value();
            if subscriber.predicate.read().matches(&event) {
                if subscriber.queue.push(BusMessage::Event(event.clone())) {
                    self.inner.subscriber_drops.incr();
                }
            }
        }
        drop(ring);

        event
    }

    /// Registers a new subscription. If `start_from_seq` is given and still
    /// present in the ring, the subscriber's queue is pre-loaded with the
    /// matching backlog before this call returns; if the ring has already
    /// advanced past it, a single `MissedEvents` marker is queued instead.
    ///
    /// Holding the ring lock across both the backlog read and subscriber
    /// registration is what makes this race-free: `publish` cannot fan out
    /// an event to subscribers already in the map while this is mid-flight,
    /// because it needs the same lock.
    #[tracing::instrument(level = "debug", skip(self, predicate))]
    pub fn subscribe(&self, predicate: FilterPredicate, start_from_seq: Option<u64>) -> Subscription {
        let subscriber = Arc::new(Subscriber {
            predicate: RwLock::new(predicate),
            queue: SubscriberQueue::new(self.inner.subscriber_queue_capacity),
        });

        let ring = self.inner.ring.lock();
        if let Some(requested) = start_from_seq {
            match ring.backlog_from(requested) {
                Ok(backlog) => {
                    for event in backlog {
                        if subscriber.predicate.read().matches(&event) {
                            subscriber.queue.push(BusMessage::Event(event));
                        }
                    }
                }
                Err(current_oldest) => {
                    let current = ring.events.back().map(|e| e.seq).unwrap_or(current_oldest.saturating_sub(1));
                    subscriber.queue.push(BusMessage::MissedEvents { requested, current });
                }
            }
        }

        let id = SubscriptionId::new();
        self.inner.subscribers.insert(id, subscriber.clone());
        drop(ring);

        Subscription { id, bus: self.inner.clone(), subscriber }
    }

    pub fn current_seq(&self) -> u64 {
        self.inner.next_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn metrics(&self) -> EventBusMetrics {
        EventBusMetrics {
            ring_evictions: self.inner.ring_evictions.get(),
            subscriber_drops: self.inner.subscriber_drops.get(),
        }
    }
}

/// A live subscription. Dropping it unregisters from the bus so the
/// producer never fans out to a dead queue.
pub struct Subscription {
    id: SubscriptionId,
    bus: Arc<EventBusInner>,
    subscriber: Arc<Subscriber>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&self) -> BusMessage {
        self.subscriber.queue.recv().await
    }

    /// Replaces the filter predicate. Takes effect on the next event;
    /// in-flight deliveries already queued are not rewound.
    pub fn set_predicate(&self, predicate: FilterPredicate) {
        *self.subscriber.predicate.write() = predicate;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.subscribers.remove(&self.id);
    }
}
