//! The per-subscriber bounded delivery queue. Drop-oldest backpressure keeps
//! a slow subscriber from ever stalling a producer (§4.6, §8 invariant 6).

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::event::Event;

/// A message handed to one subscriber: a real event, or a synthetic marker
/// describing backlog the subscriber never saw.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Event(Event),
    /// The subscriber's own queue overflowed; `count` events were dropped
    /// to make room for newer ones.
    DroppedEvents { count: u64 },
    /// `start_from_seq` on subscribe/reconnect requested a seq no longer
    /// present in the global ring.
    MissedEvents { requested: u64, current: u64 },
}

struct QueueState {
    messages: VecDeque<BusMessage>,
    pending_drops: u64,
}

pub struct SubscriberQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SubscriberQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState { messages: VecDeque::with_capacity(capacity), pending_drops: 0 }),
            notify: Notify::new(),
        }
    }

    /// Enqueues `message`, dropping the oldest queued entry if the queue is
    /// already at capacity. Never blocks. Returns whether an entry was
    /// dropped to make room.
    pub fn push(&self, message: BusMessage) -> bool {
        let dropped = {
            let mut state = self.state.lock();
            let dropped = state.messages.len() >= self.capacity;
            if dropped {
                state.messages.pop_front();
                state.pending_drops += 1;
            }
            state.messages.push_back(message);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Awaits the next message. A pending drop marker is surfaced ahead of
    /// whatever is still queued, then delivery resumes in order.
    pub async fn recv(&self) -> BusMessage {
        loop {
            {
                let mut state = self.state.lock();
                if state.pending_drops > 0 {
                    let count = std::mem::take(&mut state.pending_drops);
                    return BusMessage::DroppedEvents { count };
                }
                if let Some(message) = state.messages.pop_front() {
                    return message;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }
}
