//! Blocking slot queue for cross-thread handoff.
//!
//! Every slot that crosses between the component's notification thread and
//! the pipeline-driving thread goes through a [`SlotQueue`]. The producer
//! side never blocks; the consumer side blocks until a slot arrives or the
//! queue is disabled.

use crate::slot::Slot;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

/// A thread-safe blocking FIFO of slots with enable/disable.
///
/// Cloning shares the queue; one clone lives with the port, another with
/// the session for routing returned slots. Capacity is bounded in practice
/// by the port's pool size, so `push` never needs to block.
#[derive(Clone)]
pub struct SlotQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    slots: VecDeque<Slot>,
    enabled: bool,
}

impl SlotQueue {
    /// Create a new, enabled queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    slots: VecDeque::new(),
                    enabled: true,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueue a slot. Never blocks.
    pub fn push(&self, slot: Slot) {
        let mut state = self.inner.state.lock().unwrap();
        state.slots.push_back(slot);
        self.inner.available.notify_one();
    }

    /// Dequeue a slot, blocking until one is available or the queue is
    /// disabled. Returns `None` as the disabled sentinel.
    pub fn pop(&self) -> Option<Slot> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if !state.enabled {
                return None;
            }
            if let Some(slot) = state.slots.pop_front() {
                return Some(slot);
            }
            state = self.inner.available.wait(state).unwrap();
        }
    }

    /// Dequeue a slot without blocking. Returns `None` if the queue is
    /// empty or disabled.
    pub fn try_pop(&self) -> Option<Slot> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.enabled {
            return None;
        }
        state.slots.pop_front()
    }

    /// Forcibly dequeue one slot, ignoring the enabled flag. Used by flush
    /// to recover in-flight slots without waiting. Returns `None` only when
    /// the queue is empty.
    pub fn pop_forced(&self) -> Option<Slot> {
        self.inner.state.lock().unwrap().slots.pop_front()
    }

    /// Allow `pop` to block for new slots.
    pub fn enable(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.enabled = true;
        self.inner.available.notify_all();
    }

    /// Disable the queue, waking every thread blocked in `pop`. Disabling
    /// an already-disabled queue is a no-op.
    pub fn disable(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.enabled = false;
        self.inner.available.notify_all();
    }

    /// Whether `pop` may currently block for slots.
    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().unwrap().enabled
    }

    /// Number of queued slots.
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().slots.len()
    }

    /// Check if no slots are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SlotQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn test_slot(id: usize) -> Slot {
        Slot::new_owned(id, 0, vec![0; 16].into_boxed_slice())
    }

    #[test]
    fn test_push_pop_ordering() {
        let queue = SlotQueue::new();
        queue.push(test_slot(0));
        queue.push(test_slot(1));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().id(), 0);
        assert_eq!(queue.pop().unwrap().id(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = SlotQueue::new();
        let producer = queue.clone();

        let consumer = thread::spawn(move || queue.pop());

        thread::sleep(Duration::from_millis(50));
        producer.push(test_slot(7));

        let slot = consumer.join().unwrap();
        assert_eq!(slot.unwrap().id(), 7);
    }

    #[test]
    fn test_disable_wakes_blocked_pop() {
        let queue = SlotQueue::new();
        let blocked = queue.clone();

        let consumer = thread::spawn(move || blocked.pop());

        thread::sleep(Duration::from_millis(50));
        queue.disable();

        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_disabled_pop_returns_sentinel_with_items_queued() {
        let queue = SlotQueue::new();
        queue.push(test_slot(0));
        queue.disable();

        // pop honors the disabled flag even when slots are queued
        assert!(queue.pop().is_none());
        assert!(queue.try_pop().is_none());
        // forced drain still recovers them
        assert_eq!(queue.pop_forced().unwrap().id(), 0);
        assert!(queue.pop_forced().is_none());
    }

    #[test]
    fn test_reenable_restores_pop() {
        let queue = SlotQueue::new();
        queue.disable();
        queue.disable(); // reentrant disable is a no-op
        queue.enable();

        queue.push(test_slot(3));
        assert_eq!(queue.try_pop().unwrap().id(), 3);
    }

    #[test]
    fn test_producer_consumer_threads() {
        let queue = SlotQueue::new();
        let producer = queue.clone();

        let handle = thread::spawn(move || {
            for i in 0..50 {
                producer.push(test_slot(i));
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 50 {
            if let Some(slot) = queue.pop() {
                seen.push(slot.id());
            }
        }
        handle.join().unwrap();

        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
}
