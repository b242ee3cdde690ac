//! Publish/subscribe fan-out for acquisition events.
//!
//! Callbacks run on the publishing thread, outside the subscriber lock, so a
//! callback may subscribe or unsubscribe without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Events published by the acquisition worker.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    /// A frame landed in the buffer. Payload-free by intent: readers always
    /// take the latest value from the buffer.
    SpectrumArrived { timestamp: f64 },
    /// The source failed; no further frames follow.
    Error(String),
    /// The source ended.
    Closed,
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscribers<T> {
    entries: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

pub struct EventBus<T> {
    inner: Arc<Subscribers<T>>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Subscribers {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.push((id, Arc::new(callback)));
        }
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = match self.inner.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => return,
        };
        for cb in snapshot {
            cb(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Registration handle; unsubscribes on drop.
pub struct Subscription<T> {
    id: u64,
    bus: Weak<Subscribers<T>>,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade()
            && let Ok(mut entries) = bus.entries.lock()
        {
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fan_out_and_unsubscribe_on_drop() {
        let bus = EventBus::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = hits.clone();
        let s1 = bus.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        let s2 = bus.subscribe(move |v| {
            h2.fetch_add(*v as usize, Ordering::SeqCst);
        });
        bus.publish(&10);
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        drop(s1);
        bus.publish(&10);
        assert_eq!(hits.load(Ordering::SeqCst), 21);
        s2.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let bus = EventBus::<()>::new();
        let slot: Arc<Mutex<Option<Subscription<()>>>> = Arc::new(Mutex::new(None));
        let slot_cb = slot.clone();
        let sub = bus.subscribe(move |_| {
            if let Ok(mut s) = slot_cb.lock() {
                s.take();
            }
        });
        *slot.lock().unwrap() = Some(sub);
        bus.publish(&());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::<()>::new();
        let sub = bus.subscribe(|_| {});
        drop(bus);
        drop(sub);
    }
}
