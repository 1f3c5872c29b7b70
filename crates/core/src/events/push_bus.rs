//! Owner-scoped publish/subscribe for push notifications.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::{Mutex, RwLock};

use super::push_model::PushEvent;
use crate::cache::CacheRecord;

pub type PushHandler<R> = Arc<dyn Fn(PushEvent<R>) + Send + Sync>;

/// Subscription contract: handlers receive every event published for the
/// owner they subscribed with.
pub trait PushBus<R: CacheRecord>: Send + Sync {
    fn subscribe(&self, owner_id: &str, handler: PushHandler<R>) -> Subscription;
}

/// Live subscription; unsubscribes on [`Subscription::unsubscribe`] or drop.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn detached() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Idempotent and synchronous.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

struct BusSubscriber<R> {
    owner_id: String,
    handler: PushHandler<R>,
}

struct BusInner<R> {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, BusSubscriber<R>>>,
}

/// In-process push bus.
///
/// Handlers run on the publishing task, after the subscriber table lock is
/// released, so a handler may subscribe or unsubscribe.
pub struct InMemoryPushBus<R> {
    inner: Arc<BusInner<R>>,
}

impl<R: CacheRecord> InMemoryPushBus<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                subscribers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Deliver `event` to every subscriber of its owner. Returns the number
    /// of handlers invoked.
    pub fn publish(&self, event: PushEvent<R>) -> usize {
        let handlers: Vec<PushHandler<R>> = self
            .inner
            .subscribers
            .read()
            .values()
            .filter(|subscriber| subscriber.owner_id == event.owner_id())
            .map(|subscriber| Arc::clone(&subscriber.handler))
            .collect();

        debug!(
            "[PushBus] {:?} {} -> {} handler(s)",
            event.kind(),
            event.record_id(),
            handlers.len()
        );
        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl<R: CacheRecord> Default for InMemoryPushBus<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CacheRecord> PushBus<R> for InMemoryPushBus<R> {
    fn subscribe(&self, owner_id: &str, handler: PushHandler<R>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().insert(
            id,
            BusSubscriber {
                owner_id: owner_id.to_string(),
                handler,
            },
        );
        debug!("[PushBus] subscribed #{} for owner {}", id, owner_id);

        let weak: Weak<BusInner<R>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.write().remove(&id);
                debug!("[PushBus] unsubscribed #{}", id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: String,
        owner: String,
    }

    impl CacheRecord for Note {
        fn id(&self) -> &str {
            &self.id
        }
        fn owner_id(&self) -> &str {
            &self.owner
        }
        fn created_at(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(0, 0).unwrap()
        }
        fn updated_at(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(0, 0).unwrap()
        }
    }

    fn note(id: &str, owner: &str) -> Note {
        Note {
            id: id.to_string(),
            owner: owner.to_string(),
        }
    }

    fn counting_handler(counter: &Arc<AtomicUsize>) -> PushHandler<Note> {
        let counter = Arc::clone(counter);
        Arc::new(move |_event: PushEvent<Note>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn publish_routes_by_owner() {
        let bus = InMemoryPushBus::new();
        let u1 = Arc::new(AtomicUsize::new(0));
        let u2 = Arc::new(AtomicUsize::new(0));
        let _s1 = bus.subscribe("u1", counting_handler(&u1));
        let _s2 = bus.subscribe("u2", counting_handler(&u2));

        assert_eq!(bus.publish(PushEvent::Insert(note("a", "u1"))), 1);
        assert_eq!(bus.publish(PushEvent::delete("a", "u1")), 1);

        assert_eq!(u1.load(Ordering::SeqCst), 2);
        assert_eq!(u2.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_drop_unsubscribes() {
        let bus = InMemoryPushBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let subscription = bus.subscribe("u1", counting_handler(&counter));
        assert_eq!(bus.subscriber_count(), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(PushEvent::Insert(note("a", "u1"))), 0);

        {
            let _scoped = bus.subscribe("u1", counting_handler(&counter));
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_after_bus_dropped_does_not_panic() {
        let bus = InMemoryPushBus::<Note>::new();
        let subscription = bus.subscribe("u1", Arc::new(|_event: PushEvent<Note>| {}));
        drop(bus);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }
}
