//! Typed listener fan-out.
//!
//! One `ListenerRegistry<T>` per observable state slice. Delivery is
//! synchronous on the notifying task and at-most-once per change; there is
//! no replay for late subscribers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Opaque subscription id. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerHandle(u64);

struct Inner<T> {
    next: u64,
    listeners: BTreeMap<u64, Listener<T>>,
}

pub struct ListenerRegistry<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        ListenerRegistry {
            inner: Mutex::new(Inner {
                next: 1,
                listeners: BTreeMap::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next;
        inner.next += 1;
        inner.listeners.insert(id, Arc::new(listener));
        ListenerHandle(id)
    }

    /// Remove a listener. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: ListenerHandle) {
        self.lock().listeners.remove(&handle.0);
    }

    /// Invoke every registered listener with `value`.
    ///
    /// Listeners are snapshotted first and called without the lock held, so
    /// a listener may subscribe or unsubscribe (itself included). Changes
    /// take effect from the next notification.
    pub fn notify_all(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self.lock().listeners.values().cloned().collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    #[test]
    fn notifies_every_subscriber() {
        let registry = ListenerRegistry::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = total.clone();
            registry.subscribe(move |v| {
                total.fetch_add(*v as usize, Ordering::SeqCst);
            });
        }
        registry.notify_all(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_ignores_unknown() {
        let registry = ListenerRegistry::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handle = registry.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify_all(&());
        registry.unsubscribe(handle);
        registry.unsubscribe(handle);
        registry.unsubscribe(ListenerHandle(999));
        registry.notify_all(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn handles_are_never_reused() {
        let registry = ListenerRegistry::<()>::new();
        let a = registry.subscribe(|_| {});
        let b = registry.subscribe(|_| {});
        registry.unsubscribe(b);
        let c = registry.subscribe(|_| {});
        assert_ne!(c, b);
        assert!(c > a && c > b);
    }

    #[test]
    fn listener_can_unsubscribe_itself() {
        let registry = Arc::new(ListenerRegistry::<()>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_handle: Arc<OnceLock<ListenerHandle>> = Arc::new(OnceLock::new());

        let handle = {
            let registry = registry.clone();
            let calls = calls.clone();
            let own_handle = own_handle.clone();
            registry.clone().subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(h) = own_handle.get() {
                    registry.unsubscribe(*h);
                }
            })
        };
        own_handle.set(handle).unwrap();

        registry.notify_all(&());
        registry.notify_all(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_can_subscribe_during_notification() {
        let registry = Arc::new(ListenerRegistry::<()>::new());
        let r = registry.clone();
        registry.subscribe(move |_| {
            r.subscribe(|_| {});
        });

        registry.notify_all(&());
        assert_eq!(registry.len(), 2);
    }
}
