//! # Listener Registry
//!
//! Synchronous callbacks with stable ids. Used for sync status updates and
//! realtime event fan-out.
//!
//! A listener that panics is logged and skipped; the remaining listeners
//! still run. Callbacks are invoked outside the registry lock, so a listener
//! may add or remove listeners while being notified.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// Identifies a registered listener.
pub type ListenerId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct ListenerRegistry<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Callback<T>)>>,
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        ListenerRegistry {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the id was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every listener with `value`. Returns how many completed.
    pub fn notify(&self, value: &T) -> usize {
        let snapshot: Vec<(ListenerId, Callback<T>)> = self.lock().clone();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(listener_id = id, "Listener panicked"),
            }
        }
        delivered
    }

    /// Calls a single listener. Returns false if it is unknown or panicked.
    pub fn notify_one(&self, id: ListenerId, value: &T) -> bool {
        let listener = self
            .lock()
            .iter()
            .find(|(lid, _)| *lid == id)
            .map(|(_, l)| l.clone());

        match listener {
            Some(listener) => match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(()) => true,
                Err(_) => {
                    error!(listener_id = id, "Listener panicked");
                    false
                }
            },
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Callback<T>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`. Call [`Subscription::unsubscribe`] to stop
/// receiving updates; dropping the handle keeps the listener registered.
pub struct Subscription<T> {
    registry: Arc<ListenerRegistry<T>>,
    id: ListenerId,
}

impl<T> Subscription<T> {
    pub(crate) fn new(registry: Arc<ListenerRegistry<T>>, id: ListenerId) -> Self {
        Subscription { registry, id }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unsubscribe(self) -> bool {
        self.registry.remove(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_reaches_every_listener() {
        let registry = ListenerRegistry::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = total.clone();
            registry.add(move |v| {
                total.fetch_add(*v as usize, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.notify(&2), 3);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::<&'static str>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        registry.add(|_| panic!("listener failure"));
        let counter = seen.clone();
        registry.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.notify(&"event"), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_and_unsubscribe() {
        let registry = Arc::new(ListenerRegistry::<()>::new());
        let first = registry.add(|_| {});
        let second = registry.add(|_| {});

        assert!(registry.remove(first));
        assert!(!registry.remove(first));

        let subscription = Subscription::new(registry.clone(), second);
        assert!(subscription.unsubscribe());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_may_unregister_during_notify() {
        let registry = Arc::new(ListenerRegistry::<()>::new());
        let inner = registry.clone();
        let id = Arc::new(AtomicU64::new(0));
        let id_ref = id.clone();

        let registered = registry.add(move |_| {
            inner.remove(id_ref.load(Ordering::SeqCst));
        });
        id.store(registered, Ordering::SeqCst);

        assert_eq!(registry.notify(&()), 1);
        assert!(registry.is_empty());
    }
}
