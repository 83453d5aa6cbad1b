//! Registration-ordered callback sets shared by the state store and the auth channel

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub(crate) type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

type Slots<A> = Mutex<Vec<(u64, Listener<A>)>>;

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ListenerSet<A> {
    slots: Arc<Slots<A>>,
    next_id: AtomicU64,
}

impl<A: 'static> ListenerSet<A> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, listener: Listener<A>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.slots).push((id, listener));

        let weak: Weak<Slots<A>> = Arc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = weak.upgrade() {
                lock(&slots).retain(|(slot, _)| *slot != id);
            }
        })
    }

    /// Listeners in registration order. Cloned out so callbacks run unlocked.
    pub(crate) fn snapshot(&self) -> Vec<Listener<A>> {
        lock(&self.slots).iter().map(|(_, l)| l.clone()).collect()
    }

    pub(crate) fn emit(&self, arg: &A) {
        for listener in self.snapshot() {
            listener(arg);
        }
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.slots).len()
    }
}

/// Handle returned by every `subscribe`-style call.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to stop delivery.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(dispose: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unsubscribe_stops_delivery() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let sub = set.add(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        set.emit(&1);
        sub.unsubscribe();
        set.emit(&2);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn emits_in_registration_order() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            let _ = set.add(Arc::new(move |_| lock(&seen).push(tag)));
        }
        set.emit(&0);
        assert_eq!(*lock(&seen), vec!["first", "second"]);
    }
}
