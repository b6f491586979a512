use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Observers<E> {
    next_id: u64,
    slots: Vec<(u64, Callback<E>)>,
}

/// An ordered observer list for events of type `E`.
///
/// Observers run in registration order, never under a lock, so a callback
/// may read or mutate whatever notified it. Cloning a `Signal` yields
/// another handle to the same observer list.
pub struct Signal<E> {
    observers: Arc<Mutex<Observers<E>>>,
}

impl<E> Clone for Signal<E> {
    fn clone(&self) -> Self {
        Self {
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self {
            observers: Arc::new(Mutex::new(Observers {
                next_id: 0,
                slots: Vec::new(),
            })),
        }
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<E> Signal<E> {
    pub fn observer_count(&self) -> usize {
        lock(&self.observers).slots.len()
    }
}

impl<E: 'static> Signal<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f`; it stays registered until the returned handle is dropped.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, f: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut obs = lock(&self.observers);
            let id = obs.next_id;
            obs.next_id += 1;
            obs.slots.push((id, Arc::new(f)));
            id
        };
        let weak: Weak<Mutex<Observers<E>>> = Arc::downgrade(&self.observers);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(observers) = weak.upgrade() {
                    lock(&observers).slots.retain(|(slot_id, _)| *slot_id != id);
                }
            })),
        }
    }

    /// Call every observer with `event`.
    pub fn emit(&self, event: &E) {
        // Snapshot so callbacks can subscribe/unsubscribe without deadlocking.
        let callbacks: Vec<Callback<E>> = lock(&self.observers)
            .slots
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(event);
        }
    }

}

/// Handle for a registered observer. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Keep the observer registered for the lifetime of the signal.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Per-node switch that suppresses that node's own notifications.
///
/// Blocking is not inherited: descendants keep notifying, and their
/// propagation into a blocked node stops there.
#[derive(Debug, Default)]
pub struct NotifyGate {
    blocked: AtomicBool,
}

impl NotifyGate {
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    /// Set the blocked state, returning the previous one.
    pub fn set_blocked(&self, blocked: bool) -> bool {
        self.blocked.swap(blocked, Ordering::AcqRel)
    }

    /// Block until the returned guard is dropped, then restore the previous state.
    pub fn block(&self) -> NotifyBlock<'_> {
        let previous = self.set_blocked(true);
        NotifyBlock {
            gate: self,
            previous,
        }
    }
}

/// Scoped notification block returned by [`NotifyGate::block`].
#[must_use = "notifications are unblocked as soon as the guard is dropped"]
pub struct NotifyBlock<'a> {
    gate: &'a NotifyGate,
    previous: bool,
}

impl Drop for NotifyBlock<'_> {
    fn drop(&mut self) {
        self.gate.set_blocked(self.previous);
    }
}

/// Lock a mutex, recovering the data if a callback panicked while holding it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
