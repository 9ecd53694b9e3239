//! Session store with synchronous change notification.
//!
//! DESIGN
//! ======
//! One `Session` behind a mutex, swapped whole on every write. Each write
//! queues its value for delivery under the same lock, so the queue order is
//! the write order. Subscribers are invoked after the lock is released, and
//! only one caller drains the queue at a time: concurrent writers cannot
//! reorder notifications, and a subscriber may read or write the store
//! without deadlocking. A write made while another caller is draining is
//! delivered by that caller before it returns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::session::Session;

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

/// Shared handle to the session value; clones observe the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    session: Session,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
    pending: VecDeque<(Session, Vec<Listener>)>,
    delivering: bool,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_session(Session::loading())
    }

    #[must_use]
    pub fn with_session(session: Session) -> Self {
        let inner = StoreInner {
            session,
            listeners: Vec::new(),
            next_id: 0,
            pending: VecDeque::new(),
            delivering: false,
        };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    #[must_use]
    pub fn get(&self) -> Session {
        self.lock().session.clone()
    }

    /// Replace the session and notify subscribers.
    pub fn set(&self, session: Session) {
        self.update(move |_| session);
    }

    /// Derive the next session from the current one atomically, then notify.
    pub fn update(&self, next: impl FnOnce(&Session) -> Session) -> Session {
        let session = {
            let mut inner = self.lock();
            let session = next(&inner.session);
            inner.session = session.clone();
            let listeners = inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            inner.pending.push_back((session.clone(), listeners));
            if inner.delivering {
                return session;
            }
            inner.delivering = true;
            session
        };
        self.deliver_pending();
        session
    }

    /// Register a callback run after every write. Dropping the returned
    /// handle unsubscribes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription { id, store: Arc::downgrade(&self.inner) }
    }

    fn deliver_pending(&self) {
        let _reset = DeliveryReset(self);
        loop {
            let (session, listeners) = {
                let mut inner = self.lock();
                let Some(next) = inner.pending.pop_front() else {
                    inner.delivering = false;
                    return;
                };
                next
            };
            for listener in &listeners {
                listener(&session);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands delivery back to the next writer if a subscriber panics mid-drain.
struct DeliveryReset<'a>(&'a SessionStore);

impl Drop for DeliveryReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inner = self.0.lock();
            inner.pending.clear();
            inner.delivering = false;
        }
    }
}

/// Handle returned by [`SessionStore::subscribe`].
pub struct Subscription {
    id: u64,
    store: Weak<Mutex<StoreInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
