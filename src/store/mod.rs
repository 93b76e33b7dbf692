// Session store
//
// Process-wide key/value store holding the current actor's role, identity and
// credentials. Every mutation is persisted through a `StorageBackend` and then
// announced synchronously to in-process listeners, so anything caching session
// data (menus, selected child) can invalidate before the next render.

mod keys;
mod storage;

pub use keys::{KeyScope, SessionKey};
pub use storage::{
    atomic_write, DisabledStorage, FileStorage, MemoryStorage,
    SessionEntries, StorageBackend,
};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::session::{Role, SessionState};

/// Change notification delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A key was written (new or changed value)
    Set { key: SessionKey },
    /// A key was deleted
    Removed { key: SessionKey },
    /// A session transition committed; `current` is the role now in effect
    RoleChanged { previous: Role, current: Role },
}

/// Receives session change notifications
pub trait SessionListener: Send + Sync {
    fn on_session_event(&self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_session_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Handle returned by [`SessionStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A single change in a batched update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Set(SessionKey, String),
    Remove(SessionKey),
}

pub struct SessionStore {
    storage: Box<dyn StorageBackend>,
    entries: Mutex<SessionEntries>,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn SessionListener>)>>,
    next_subscription: AtomicU64,
}

impl SessionStore {
    /// Open a store over `storage`, loading whatever it already holds.
    ///
    /// Unreadable storage starts an empty session.
    pub fn open(storage: impl StorageBackend + 'static) -> Self {
        let entries = match storage.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Session storage unavailable, starting empty: {:#}", e);
                SessionEntries::new()
            }
        };

        Self {
            storage: Box::new(storage),
            entries: Mutex::new(entries),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Store backed by process memory only
    pub fn in_memory() -> Self {
        Self::open(MemoryStorage::new())
    }

    pub fn get(&self, key: SessionKey) -> Option<String> {
        self.lock_entries().get(&key).cloned()
    }

    pub fn contains(&self, key: SessionKey) -> bool {
        self.lock_entries().contains_key(&key)
    }

    pub fn set(&self, key: SessionKey, value: impl Into<String>) {
        self.apply(vec![Change::Set(key, value.into())]);
    }

    pub fn remove(&self, key: SessionKey) {
        self.apply(vec![Change::Remove(key)]);
    }

    /// Delete exactly `keys`, leaving every other key alone
    pub fn clear(&self, keys: &BTreeSet<SessionKey>) {
        self.apply(keys.iter().copied().map(Change::Remove).collect());
    }

    /// Apply several changes with a single persist.
    ///
    /// If the storage refuses the write, removals still take effect in memory
    /// but writes are dropped, so a broken store can only lose session data.
    pub fn apply(&self, changes: Vec<Change>) {
        let events = {
            let mut entries = self.lock_entries();

            let mut next = entries.clone();
            let mut events = Vec::new();
            for change in &changes {
                match change {
                    Change::Set(key, value) => {
                        if next.get(key) != Some(value) {
                            next.insert(*key, value.clone());
                            events.push(SessionEvent::Set { key: *key });
                        }
                    }
                    Change::Remove(key) => {
                        if next.remove(key).is_some() {
                            events.push(SessionEvent::Removed { key: *key });
                        }
                    }
                }
            }

            if events.is_empty() {
                return;
            }

            match self.storage.persist(&next) {
                Ok(()) => {
                    *entries = next;
                    events
                }
                Err(e) => {
                    tracing::warn!("Failed to persist session change: {:#}", e);
                    let mut removed = Vec::new();
                    for change in &changes {
                        if let Change::Remove(key) = change {
                            if entries.remove(key).is_some() {
                                removed.push(SessionEvent::Removed { key: *key });
                            }
                        }
                    }
                    removed
                }
            }
        };

        for event in &events {
            self.publish(event);
        }
    }

    /// Register a listener; it is invoked synchronously after every change
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock_listeners().retain(|(existing, _)| *existing != id);
    }

    /// Deliver `event` to every listener.
    ///
    /// Listeners run outside the store locks and may read the store.
    pub fn publish(&self, event: &SessionEvent) {
        let listeners: Vec<Arc<dyn SessionListener>> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener.on_session_event(event);
        }
    }

    /// Role routing sees: the recorded role, if its session decodes
    pub fn role(&self) -> Role {
        self.snapshot().role()
    }

    /// Typed view of the store, decoded fresh on every call
    pub fn snapshot(&self) -> SessionState {
        SessionState::from_entries(&self.lock_entries())
    }

    /// Copy of the raw entries
    pub fn entries(&self) -> SessionEntries {
        self.lock_entries().clone()
    }

    fn lock_entries(&self) -> MutexGuard<'_, SessionEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn SessionListener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
