use std::sync::{Arc, Mutex, PoisonError};

use crate::store::{SessionEvent, SessionKey, SessionListener, SessionStore, SubscriptionId};

/// In-process cache of the child currently selected in parent views.
///
/// Subscribes to the store and drops its cached value on any role change or
/// any write to `selected_child_id`, so a selection never survives a switch
/// between parent and kid mode.
pub struct SelectedChildCache {
    store: Arc<SessionStore>,
    cell: Arc<CacheCell>,
    subscription: SubscriptionId,
}

#[derive(Default)]
struct CacheCell {
    cached: Mutex<Option<Option<String>>>,
}

impl CacheCell {
    fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionListener for CacheCell {
    fn on_session_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::RoleChanged { .. }
            | SessionEvent::Set { key: SessionKey::SelectedChildId }
            | SessionEvent::Removed { key: SessionKey::SelectedChildId } => self.invalidate(),
            _ => {}
        }
    }
}

impl SelectedChildCache {
    pub fn attach(store: Arc<SessionStore>) -> Self {
        let cell = Arc::new(CacheCell::default());
        let subscription = store.subscribe(cell.clone());
        Self {
            store,
            cell,
            subscription,
        }
    }

    /// Currently selected child, read through to the store on a miss
    pub fn selected(&self) -> Option<String> {
        let mut cached = self.cell.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = cached.as_ref() {
            return value.clone();
        }

        let value = self.store.get(SessionKey::SelectedChildId);
        *cached = Some(value.clone());
        value
    }

    pub fn select(&self, child_id: &str) {
        self.store.set(SessionKey::SelectedChildId, child_id);
    }

    pub fn deselect(&self) {
        self.store.remove(SessionKey::SelectedChildId);
    }
}

impl Drop for SelectedChildCache {
    fn drop(&mut self) {
        self.store.unsubscribe(self.subscription);
    }
}
