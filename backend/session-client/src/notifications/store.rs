//! Client-side notification cache.
//!
//! Reconciles the REST snapshot and pushed single events into one newest-first,
//! id-deduplicated list plus an unread counter. Entries live in an id-indexed
//! map; display order is a separate deque of ids.
//!
//! The counter moves by deltas from the last snapshot, floored at zero, so
//! `unread_count == count(!is_read)` holds after every mutation whenever the
//! snapshot it started from was consistent.

use super::model::Notification;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

/// What subscribers (badge, dropdown) see after each mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

#[derive(Default)]
struct StoreState {
    order: VecDeque<String>,
    entries: HashMap<String, Notification>,
    unread_count: u64,
}

impl StoreState {
    fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            notifications: self
                .order
                .iter()
                .filter_map(|id| self.entries.get(id).cloned())
                .collect(),
            unread_count: self.unread_count,
        }
    }

    fn decrement_unread(&mut self) {
        self.unread_count = self.unread_count.saturating_sub(1);
    }
}

#[derive(Clone)]
pub struct NotificationStore {
    state: Arc<RwLock<StoreState>>,
    updates: Arc<watch::Sender<NotificationSnapshot>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(NotificationSnapshot::default());
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            updates: Arc::new(updates),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.updates.subscribe()
    }

    /// Replace the cached list and counter wholesale.
    ///
    /// Repeated ids in `list` keep their first occurrence.
    pub fn load_snapshot(&self, list: Vec<Notification>, unread_count: u64) {
        self.mutate(|state| {
            state.order.clear();
            state.entries.clear();
            for notification in list {
                if state.entries.contains_key(&notification.id) {
                    continue;
                }
                state.order.push_back(notification.id.clone());
                state.entries.insert(notification.id.clone(), notification);
            }
            state.unread_count = unread_count;
        });
    }

    /// Prepend a pushed notification unless its id is already cached.
    ///
    /// Returns whether the store changed.
    pub fn apply_pushed(&self, notification: Notification) -> bool {
        self.mutate(|state| {
            if state.entries.contains_key(&notification.id) {
                return false;
            }
            if !notification.is_read {
                state.unread_count += 1;
            }
            state.order.push_front(notification.id.clone());
            state.entries.insert(notification.id.clone(), notification);
            true
        })
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.mutate(|state| match state.entries.get_mut(id) {
            Some(entry) if !entry.is_read => {
                entry.is_read = true;
                entry.read_at = Some(Utc::now());
                state.decrement_unread();
                true
            }
            _ => false,
        })
    }

    /// Undo a `mark_read` whose remote persistence failed
    pub fn mark_unread(&self, id: &str) -> bool {
        self.mutate(|state| match state.entries.get_mut(id) {
            Some(entry) if entry.is_read => {
                entry.is_read = false;
                entry.read_at = None;
                state.unread_count += 1;
                true
            }
            _ => false,
        })
    }

    /// Returns the ids that flipped to read
    pub fn mark_all_read(&self) -> Vec<String> {
        self.mutate(|state| {
            let now = Utc::now();
            let mut changed = Vec::new();
            for id in &state.order {
                if let Some(entry) = state.entries.get_mut(id) {
                    if !entry.is_read {
                        entry.is_read = true;
                        entry.read_at = Some(now);
                        changed.push(id.clone());
                    }
                }
            }
            state.unread_count = 0;
            changed
        })
    }

    /// Remove an entry, returning its display position for a later `restore`
    pub fn remove(&self, id: &str) -> Option<(usize, Notification)> {
        self.mutate(|state| {
            let index = state.order.iter().position(|entry| entry == id)?;
            state.order.remove(index);
            let removed = state.entries.remove(id)?;
            if !removed.is_read {
                state.decrement_unread();
            }
            Some((index, removed))
        })
    }

    /// Put back an entry taken out by `remove`
    pub fn restore(&self, index: usize, notification: Notification) -> bool {
        self.mutate(|state| {
            if state.entries.contains_key(&notification.id) {
                return false;
            }
            if !notification.is_read {
                state.unread_count += 1;
            }
            let index = index.min(state.order.len());
            state.order.insert(index, notification.id.clone());
            state.entries.insert(notification.id.clone(), notification);
            true
        })
    }

    /// Server-authoritative counter refresh
    pub fn set_unread_count(&self, unread_count: u64) {
        self.mutate(|state| state.unread_count = unread_count);
    }

    pub fn clear(&self) {
        self.load_snapshot(Vec::new(), 0);
    }

    pub fn unread_count(&self) -> u64 {
        self.state.read().unread_count
    }

    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.state.read().entries.get(id).cloned()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.state.read().snapshot()
    }

    // Publishing under the write lock keeps subscriber order equal to mutation order
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.write();
        let result = f(&mut state);
        self.updates.send_replace(state.snapshot());
        result
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}
