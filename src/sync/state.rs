// src/sync/state.rs
use crate::models::notification::{InboxPage, Notification};

/// Aggregate the engine owns and publishes to observers.
///
/// `unread_count` is the server's counter from the last full fetch, moved by
/// local deltas in between. It is not recomputed from `notifications`, which
/// only holds the most recent page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
    pub connection_health: bool,
    pub is_loading: bool,
}

impl InboxState {
    pub fn find(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Full resync: server order and counter are taken as-is.
    pub(crate) fn replace_page(&mut self, page: InboxPage) {
        self.notifications = page.notifications;
        self.unread_count = page.unread_count;
    }

    /// Push arrival. Duplicate ids are kept as separate entries.
    pub(crate) fn prepend(&mut self, notification: Notification) {
        if !notification.is_read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
    }

    /// Returns whether anything changed. Unknown ids and entries that are
    /// already read leave the counter alone.
    pub(crate) fn mark_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(entry) if !entry.is_read => {
                entry.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn mark_all_read(&mut self) -> bool {
        let changed = self.unread_count != 0 || self.notifications.iter().any(|n| !n.is_read);
        for entry in &mut self.notifications {
            entry.is_read = true;
        }
        self.unread_count = 0;
        changed
    }

    /// Removes the first entry with `id`.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.notifications.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = self.notifications.remove(pos);
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        true
    }

    pub(crate) fn clear(&mut self) -> bool {
        let changed = !self.notifications.is_empty() || self.unread_count != 0;
        self.notifications.clear();
        self.unread_count = 0;
        changed
    }
}
