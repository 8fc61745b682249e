use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use core_types::{ListingId, NotificationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    NewBid,
    Sale,
    BreakFull,
    BreakScheduled,
    BreakStart,
    BreakEnd,
    BreakCancelled,
    BreakExpired,
    EntryRemoved,
    FundsReleased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub link_to: Option<ListingId>,
    pub created_at: DateTime<Utc>,
}

/// Fire-and-forget delivery. The engine emits on state transitions and never
/// waits on the sink.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: Notification);
}

/// In-memory sink; append-only apart from read-state toggles.
pub struct NotificationLog {
    rows: RwLock<Vec<Notification>>,
    next_id: RwLock<NotificationId>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: RwLock::new(1),
        }
    }

    pub fn for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.rows
            .read()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn unread_count(&self, user_id: UserId) -> usize {
        self.rows
            .read()
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count()
    }

    pub fn mark_read(&self, id: NotificationId) -> bool {
        let mut rows = self.rows.write();
        match rows.iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self, user_id: UserId) {
        for n in self
            .rows
            .write()
            .iter_mut()
            .filter(|n| n.user_id == user_id)
        {
            n.is_read = true;
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for NotificationLog {
    fn deliver(&self, mut notification: Notification) {
        let mut next_id = self.next_id.write();
        notification.id = *next_id;
        *next_id += 1;
        self.rows.write().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(user_id: UserId, kind: NotificationKind) -> Notification {
        Notification {
            id: 0,
            user_id,
            kind,
            title: "t".to_string(),
            message: "m".to_string(),
            is_read: false,
            link_to: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn log_assigns_ids_and_tracks_read_state() {
        let log = NotificationLog::new();
        log.deliver(notification(1, NotificationKind::NewBid));
        log.deliver(notification(1, NotificationKind::Sale));
        log.deliver(notification(2, NotificationKind::BreakFull));

        assert_eq!(log.unread_count(1), 2);
        let first = log.for_user(1)[0].clone();
        assert!(log.mark_read(first.id));
        assert_eq!(log.unread_count(1), 1);

        log.mark_all_read(1);
        assert_eq!(log.unread_count(1), 0);
        assert_eq!(log.unread_count(2), 1);
    }
}
