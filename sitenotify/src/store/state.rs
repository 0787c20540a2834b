//! Notification state and its transitions.
//!
//! Every transition takes the latest snapshot and mutates it in place; the
//! store applies them through its watch channel so interleaved completions
//! never work on a stale copy.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Notification, NotificationId};

/// What the presentation layer sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationState {
    /// Most recent notifications, newest arrival first, bounded by the store capacity.
    pub notifications: Vec<Notification>,
    /// Unread notifications on the server, tracked independently of the list.
    pub unread_count: u32,
    /// Whether a list fetch is in flight.
    pub loading: bool,
    #[serde(skip)]
    in_flight: u32,
    /// Pushed while a list fetch was in flight; kept across the page swap.
    #[serde(skip)]
    pushed_while_loading: Vec<NotificationId>,
}

/// Result of marking one notification read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkRead {
    /// Marked locally; `decremented` is what came off the unread count.
    Applied { decremented: u32 },
    /// Already read locally.
    AlreadyRead,
    /// Not in the local list.
    Absent,
}

/// What marking everything read changed, for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkAll {
    pub ids: Vec<NotificationId>,
    pub previous_unread: u32,
}

/// A notification taken out of the list, for rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub index: usize,
    pub notification: Notification,
    pub decremented: u32,
}

/// Result of receiving a pushed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Prepended; `evicted` fell off the end of the list.
    Added { evicted: Vec<NotificationId> },
    /// The id was already known; the existing entry was kept.
    Duplicate,
}

impl NotificationState {
    /// Look up a notification by id.
    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| &n.id == id)
    }

    /// Whether the id is in the list.
    pub fn contains(&self, id: &NotificationId) -> bool {
        self.get(id).is_some()
    }

    /// Unread notifications among the ones held locally.
    pub fn unread_in_list(&self) -> usize {
        self.notifications.iter().filter(|n| n.is_unread()).count()
    }

    pub(crate) fn begin_load(&mut self) {
        self.in_flight += 1;
        self.loading = true;
    }

    pub(crate) fn end_load(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.loading = self.in_flight > 0;
        if !self.loading {
            self.pushed_while_loading.clear();
        }
    }

    /// Replace the list with a fetched page.
    ///
    /// Notifications pushed while the fetch was in flight and missing from the
    /// page stay in front of it.
    pub(crate) fn apply_page(&mut self, page: Vec<Notification>, capacity: usize) {
        let in_page: HashSet<NotificationId> = page.iter().map(|n| n.id.clone()).collect();
        let mut seen = HashSet::new();

        let pushed = self
            .notifications
            .iter()
            .filter(|n| self.pushed_while_loading.contains(&n.id) && !in_page.contains(&n.id))
            .cloned()
            .collect::<Vec<_>>();

        self.notifications = pushed
            .into_iter()
            .chain(page)
            .filter(|n| seen.insert(n.id.clone()))
            .take(capacity)
            .collect();
    }

    pub(crate) fn set_unread_count(&mut self, count: u32) {
        self.unread_count = count;
    }

    pub(crate) fn mark_read(&mut self, id: &NotificationId, at: DateTime<Utc>) -> MarkRead {
        let Some(noti) = self.notifications.iter_mut().find(|n| &n.id == id) else {
            return MarkRead::Absent;
        };
        if noti.read_at.is_some() {
            return MarkRead::AlreadyRead;
        }

        noti.read_at = Some(at);
        let decremented = u32::from(self.unread_count > 0);
        self.unread_count -= decremented;
        MarkRead::Applied { decremented }
    }

    /// Undo [`mark_read`](Self::mark_read) if the entry still carries `at`.
    pub(crate) fn unmark_read(&mut self, id: &NotificationId, at: DateTime<Utc>, decremented: u32) {
        if let Some(noti) = self.notifications.iter_mut().find(|n| &n.id == id) {
            if noti.read_at == Some(at) {
                noti.read_at = None;
            }
        }
        self.unread_count = self.unread_count.saturating_add(decremented);
    }

    pub(crate) fn mark_all_read(&mut self, at: DateTime<Utc>) -> MarkAll {
        let ids = self
            .notifications
            .iter_mut()
            .filter(|n| n.read_at.is_none())
            .map(|n| {
                n.read_at = Some(at);
                n.id.clone()
            })
            .collect();

        MarkAll {
            ids,
            previous_unread: std::mem::take(&mut self.unread_count),
        }
    }

    /// Undo [`mark_all_read`](Self::mark_all_read); pushes since then stay counted.
    ///
    /// Listed notifications only count again if they are still present and
    /// still carry `at`; the rest of the old count is restored as is.
    pub(crate) fn unmark_all_read(&mut self, undo: &MarkAll, at: DateTime<Utc>) {
        let off_list = undo.previous_unread.saturating_sub(undo.ids.len() as u32);
        let mut restored = 0u32;
        for noti in self
            .notifications
            .iter_mut()
            .filter(|n| n.read_at == Some(at) && undo.ids.contains(&n.id))
        {
            noti.read_at = None;
            restored += 1;
        }
        self.unread_count = self
            .unread_count
            .saturating_add(off_list)
            .saturating_add(restored);
    }

    pub(crate) fn remove(&mut self, id: &NotificationId) -> Option<Removed> {
        let index = self.notifications.iter().position(|n| &n.id == id)?;
        let notification = self.notifications.remove(index);

        let decremented = u32::from(notification.is_unread() && self.unread_count > 0);
        self.unread_count -= decremented;

        Some(Removed {
            index,
            notification,
            decremented,
        })
    }

    /// Put a removed notification back where it was, unless it reappeared meanwhile.
    pub(crate) fn restore(&mut self, removed: Removed, capacity: usize) {
        self.unread_count = self.unread_count.saturating_add(removed.decremented);
        if self.contains(&removed.notification.id) {
            return;
        }

        let index = removed.index.min(self.notifications.len());
        self.notifications.insert(index, removed.notification);
        self.notifications.truncate(capacity);
    }

    pub(crate) fn receive(&mut self, notification: Notification, capacity: usize) -> Received {
        if self.contains(&notification.id) {
            return Received::Duplicate;
        }

        self.unread_count = self.unread_count.saturating_add(1);
        if self.loading {
            self.pushed_while_loading.push(notification.id.clone());
        }

        self.notifications.insert(0, notification);
        let evicted = if self.notifications.len() > capacity {
            self.notifications
                .drain(capacity..)
                .map(|n| n.id)
                .collect()
        } else {
            Vec::new()
        };

        Received::Added { evicted }
    }
}
