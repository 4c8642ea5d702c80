//! Notification list with derived read-state.

use tracing::debug;

use tutoria_shared::models::{Notification, ReadReceipt};
use tutoria_shared::types::UserId;

/// Result of a local mark-read action.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAction {
    /// Whether the entry existed and was previously unread.
    pub flipped: bool,
    /// Acknowledgment to emit when the flipped entry carries linkage.
    pub receipt: Option<ReadReceipt>,
}

impl ReadAction {
    fn noop() -> Self {
        Self {
            flipped: false,
            receipt: None,
        }
    }
}

/// The single owner of one identity's notification list, newest first.
///
/// The unread count is always derived by filtering the list. There is no
/// stored counter to drift out of sync.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    entries: Vec<Notification>,
}

impl NotificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a bootstrap snapshot from the external store. Fetched copies
    /// win on conflict; local entries the fetch does not know yet (live
    /// arrivals racing the poll) are kept. Order is restored to newest
    /// first.
    pub fn bootstrap(&mut self, fetched: Vec<Notification>) {
        let mut merged = fetched;
        for existing in self.entries.drain(..) {
            if !merged.iter().any(|n| n.id == existing.id) {
                merged.push(existing);
            }
        }
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.entries = merged;
    }

    /// Prepend a live fanout entry, unless the local identity produced it
    /// or the id is already known. Returns whether the list changed.
    pub fn record_inbound(&mut self, notification: Notification, local: &UserId) -> bool {
        if notification.sender_id.as_ref() == Some(local) {
            debug!(id = %notification.id, "Own fanout entry skipped");
            return false;
        }
        if self.entries.iter().any(|n| n.id == notification.id) {
            debug!(id = %notification.id, "Duplicate notification skipped");
            return false;
        }
        self.entries.insert(0, notification);
        true
    }

    /// Flip one entry read.
    pub fn mark_read(&mut self, id: &str) -> ReadAction {
        let Some(entry) = self.entries.iter_mut().find(|n| n.id == id) else {
            return ReadAction::noop();
        };
        if entry.read {
            return ReadAction::noop();
        }
        entry.read = true;
        ReadAction {
            flipped: true,
            receipt: entry.read_receipt(),
        }
    }

    /// Flip every entry read. Returns one acknowledgment per
    /// previously-unread linked entry.
    pub fn mark_all_read(&mut self) -> Vec<ReadReceipt> {
        let mut receipts = Vec::new();
        for entry in self.entries.iter_mut().filter(|n| !n.read) {
            entry.read = true;
            if let Some(receipt) = entry.read_receipt() {
                receipts.push(receipt);
            }
        }
        receipts
    }

    /// Apply a read event from another device of this identity.
    /// Idempotent; unknown ids are ignored. Returns whether anything
    /// changed.
    pub fn apply_remote_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|n| n.id == id) {
            Some(entry) if !entry.read => {
                entry.read = true;
                true
            }
            _ => false,
        }
    }

    /// Derived, never stored.
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tutoria_shared::models::NotificationKind;
    use tutoria_shared::types::CourseId;

    fn me() -> UserId {
        UserId::from("u-me")
    }

    fn linked(id: &str, secs: u32, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            recipient_id: me(),
            kind: NotificationKind::PrivateMessage,
            text: format!("message {id}"),
            read,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, secs).unwrap(),
            course_id: Some(CourseId::from("crs-1")),
            student_id: Some(UserId::from("stu-1")),
            tutor_id: Some(UserId::from("tut-1")),
            sender_id: Some(UserId::from("stu-1")),
        }
    }

    fn unlinked(id: &str, secs: u32) -> Notification {
        Notification {
            course_id: None,
            student_id: None,
            tutor_id: None,
            kind: NotificationKind::CommunityMessage,
            ..linked(id, secs, false)
        }
    }

    fn assert_derived(tracker: &NotificationTracker) {
        let by_filter = tracker.entries().iter().filter(|n| !n.read).count();
        assert_eq!(tracker.unread_count(), by_filter);
    }

    #[test]
    fn test_unread_count_is_always_derived() {
        let mut tracker = NotificationTracker::new();
        tracker.record_inbound(linked("n-1", 1, false), &me());
        assert_derived(&tracker);
        tracker.record_inbound(linked("n-2", 2, false), &me());
        assert_derived(&tracker);
        tracker.mark_read("n-1");
        assert_derived(&tracker);
        tracker.record_inbound(unlinked("n-3", 3), &me());
        assert_derived(&tracker);
        tracker.mark_all_read();
        assert_derived(&tracker);
        assert_eq!(tracker.unread_count(), 0);
        tracker.apply_remote_read("n-2");
        assert_derived(&tracker);
    }

    #[test]
    fn test_mark_all_read_acks_each_unread_linked_entry() {
        let mut tracker = NotificationTracker::new();
        tracker.bootstrap(vec![
            linked("n-1", 1, true),
            linked("n-2", 2, true),
            linked("n-3", 3, false),
            linked("n-4", 4, false),
            linked("n-5", 5, false),
        ]);
        assert_eq!(tracker.unread_count(), 3);

        let receipts = tracker.mark_all_read();
        assert_eq!(receipts.len(), 3);
        assert_eq!(tracker.unread_count(), 0);

        let mut acked: Vec<_> = receipts.iter().map(|r| r.notification_id.as_str()).collect();
        acked.sort();
        assert_eq!(acked, vec!["n-3", "n-4", "n-5"]);
    }

    #[test]
    fn test_unlinked_entries_flip_without_ack() {
        let mut tracker = NotificationTracker::new();
        tracker.record_inbound(unlinked("n-1", 1), &me());

        let action = tracker.mark_read("n-1");
        assert!(action.flipped);
        assert!(action.receipt.is_none());
        assert_eq!(tracker.unread_count(), 0);
    }

    #[test]
    fn test_own_fanout_entry_is_skipped() {
        let mut tracker = NotificationTracker::new();
        let mut own = linked("n-1", 1, false);
        own.sender_id = Some(me());

        assert!(!tracker.record_inbound(own, &me()));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_duplicate_inbound_is_skipped() {
        let mut tracker = NotificationTracker::new();
        assert!(tracker.record_inbound(linked("n-1", 1, false), &me()));
        assert!(!tracker.record_inbound(linked("n-1", 1, false), &me()));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_inbound_prepends_newest_first() {
        let mut tracker = NotificationTracker::new();
        tracker.record_inbound(linked("n-1", 1, false), &me());
        tracker.record_inbound(linked("n-2", 2, false), &me());
        assert_eq!(tracker.entries()[0].id, "n-2");
    }

    #[test]
    fn test_remote_read_is_idempotent() {
        let mut tracker = NotificationTracker::new();
        tracker.record_inbound(linked("n-1", 1, false), &me());

        assert!(tracker.apply_remote_read("n-1"));
        assert!(!tracker.apply_remote_read("n-1"));
        assert!(!tracker.apply_remote_read("n-unknown"));
        assert_eq!(tracker.unread_count(), 0);
    }

    #[test]
    fn test_mark_read_on_read_or_missing_entry_is_noop() {
        let mut tracker = NotificationTracker::new();
        tracker.bootstrap(vec![linked("n-1", 1, true)]);

        assert_eq!(tracker.mark_read("n-1"), ReadAction::noop());
        assert_eq!(tracker.mark_read("n-ghost"), ReadAction::noop());
    }

    #[test]
    fn test_bootstrap_merges_fetch_with_raced_live_entries() {
        let mut tracker = NotificationTracker::new();
        // live entry arrives before the poll knows about it
        tracker.record_inbound(linked("n-live", 9, false), &me());
        // a stale local copy the fetch now reports as read
        tracker.record_inbound(linked("n-2", 2, false), &me());

        tracker.bootstrap(vec![linked("n-1", 1, false), linked("n-2", 2, true)]);

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.entries()[0].id, "n-live");
        assert_eq!(tracker.entries()[1].id, "n-2");
        assert!(tracker.entries()[1].read, "fetched state wins");
        assert_eq!(tracker.entries()[2].id, "n-1");
    }
}
