//! Conversation list with latest-activity ordering.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tutoria_shared::models::ChatMessage;
use tutoria_shared::types::ConversationId;

/// Latest-message summary shown on a conversation row.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatestActivity {
    pub preview: String,
    pub at: DateTime<Utc>,
    pub has_image: bool,
}

impl LatestActivity {
    pub fn of(message: &ChatMessage) -> Self {
        Self {
            preview: message.preview(),
            at: message.sent_at,
            has_image: message.has_image(),
        }
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub conversation: ConversationId,
    pub title: String,
    pub latest: Option<LatestActivity>,
}

/// Every conversation known to this identity, rendered most recently
/// active first.
#[derive(Debug, Default)]
pub struct ConversationDirectory {
    entries: Vec<ConversationEntry>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or retitle a conversation without touching its activity.
    pub fn upsert(&mut self, conversation: ConversationId, title: impl Into<String>) {
        let title = title.into();
        match self.entry_mut(&conversation) {
            Some(entry) => entry.title = title,
            None => self.entries.push(ConversationEntry {
                conversation,
                title,
                latest: None,
            }),
        }
    }

    /// Record message activity. Creates the row with a provisional title
    /// when the bootstrap has not named this conversation yet, and never
    /// lets an older history tail regress a newer summary.
    pub fn record_activity(&mut self, conversation: &ConversationId, message: &ChatMessage) {
        let summary = LatestActivity::of(message);
        match self.entry_mut(conversation) {
            Some(entry) => {
                let newer = entry.latest.as_ref().map_or(true, |l| summary.at >= l.at);
                if newer {
                    entry.latest = Some(summary);
                }
            }
            None => self.entries.push(ConversationEntry {
                conversation: conversation.clone(),
                title: conversation.course_id().as_str().to_string(),
                latest: Some(summary),
            }),
        }
    }

    pub fn get(&self, conversation: &ConversationId) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| e.conversation == *conversation)
    }

    /// Rows sorted newest activity first; idle rows last, by title.
    pub fn sorted(&self) -> Vec<&ConversationEntry> {
        let mut rows: Vec<&ConversationEntry> = self.entries.iter().collect();
        rows.sort_by(|a, b| match (&a.latest, &b.latest) {
            (Some(x), Some(y)) => y.at.cmp(&x.at),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.title.cmp(&b.title),
        });
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, conversation: &ConversationId) -> Option<&mut ConversationEntry> {
        self.entries.iter_mut().find(|e| e.conversation == *conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tutoria_shared::models::{DeliveryStatus, ImageAttachment};

    fn message(body: &str, secs: u32) -> ChatMessage {
        ChatMessage {
            id: None,
            client_ref: None,
            author_name: "Bob".to_string(),
            author_id: None,
            body: body.to_string(),
            image: None,
            sent_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, secs).unwrap(),
            status: DeliveryStatus::Delivered,
        }
    }

    #[test]
    fn test_most_recent_activity_sorts_first() {
        let mut directory = ConversationDirectory::new();
        let (c1, c2, c3) = (
            ConversationId::community("crs-1"),
            ConversationId::community("crs-2"),
            ConversationId::community("crs-3"),
        );
        directory.upsert(c1.clone(), "Algebra");
        directory.upsert(c2.clone(), "Biology");
        directory.upsert(c3.clone(), "Chemistry");

        directory.record_activity(&c1, &message("t1", 10));
        directory.record_activity(&c2, &message("t2", 20));
        directory.record_activity(&c3, &message("t3", 30));

        let titles: Vec<_> = directory.sorted().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Chemistry", "Biology", "Algebra"]);
    }

    #[test]
    fn test_idle_conversations_sort_last_by_title() {
        let mut directory = ConversationDirectory::new();
        let active = ConversationId::community("crs-1");
        directory.upsert(active.clone(), "Zoology");
        directory.upsert(ConversationId::community("crs-2"), "Botany");
        directory.upsert(ConversationId::community("crs-3"), "Anatomy");
        directory.record_activity(&active, &message("hi", 5));

        let titles: Vec<_> = directory.sorted().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Zoology", "Anatomy", "Botany"]);
    }

    #[test]
    fn test_activity_creates_missing_row_with_provisional_title() {
        let mut directory = ConversationDirectory::new();
        let thread = ConversationId::private("crs-9", "stu-1", "tut-1");
        directory.record_activity(&thread, &message("hello", 1));

        let entry = directory.get(&thread).unwrap();
        assert_eq!(entry.title, "crs-9");
        assert!(entry.latest.is_some());
    }

    #[test]
    fn test_retitle_keeps_activity() {
        let mut directory = ConversationDirectory::new();
        let room = ConversationId::community("crs-1");
        directory.record_activity(&room, &message("first", 1));
        directory.upsert(room.clone(), "Algebra");

        let entry = directory.get(&room).unwrap();
        assert_eq!(entry.title, "Algebra");
        assert_eq!(entry.latest.as_ref().unwrap().preview, "first");
    }

    #[test]
    fn test_stale_history_tail_does_not_regress_summary() {
        let mut directory = ConversationDirectory::new();
        let room = ConversationId::community("crs-1");
        directory.record_activity(&room, &message("newest", 50));
        directory.record_activity(&room, &message("old history tail", 10));

        let entry = directory.get(&room).unwrap();
        assert_eq!(entry.latest.as_ref().unwrap().preview, "newest");
    }

    #[test]
    fn test_image_summary_flags_attachment() {
        let mut directory = ConversationDirectory::new();
        let room = ConversationId::community("crs-1");
        let mut msg = message("", 5);
        msg.image = Some(ImageAttachment::from_bytes("cat.png", "image/png", b"x"));
        directory.record_activity(&room, &msg);

        let latest = directory.get(&room).unwrap().latest.clone().unwrap();
        assert!(latest.has_image);
        assert_eq!(latest.preview, "Sent an image");
    }
}
