use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::IMAGE_PREVIEW_TEXT;
use crate::types::{CourseId, UserId};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Delivery status of one chat message.
///
/// `Sent` is the optimistic local state; the relay stamps `Delivered` when
/// it persists the message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

/// Inline image payload carried on the wire as base64 text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub data: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
}

impl ImageAttachment {
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            data: BASE64_STANDARD.encode(bytes),
            name: name.into(),
            mime: mime.into(),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.data)
    }
}

/// One chat message. Immutable once created.
///
/// `id` is the durable identifier assigned by the remote store on
/// persistence; until it exists, `client_ref` (a client-generated
/// correlation id) is the only stable key. `author_id` is only present on
/// private-thread messages; community rooms identify authors by display
/// name alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<Uuid>,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl ChatMessage {
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Human-readable one-line preview for conversation lists and
    /// notification texts.
    pub fn preview(&self) -> String {
        if self.body.trim().is_empty() && self.image.is_some() {
            IMAGE_PREVIEW_TEXT.to_string()
        } else {
            self.body.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    CommunityMessage,
    PrivateMessage,
}

/// One fanout entry for one identity.
///
/// The linkage fields (`course_id`, `student_id`, `tutor_id`) route a
/// mark-read acknowledgment back through the transport; entries created
/// from community traffic may lack them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub text: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<CourseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tutor_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
}

impl Notification {
    /// Whether this entry carries the full linkage triple needed to route
    /// a mark-read acknowledgment.
    pub fn is_linked(&self) -> bool {
        self.course_id.is_some() && self.student_id.is_some() && self.tutor_id.is_some()
    }

    /// The transport acknowledgment for this entry, if linked.
    pub fn read_receipt(&self) -> Option<ReadReceipt> {
        match (&self.course_id, &self.student_id, &self.tutor_id) {
            (Some(course), Some(student), Some(tutor)) => Some(ReadReceipt {
                notification_id: self.id.clone(),
                course_id: course.clone(),
                student_id: student.clone(),
                tutor_id: tutor.clone(),
            }),
            _ => None,
        }
    }
}

/// Payload of `mark_private_message_notification_as_read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub notification_id: String,
    pub course_id: CourseId,
    pub student_id: UserId,
    pub tutor_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> ChatMessage {
        ChatMessage {
            id: None,
            client_ref: Some(Uuid::new_v4()),
            author_name: "Ada".to_string(),
            author_id: None,
            body: body.to_string(),
            image: None,
            sent_at: Utc::now(),
            status: DeliveryStatus::Sent,
        }
    }

    #[test]
    fn test_preview_prefers_body() {
        let msg = message("hello there");
        assert_eq!(msg.preview(), "hello there");
    }

    #[test]
    fn test_preview_for_image_only_message() {
        let mut msg = message("   ");
        msg.image = Some(ImageAttachment::from_bytes("cat.png", "image/png", b"\x89PNG"));
        assert_eq!(msg.preview(), IMAGE_PREVIEW_TEXT);
    }

    #[test]
    fn test_image_payload_roundtrip() {
        let img = ImageAttachment::from_bytes("cat.png", "image/png", b"raw-bytes");
        assert_eq!(img.decode().unwrap(), b"raw-bytes");
        assert_eq!(img.mime, "image/png");
    }

    #[test]
    fn test_message_wire_keys_are_camel_case() {
        let mut msg = message("hi");
        msg.author_id = Some(UserId::from("u-1"));
        let json = serde_json::to_value(&msg).unwrap();

        assert!(json.get("authorName").is_some());
        assert!(json.get("authorId").is_some());
        assert!(json.get("sentAt").is_some());
        assert!(json.get("clientRef").is_some());
        assert_eq!(json["status"], "sent");
        // absent optionals are omitted entirely
        assert!(json.get("id").is_none());
        assert!(json.get("image").is_none());
    }

    #[test]
    fn test_message_accepts_minimal_wire_shape() {
        let json = serde_json::json!({
            "authorName": "Bob",
            "sentAt": "2026-03-01T10:00:00Z",
        });
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.author_name, "Bob");
        assert_eq!(msg.status, DeliveryStatus::Sent);
        assert!(msg.body.is_empty());
    }

    #[test]
    fn test_read_receipt_requires_full_linkage() {
        let mut n = Notification {
            id: "n-1".to_string(),
            recipient_id: UserId::from("tut-1"),
            kind: NotificationKind::PrivateMessage,
            text: "new message".to_string(),
            read: false,
            created_at: Utc::now(),
            course_id: Some(CourseId::from("crs-1")),
            student_id: Some(UserId::from("stu-1")),
            tutor_id: None,
            sender_id: Some(UserId::from("stu-1")),
        };
        assert!(n.read_receipt().is_none());

        n.tutor_id = Some(UserId::from("tut-1"));
        let receipt = n.read_receipt().unwrap();
        assert_eq!(receipt.notification_id, "n-1");
        assert_eq!(receipt.course_id, CourseId::from("crs-1"));
    }
}
