use serde::{Deserialize, Serialize};

use crate::constants::MAX_EVENT_BYTES;
use crate::error::ProtocolError;
use crate::models::{ChatMessage, ImageAttachment, Notification, ReadReceipt};
use crate::types::{ConversationId, CourseId, PrivateThreadId, UserId};

/// Events emitted by a client over the channel.
///
/// Serializes as `{"event": "<snake_case name>", "data": <payload>}`, the
/// envelope the web backend speaks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Presence announcement, first event on every (re)connected channel
    JoinUser(UserId),

    /// Enter a course-wide community room
    #[serde(rename_all = "camelCase")]
    JoinCommunity { course_id: CourseId },

    /// Enter one student-tutor thread
    JoinPrivateChat(PrivateThreadId),

    /// Text message to the community room
    #[serde(rename_all = "camelCase")]
    SendMessage {
        course_id: CourseId,
        message: ChatMessage,
    },

    /// Text message to a private thread
    SendPrivateMessage {
        #[serde(flatten)]
        thread: PrivateThreadId,
        message: ChatMessage,
    },

    /// Image message to the community room; the attachment travels beside
    /// the envelope, not inside it
    #[serde(rename_all = "camelCase")]
    SendImageMessage {
        course_id: CourseId,
        message: ChatMessage,
        image: ImageAttachment,
    },

    /// Image message to a private thread
    SendPrivateImageMessage {
        #[serde(flatten)]
        thread: PrivateThreadId,
        message: ChatMessage,
        image: ImageAttachment,
    },

    /// Best-effort fanout request accompanying a send
    #[serde(rename_all = "camelCase")]
    SendNotification {
        conversation_id: ConversationId,
        course_title: String,
        message: String,
        sender_id: UserId,
    },

    /// Read acknowledgment; the relay flips its stored copy and echoes
    /// `notification_read` to the owner's other sessions
    MarkPrivateMessageNotificationAsRead(ReadReceipt),
}

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Community history snapshot, sent once after a community join
    MessageHistory(Vec<ChatMessage>),

    /// Private-thread history snapshot, sent once after a thread join
    PrivateMessageHistory(Vec<ChatMessage>),

    /// Live community message broadcast (sender included; clients
    /// suppress their own echo)
    ReceiveMessage(ChatMessage),

    /// Live private-thread message broadcast
    ReceivePrivateMessage(ChatMessage),

    /// Fanout entry, student-facing name
    ReceiveNotification(Notification),

    /// Fanout entry, tutor-facing name
    Notification(Notification),

    /// Another device of this identity marked a notification read
    #[serde(rename_all = "camelCase")]
    NotificationRead { notification_id: String },

    /// Server-reported failure, surfaced to the user verbatim
    Error { message: String },
}

impl ClientEvent {
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        check_frame_len(text)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Wire name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinUser(_) => "join_user",
            Self::JoinCommunity { .. } => "join_community",
            Self::JoinPrivateChat(_) => "join_private_chat",
            Self::SendMessage { .. } => "send_message",
            Self::SendPrivateMessage { .. } => "send_private_message",
            Self::SendImageMessage { .. } => "send_image_message",
            Self::SendPrivateImageMessage { .. } => "send_private_image_message",
            Self::SendNotification { .. } => "send_notification",
            Self::MarkPrivateMessageNotificationAsRead(_) => {
                "mark_private_message_notification_as_read"
            }
        }
    }
}

impl ServerEvent {
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        check_frame_len(text)?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageHistory(_) => "message_history",
            Self::PrivateMessageHistory(_) => "private_message_history",
            Self::ReceiveMessage(_) => "receive_message",
            Self::ReceivePrivateMessage(_) => "receive_private_message",
            Self::ReceiveNotification(_) => "receive_notification",
            Self::Notification(_) => "notification",
            Self::NotificationRead { .. } => "notification_read",
            Self::Error { .. } => "error",
        }
    }
}

fn check_frame_len(text: &str) -> Result<(), ProtocolError> {
    if text.len() > MAX_EVENT_BYTES {
        return Err(ProtocolError::Oversized {
            len: text.len(),
            max: MAX_EVENT_BYTES,
        });
    }
    Ok(())
}
