use serde::Serialize;

use tutoria_shared::{ChatMessage, ConversationId, Notification};

/// Typed event stream for the embedding UI, replacing per-event string
/// topics with one tagged enum.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    LinkUp { reconnected: bool },
    LinkDown { reason: String },
    LinkLost { attempts: u32 },
    #[serde(rename_all = "camelCase")]
    HistoryLoaded {
        conversation: ConversationId,
        count: usize,
    },
    HistoryTimedOut { conversation: ConversationId },
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        conversation: ConversationId,
        message: ChatMessage,
    },
    NotificationReceived(Notification),
    UnreadChanged { count: usize },
    Notice(UserNotice),
}

/// A user-visible notice; the UI decides presentation (toast, banner).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserNotice {
    pub kind: NoticeKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

impl UserNotice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}
