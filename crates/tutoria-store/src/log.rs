//! Ordered, append-only message log with duplicate suppression.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use tutoria_shared::models::ChatMessage;
use tutoria_shared::types::Principal;

/// What happened to a message offered to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Inserted at the tail.
    Appended,
    /// Already present under its durable id, correlation id, or fallback key.
    Duplicate,
    /// Authored by the local principal; its optimistic copy already exists.
    OwnEcho,
}

/// Dedup key for messages without a durable id: author identity (durable
/// id when the wire carries one, display name otherwise), client
/// timestamp, body, and attachment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FallbackKey {
    author: String,
    sent_at: DateTime<Utc>,
    body: String,
    image_name: Option<String>,
}

impl FallbackKey {
    fn of(message: &ChatMessage) -> Self {
        Self {
            author: message
                .author_id
                .as_ref()
                .map(|id| id.0.clone())
                .unwrap_or_else(|| message.author_name.clone()),
            sent_at: message.sent_at,
            body: message.body.clone(),
            image_name: message.image.as_ref().map(|img| img.name.clone()),
        }
    }
}

/// The single owner of one conversation's messages.
///
/// Insertion order is arrival order. The log never re-sorts by timestamp:
/// client clocks are not trusted, and an append-only chat view must
/// reflect delivery order.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    durable_ids: HashSet<String>,
    client_refs: HashSet<Uuid>,
    fallback_keys: HashSet<FallbackKey>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the log with the authoritative server snapshot and rebuild
    /// the dedup index from scratch. Duplicates inside the snapshot keep
    /// their first occurrence.
    pub fn replace_history(&mut self, messages: Vec<ChatMessage>) {
        self.clear();
        for message in messages {
            if self.index(&message) {
                self.entries.push(message);
            } else {
                debug!(id = ?message.id, "Duplicate inside history snapshot dropped");
            }
        }
    }

    /// Append a live inbound message unless it is the local principal's
    /// own echo or a duplicate of an existing entry. Own-echo detection
    /// runs first: the optimistic copy and the echo intentionally share
    /// keys.
    pub fn append_incoming(&mut self, message: ChatMessage, local: &Principal) -> AppendOutcome {
        if local.matches_author(message.author_id.as_ref(), &message.author_name) {
            debug!(author = %message.author_name, "Own echo suppressed");
            return AppendOutcome::OwnEcho;
        }
        self.append(message)
    }

    /// Append the local optimistic copy of an outgoing message, before
    /// any server acknowledgment.
    pub fn append_local(&mut self, message: ChatMessage) -> AppendOutcome {
        self.append(message)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything, including the dedup index. Used on room switch.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.durable_ids.clear();
        self.client_refs.clear();
        self.fallback_keys.clear();
    }

    fn append(&mut self, message: ChatMessage) -> AppendOutcome {
        if self.index(&message) {
            self.entries.push(message);
            AppendOutcome::Appended
        } else {
            debug!(id = ?message.id, author = %message.author_name, "Duplicate dropped");
            AppendOutcome::Duplicate
        }
    }

    /// Record the message in the dedup index. Returns false when one of
    /// its keys is already taken. The fallback key only gates messages
    /// that never got a durable id; it is still recorded for everything
    /// so an id-less copy of an id-carrying entry is caught.
    fn index(&mut self, message: &ChatMessage) -> bool {
        if let Some(id) = &message.id {
            if self.durable_ids.contains(id) {
                return false;
            }
        }
        if let Some(client_ref) = &message.client_ref {
            if self.client_refs.contains(client_ref) {
                return false;
            }
        }
        let fallback = FallbackKey::of(message);
        if message.id.is_none() && self.fallback_keys.contains(&fallback) {
            return false;
        }

        if let Some(id) = &message.id {
            self.durable_ids.insert(id.clone());
        }
        if let Some(client_ref) = message.client_ref {
            self.client_refs.insert(client_ref);
        }
        self.fallback_keys.insert(fallback);
        true
    }
}
