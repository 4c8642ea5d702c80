//! Room membership tracking.
//!
//! One conversation is active at a time; switching emits a join for the
//! new room and the relay performs the implicit leave. History replies
//! carry no conversation id on the wire, so attribution is positional:
//! the relay answers joins in order, and each incoming history snapshot
//! resolves the oldest pending join. A reply that resolves to a
//! conversation the user has already left is discarded by the caller.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use tutoria_shared::{ClientEvent, ConversationId};

/// Which kind of history reply a pending join expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Community,
    Private,
}

impl RoomKind {
    pub fn of(conversation: &ConversationId) -> Self {
        if conversation.is_private() {
            RoomKind::Private
        } else {
            RoomKind::Community
        }
    }
}

/// Load state of the active conversation's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPhase {
    /// No conversation has been opened yet.
    Idle,
    /// Join emitted, history snapshot not yet received.
    Loading,
    /// History received; live messages fold into the log.
    Ready,
    /// The join went unanswered past the timeout.
    TimedOut,
}

/// Where a history reply belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// The reply is for the active conversation.
    Current(ConversationId),
    /// The reply is for a conversation that is no longer active.
    Stale(ConversationId),
    /// No pending join could have produced this reply.
    Unexpected,
}

struct PendingJoin {
    conversation: ConversationId,
    requested_at: Instant,
}

/// Tracks the active conversation and joins in flight.
///
/// The tracker is the sole source of join events; the session emits them
/// but never builds one itself.
pub struct RoomTracker {
    current: Option<ConversationId>,
    phase: HistoryPhase,
    pending: VecDeque<PendingJoin>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self {
            current: None,
            phase: HistoryPhase::Idle,
            pending: VecDeque::new(),
        }
    }

    pub fn current(&self) -> Option<&ConversationId> {
        self.current.as_ref()
    }

    pub fn is_current(&self, conversation: &ConversationId) -> bool {
        self.current.as_ref() == Some(conversation)
    }

    pub fn phase(&self) -> HistoryPhase {
        self.phase
    }

    /// The join event for a conversation.
    pub fn join_event(conversation: &ConversationId) -> ClientEvent {
        match conversation {
            ConversationId::Community(course_id) => ClientEvent::JoinCommunity {
                course_id: course_id.clone(),
            },
            ConversationId::Private(thread) => ClientEvent::JoinPrivateChat(thread.clone()),
        }
    }

    /// Make `conversation` the active one and record its join as pending.
    /// The caller has already emitted the join event.
    pub fn switch(&mut self, conversation: ConversationId) {
        self.pending.push_back(PendingJoin {
            conversation: conversation.clone(),
            requested_at: Instant::now(),
        });
        self.current = Some(conversation);
        self.phase = HistoryPhase::Loading;
    }

    /// Re-join the active conversation after a reconnect. Returns the join
    /// event to emit, or `None` when no conversation is open.
    pub fn rejoin(&mut self) -> Option<ClientEvent> {
        let conversation = self.current.clone()?;
        self.pending.push_back(PendingJoin {
            conversation: conversation.clone(),
            requested_at: Instant::now(),
        });
        self.phase = HistoryPhase::Loading;
        Some(Self::join_event(&conversation))
    }

    /// Attribute an incoming history snapshot to the oldest pending join.
    ///
    /// A reply whose kind does not match the oldest pending join leaves
    /// the queue untouched; the join will expire on its own.
    pub fn resolve_history(&mut self, kind: RoomKind) -> HistoryOutcome {
        let Some(join) = self.pending.pop_front() else {
            debug!(?kind, "History reply with no pending join");
            return HistoryOutcome::Unexpected;
        };
        if RoomKind::of(&join.conversation) != kind {
            debug!(
                ?kind,
                pending = %join.conversation,
                "History reply kind does not match oldest pending join"
            );
            self.pending.push_front(join);
            return HistoryOutcome::Unexpected;
        }

        if self.is_current(&join.conversation) {
            self.phase = HistoryPhase::Ready;
            HistoryOutcome::Current(join.conversation)
        } else {
            HistoryOutcome::Stale(join.conversation)
        }
    }

    /// Drop pending joins older than `timeout`. Returns the conversations
    /// among them that are still active, for surfacing to the user.
    pub fn expire_stale(&mut self, timeout: Duration) -> Vec<ConversationId> {
        let mut timed_out = Vec::new();

        while self
            .pending
            .front()
            .is_some_and(|join| join.requested_at.elapsed() >= timeout)
        {
            if let Some(join) = self.pending.pop_front() {
                if self.is_current(&join.conversation) {
                    if self.phase == HistoryPhase::Loading {
                        self.phase = HistoryPhase::TimedOut;
                    }
                    timed_out.push(join.conversation);
                } else {
                    debug!(conversation = %join.conversation, "Stale join expired");
                }
            }
        }

        timed_out
    }

    /// The channel dropped: replies for in-flight joins will never arrive.
    pub fn on_disconnect(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn community(course: &str) -> ConversationId {
        ConversationId::community(course)
    }

    fn private_thread() -> ConversationId {
        ConversationId::private("crs-1", "stu-1", "tut-1")
    }

    #[test]
    fn test_switch_marks_loading_and_builds_join() {
        let mut rooms = RoomTracker::new();
        assert_eq!(rooms.phase(), HistoryPhase::Idle);

        let conversation = community("crs-1");
        let event = RoomTracker::join_event(&conversation);
        assert!(matches!(event, ClientEvent::JoinCommunity { .. }));
        rooms.switch(conversation.clone());

        assert!(rooms.is_current(&conversation));
        assert_eq!(rooms.phase(), HistoryPhase::Loading);

        let event = RoomTracker::join_event(&private_thread());
        assert!(matches!(event, ClientEvent::JoinPrivateChat(_)));
    }

    #[test]
    fn test_history_replies_resolve_in_join_order() {
        let mut rooms = RoomTracker::new();
        rooms.switch(community("crs-1"));
        rooms.switch(private_thread());

        // The first reply answers the first join, which is stale by now.
        assert_eq!(
            rooms.resolve_history(RoomKind::Community),
            HistoryOutcome::Stale(community("crs-1"))
        );
        assert_eq!(rooms.phase(), HistoryPhase::Loading);

        assert_eq!(
            rooms.resolve_history(RoomKind::Private),
            HistoryOutcome::Current(private_thread())
        );
        assert_eq!(rooms.phase(), HistoryPhase::Ready);
    }

    #[test]
    fn test_kind_mismatch_leaves_pending_untouched() {
        let mut rooms = RoomTracker::new();
        rooms.switch(community("crs-1"));

        assert_eq!(
            rooms.resolve_history(RoomKind::Private),
            HistoryOutcome::Unexpected
        );
        // The pending join is still there and resolves normally.
        assert_eq!(
            rooms.resolve_history(RoomKind::Community),
            HistoryOutcome::Current(community("crs-1"))
        );
    }

    #[test]
    fn test_reply_without_pending_join_is_unexpected() {
        let mut rooms = RoomTracker::new();
        assert_eq!(
            rooms.resolve_history(RoomKind::Community),
            HistoryOutcome::Unexpected
        );
    }

    #[test]
    fn test_expiry_surfaces_current_conversation_only() {
        let mut rooms = RoomTracker::new();
        rooms.switch(community("crs-1"));
        rooms.switch(community("crs-2"));

        let timed_out = rooms.expire_stale(Duration::ZERO);
        assert_eq!(timed_out, vec![community("crs-2")]);
        assert_eq!(rooms.phase(), HistoryPhase::TimedOut);
    }

    #[test]
    fn test_fresh_join_does_not_expire() {
        let mut rooms = RoomTracker::new();
        rooms.switch(community("crs-1"));

        assert!(rooms.expire_stale(Duration::from_secs(60)).is_empty());
        assert_eq!(rooms.phase(), HistoryPhase::Loading);
    }

    #[test]
    fn test_rejoin_targets_current_conversation() {
        let mut rooms = RoomTracker::new();
        assert!(rooms.rejoin().is_none());

        rooms.switch(community("crs-1"));
        rooms.switch(community("crs-2"));
        let _ = rooms.resolve_history(RoomKind::Community);
        let _ = rooms.resolve_history(RoomKind::Community);
        assert_eq!(rooms.phase(), HistoryPhase::Ready);

        rooms.on_disconnect();
        let event = rooms.rejoin().unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinCommunity {
                course_id: "crs-2".into(),
            }
        );
        assert_eq!(rooms.phase(), HistoryPhase::Loading);
    }

    #[test]
    fn test_disconnect_clears_pending_joins() {
        let mut rooms = RoomTracker::new();
        rooms.switch(community("crs-1"));
        rooms.on_disconnect();

        assert_eq!(
            rooms.resolve_history(RoomKind::Community),
            HistoryOutcome::Unexpected
        );
    }
}
