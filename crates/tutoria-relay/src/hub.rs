//! In-memory chat hub: sessions, rooms, histories, and notifications.
//!
//! The hub is the single shared state behind both the WebSocket sessions
//! and the REST routes. A session is one connected WebSocket; an identity
//! may hold several sessions at once (multiple tabs or devices), and
//! server pushes address identities, not sessions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use tutoria_shared::constants::DEFAULT_NOTIFICATION_LIMIT;
use tutoria_shared::{
    ChatMessage, ConversationId, CourseId, DeliveryStatus, ImageAttachment, Notification,
    NotificationKind, ReadReceipt, ServerEvent, UserId,
};

/// Identity and outbound queue of one connected session.
struct SessionHandle {
    user_id: UserId,
    tx: mpsc::Sender<ServerEvent>,
}

struct Room {
    conversation: ConversationId,
    /// Display title, learned from notification fanout traffic.
    title: Option<String>,
    members: HashSet<Uuid>,
    history: VecDeque<ChatMessage>,
}

impl Room {
    fn new(conversation: ConversationId) -> Self {
        Self {
            conversation,
            title: None,
            members: HashSet::new(),
            history: VecDeque::new(),
        }
    }
}

struct HubState {
    sessions: HashMap<Uuid, SessionHandle>,
    /// Rooms keyed by their wire name. A room outlives its members so
    /// history survives reconnects for as long as the process runs.
    rooms: HashMap<String, Room>,
    /// Session id to room name; a session is in at most one room.
    memberships: HashMap<Uuid, String>,
    /// Per identity, newest first.
    notifications: HashMap<UserId, Vec<Notification>>,
    /// Display names, learned from message traffic.
    names: HashMap<UserId, String>,
}

/// One course known to the hub, for the enrolled-courses stand-in.
#[derive(Debug, Clone)]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
}

/// One identity present in a community room, for the roster stand-in.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone)]
pub struct ChatHub {
    state: Arc<RwLock<HubState>>,
    history_limit: usize,
}

impl ChatHub {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState {
                sessions: HashMap::new(),
                rooms: HashMap::new(),
                memberships: HashMap::new(),
                notifications: HashMap::new(),
                names: HashMap::new(),
            })),
            history_limit,
        }
    }

    /// Register a session after its presence announcement.
    pub async fn register(&self, session_id: Uuid, user_id: UserId, tx: mpsc::Sender<ServerEvent>) {
        let mut state = self.state.write().await;
        state.sessions.insert(
            session_id,
            SessionHandle {
                user_id: user_id.clone(),
                tx,
            },
        );

        let sessions = sessions_of(&state, &user_id).len();
        info!(user = %user_id, sessions, "Session registered");
    }

    /// Drop a closed session and its room membership.
    pub async fn unregister(&self, session_id: Uuid) {
        let mut state = self.state.write().await;
        leave_current_room(&mut state, session_id);

        if let Some(handle) = state.sessions.remove(&session_id) {
            info!(user = %handle.user_id, "Session closed");
        }
    }

    /// Move a session into a room, implicitly leaving its previous one,
    /// and queue the room's history snapshot as the join reply. The
    /// snapshot is queued while the lock is still held so no concurrent
    /// send can land in the session's queue ahead of it. Returns false
    /// when the session never announced presence.
    pub async fn join(&self, session_id: Uuid, conversation: &ConversationId) -> bool {
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(&session_id) {
            return false;
        }

        leave_current_room(&mut state, session_id);

        let name = conversation.room_name();
        let room = state
            .rooms
            .entry(name.clone())
            .or_insert_with(|| Room::new(conversation.clone()));
        room.members.insert(session_id);

        info!(
            room = %name,
            members = room.members.len(),
            "Session joined room"
        );

        let history: Vec<ChatMessage> = room.history.iter().cloned().collect();
        state.memberships.insert(session_id, name);

        let reply = if conversation.is_private() {
            ServerEvent::PrivateMessageHistory(history)
        } else {
            ServerEvent::MessageHistory(history)
        };
        push_to_session(&state, session_id, reply);
        true
    }

    /// Deliver a message to a room: assign a durable id, append it to the
    /// bounded history, and broadcast it to every member session, the
    /// sender's included. Returns false when the session is not a member
    /// of that room.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        conversation: &ConversationId,
        mut message: ChatMessage,
        image: Option<ImageAttachment>,
    ) -> bool {
        let mut state = self.state.write().await;

        let name = conversation.room_name();
        let Some(sender) = state.sessions.get(&session_id) else {
            return false;
        };
        if state.memberships.get(&session_id) != Some(&name) {
            debug!(room = %name, "Send from a session not in the room");
            return false;
        }
        let sender_id = sender.user_id.clone();

        if message.id.is_none() {
            message.id = Some(Uuid::new_v4().to_string());
        }
        message.status = DeliveryStatus::Delivered;
        if let Some(image) = image {
            message.image = Some(image);
        }

        state
            .names
            .insert(sender_id, message.author_name.clone());

        let Some(room) = state.rooms.get_mut(&name) else {
            return false;
        };
        room.history.push_back(message.clone());
        while room.history.len() > self.history_limit {
            room.history.pop_front();
        }

        let event = if conversation.is_private() {
            ServerEvent::ReceivePrivateMessage(message)
        } else {
            ServerEvent::ReceiveMessage(message)
        };

        let members: Vec<Uuid> = room.members.iter().copied().collect();
        for member in members {
            push_to_session(&state, member, event.clone());
        }
        true
    }

    /// Fan a notification out to the conversation's recipients: every
    /// room member except the sender for a community, the other party of
    /// the triple for a private thread. Entries are stored per identity
    /// and pushed live to that identity's sessions.
    pub async fn send_notification(
        &self,
        conversation: &ConversationId,
        course_title: &str,
        preview: &str,
        sender_id: &UserId,
    ) {
        let mut state = self.state.write().await;

        let recipients: Vec<UserId> = match conversation {
            ConversationId::Community(course) => {
                let member_ids: Vec<Uuid> = match state.rooms.get_mut(&conversation.room_name()) {
                    Some(room) => {
                        room.title = Some(course_title.to_string());
                        room.members.iter().copied().collect()
                    }
                    None => {
                        debug!(course = %course, "Notification for an unknown room");
                        return;
                    }
                };

                let mut seen = HashSet::new();
                member_ids
                    .iter()
                    .filter_map(|id| state.sessions.get(id))
                    .map(|handle| handle.user_id.clone())
                    .filter(|user| user != sender_id && seen.insert(user.clone()))
                    .collect()
            }
            ConversationId::Private(thread) => {
                let other = if thread.student_id == *sender_id {
                    thread.tutor_id.clone()
                } else {
                    thread.student_id.clone()
                };
                vec![other]
            }
        };

        for recipient in recipients {
            let notification = build_notification(
                conversation,
                course_title,
                preview,
                sender_id,
                &recipient,
            );

            let stored = state.notifications.entry(recipient.clone()).or_default();
            stored.insert(0, notification.clone());
            stored.truncate(DEFAULT_NOTIFICATION_LIMIT);

            // The tutor-facing event name is used when the recipient sits
            // on the tutor side of a thread; clients treat both alike.
            let tutor_side = matches!(
                conversation,
                ConversationId::Private(thread) if thread.tutor_id == recipient
            );
            let event = if tutor_side {
                ServerEvent::Notification(notification)
            } else {
                ServerEvent::ReceiveNotification(notification)
            };

            for session in sessions_of(&state, &recipient) {
                push_to_session(&state, session, event.clone());
            }
        }
    }

    /// Flip a stored notification read on behalf of a session's identity
    /// and echo the flip to that identity's sessions.
    pub async fn mark_read(&self, session_id: Uuid, receipt: &ReadReceipt) -> bool {
        let owner = {
            let state = self.state.read().await;
            match state.sessions.get(&session_id) {
                Some(handle) => handle.user_id.clone(),
                None => return false,
            }
        };
        self.mark_read_for(&owner, &receipt.notification_id).await
    }

    /// Flip one notification read for an identity. Used by both the
    /// transport acknowledgment and the REST route.
    pub async fn mark_read_for(&self, owner: &UserId, notification_id: &str) -> bool {
        let mut state = self.state.write().await;
        if !flip_read(&mut state, owner, notification_id) {
            return false;
        }
        echo_read(&state, owner, notification_id);
        true
    }

    /// Flip every unread notification for an identity. Returns how many
    /// flipped.
    pub async fn mark_all_read_for(&self, owner: &UserId) -> usize {
        let mut state = self.state.write().await;

        let flipped: Vec<String> = match state.notifications.get_mut(owner) {
            Some(entries) => entries
                .iter_mut()
                .filter(|n| !n.read)
                .map(|n| {
                    n.read = true;
                    n.id.clone()
                })
                .collect(),
            None => Vec::new(),
        };

        for id in &flipped {
            echo_read(&state, owner, id);
        }
        flipped.len()
    }

    /// Notification feed for an identity, newest first.
    pub async fn notifications_for(&self, user: &UserId) -> Vec<Notification> {
        self.state
            .read()
            .await
            .notifications
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    /// Community rooms known to the hub, as a course list stand-in.
    pub async fn courses(&self) -> Vec<CourseRecord> {
        let state = self.state.read().await;
        let mut courses: Vec<CourseRecord> = state
            .rooms
            .values()
            .filter_map(|room| match &room.conversation {
                ConversationId::Community(course) => Some(CourseRecord {
                    id: course.clone(),
                    title: room
                        .title
                        .clone()
                        .unwrap_or_else(|| course.as_str().to_string()),
                }),
                ConversationId::Private(_) => None,
            })
            .collect();
        courses.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        courses
    }

    /// Identities present in a course's community room right now.
    pub async fn roster(&self, course_id: &CourseId) -> Vec<RosterEntry> {
        let state = self.state.read().await;
        let name = ConversationId::community(course_id.clone()).room_name();

        let Some(room) = state.rooms.get(&name) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut roster: Vec<RosterEntry> = room
            .members
            .iter()
            .filter_map(|id| state.sessions.get(id))
            .filter(|handle| seen.insert(handle.user_id.clone()))
            .map(|handle| RosterEntry {
                id: handle.user_id.clone(),
                name: state
                    .names
                    .get(&handle.user_id)
                    .cloned()
                    .unwrap_or_else(|| handle.user_id.as_str().to_string()),
            })
            .collect();
        roster.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        roster
    }
}

fn leave_current_room(state: &mut HubState, session_id: Uuid) {
    let Some(name) = state.memberships.remove(&session_id) else {
        return;
    };
    if let Some(room) = state.rooms.get_mut(&name) {
        room.members.remove(&session_id);
        info!(room = %name, members = room.members.len(), "Session left room");
    }
}

fn sessions_of(state: &HubState, user: &UserId) -> Vec<Uuid> {
    state
        .sessions
        .iter()
        .filter(|(_, handle)| handle.user_id == *user)
        .map(|(id, _)| *id)
        .collect()
}

/// Queue an event for one session, dropping it when the queue is full so
/// a slow consumer never stalls the room.
fn push_to_session(state: &HubState, session_id: Uuid, event: ServerEvent) {
    if let Some(handle) = state.sessions.get(&session_id) {
        if handle.tx.try_send(event).is_err() {
            debug!(user = %handle.user_id, "Dropping event for slow session");
        }
    }
}

fn flip_read(state: &mut HubState, owner: &UserId, notification_id: &str) -> bool {
    let Some(entries) = state.notifications.get_mut(owner) else {
        return false;
    };
    match entries
        .iter_mut()
        .find(|n| n.id == notification_id && !n.read)
    {
        Some(entry) => {
            entry.read = true;
            true
        }
        None => false,
    }
}

fn echo_read(state: &HubState, owner: &UserId, notification_id: &str) {
    for session in sessions_of(state, owner) {
        push_to_session(
            state,
            session,
            ServerEvent::NotificationRead {
                notification_id: notification_id.to_string(),
            },
        );
    }
}

fn build_notification(
    conversation: &ConversationId,
    course_title: &str,
    preview: &str,
    sender_id: &UserId,
    recipient: &UserId,
) -> Notification {
    let (kind, student_id, tutor_id) = match conversation {
        ConversationId::Community(_) => (NotificationKind::CommunityMessage, None, None),
        ConversationId::Private(thread) => (
            NotificationKind::PrivateMessage,
            Some(thread.student_id.clone()),
            Some(thread.tutor_id.clone()),
        ),
    };

    Notification {
        id: Uuid::new_v4().to_string(),
        recipient_id: recipient.clone(),
        kind,
        text: format!("{course_title}: {preview}"),
        read: false,
        created_at: Utc::now(),
        course_id: Some(conversation.course_id().clone()),
        student_id,
        tutor_id,
        sender_id: Some(sender_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutoria_shared::PrivateThreadId;

    async fn connect(hub: &ChatHub, user: &str) -> (Uuid, mpsc::Receiver<ServerEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(8);
        hub.register(session_id, user.into(), tx).await;
        (session_id, rx)
    }

    fn message(author: &str, body: &str) -> ChatMessage {
        ChatMessage {
            id: None,
            client_ref: None,
            author_name: author.to_string(),
            author_id: None,
            body: body.to_string(),
            image: None,
            sent_at: Utc::now(),
            status: DeliveryStatus::Sent,
        }
    }

    fn community() -> ConversationId {
        ConversationId::community("crs-1")
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member_including_sender() {
        let hub = ChatHub::new(100);
        let (alice, mut alice_rx) = connect(&hub, "stu-1").await;
        let (bob, mut bob_rx) = connect(&hub, "stu-2").await;

        assert!(hub.join(alice, &community()).await);
        assert!(hub.join(bob, &community()).await);
        for rx in [&mut alice_rx, &mut bob_rx] {
            match rx.try_recv().unwrap() {
                ServerEvent::MessageHistory(history) => assert!(history.is_empty()),
                other => panic!("expected message_history, got {other:?}"),
            }
        }

        assert!(
            hub.send_message(alice, &community(), message("Ada", "hello"), None)
                .await
        );

        for rx in [&mut alice_rx, &mut bob_rx] {
            match rx.try_recv().unwrap() {
                ServerEvent::ReceiveMessage(m) => {
                    assert!(m.id.is_some());
                    assert_eq!(m.status, DeliveryStatus::Delivered);
                    assert_eq!(m.body, "hello");
                }
                other => panic!("expected receive_message, got {other:?}"),
            }
        }

        // A later joiner gets the message replayed as history.
        let (carol, mut carol_rx) = connect(&hub, "stu-3").await;
        assert!(hub.join(carol, &community()).await);
        match carol_rx.try_recv().unwrap() {
            ServerEvent::MessageHistory(history) => {
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].body, "hello");
            }
            other => panic!("expected message_history, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_snapshot_precedes_interleaved_send() {
        let hub = ChatHub::new(100);
        let (alice, mut alice_rx) = connect(&hub, "stu-1").await;
        let (bob, mut bob_rx) = connect(&hub, "stu-2").await;
        hub.join(bob, &community()).await;
        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::MessageHistory(_)
        ));

        // A send completing right after the join queues behind the
        // snapshot; a client discards live frames until the snapshot
        // arrives, so the reverse order would lose the message.
        assert!(hub.join(alice, &community()).await);
        assert!(
            hub.send_message(bob, &community(), message("Bob", "hello"), None)
                .await
        );

        match alice_rx.try_recv().unwrap() {
            ServerEvent::MessageHistory(history) => assert!(history.is_empty()),
            other => panic!("expected message_history first, got {other:?}"),
        }
        match alice_rx.try_recv().unwrap() {
            ServerEvent::ReceiveMessage(m) => assert_eq!(m.body, "hello"),
            other => panic!("expected receive_message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_implicitly_leaves_previous_room() {
        let hub = ChatHub::new(100);
        let (alice, mut alice_rx) = connect(&hub, "stu-1").await;
        let (bob, _bob_rx) = connect(&hub, "stu-2").await;

        hub.join(alice, &community()).await;
        hub.join(alice, &ConversationId::community("crs-2")).await;
        hub.join(bob, &community()).await;

        // One join reply per room joined.
        for _ in 0..2 {
            assert!(matches!(
                alice_rx.try_recv().unwrap(),
                ServerEvent::MessageHistory(_)
            ));
        }

        hub.send_message(bob, &community(), message("Bob", "hi"), None)
            .await;

        // Alice moved to crs-2 and must not hear crs-1 traffic.
        assert!(alice_rx.try_recv().is_err());

        // Sending to the old room is rejected for Alice too.
        assert!(
            !hub.send_message(alice, &community(), message("Ada", "late"), None)
                .await
        );
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let hub = ChatHub::new(2);
        let (alice, _rx) = connect(&hub, "stu-1").await;
        hub.join(alice, &community()).await;

        for body in ["m1", "m2", "m3"] {
            hub.send_message(alice, &community(), message("Ada", body), None)
                .await;
        }

        let (bob, mut bob_rx) = connect(&hub, "stu-2").await;
        assert!(hub.join(bob, &community()).await);
        match bob_rx.try_recv().unwrap() {
            ServerEvent::MessageHistory(history) => {
                let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
                assert_eq!(bodies, vec!["m2", "m3"]);
            }
            other => panic!("expected message_history, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_private_notification_reaches_the_other_party() {
        let hub = ChatHub::new(100);
        let (_student, mut student_rx) = connect(&hub, "stu-1").await;
        let (_tutor, mut tutor_rx) = connect(&hub, "tut-1").await;

        let thread = ConversationId::Private(PrivateThreadId {
            course_id: "crs-1".into(),
            student_id: "stu-1".into(),
            tutor_id: "tut-1".into(),
        });
        hub.send_notification(&thread, "Rust 101", "Sent an image", &"stu-1".into())
            .await;

        // The tutor side gets the tutor-facing event name.
        match tutor_rx.try_recv().unwrap() {
            ServerEvent::Notification(n) => {
                assert_eq!(n.recipient_id, "tut-1".into());
                assert_eq!(n.kind, NotificationKind::PrivateMessage);
                assert!(n.is_linked());
                assert_eq!(n.text, "Rust 101: Sent an image");
            }
            other => panic!("expected notification, got {other:?}"),
        }
        assert!(student_rx.try_recv().is_err());

        // Read flip echoes to the owner's sessions.
        let stored = hub.notifications_for(&"tut-1".into()).await;
        assert!(hub.mark_read_for(&"tut-1".into(), &stored[0].id).await);
        assert!(matches!(
            tutor_rx.try_recv().unwrap(),
            ServerEvent::NotificationRead { .. }
        ));
        assert!(hub.notifications_for(&"tut-1".into()).await[0].read);

        // A second flip is a no-op.
        assert!(!hub.mark_read_for(&"tut-1".into(), &stored[0].id).await);
    }

    #[tokio::test]
    async fn test_community_notification_skips_sender() {
        let hub = ChatHub::new(100);
        let (alice, _alice_rx) = connect(&hub, "stu-1").await;
        let (bob, mut bob_rx) = connect(&hub, "stu-2").await;

        hub.join(alice, &community()).await;
        hub.join(bob, &community()).await;
        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::MessageHistory(_)
        ));
        hub.send_notification(&community(), "Rust 101", "hello", &"stu-1".into())
            .await;

        match bob_rx.try_recv().unwrap() {
            ServerEvent::ReceiveNotification(n) => {
                assert_eq!(n.kind, NotificationKind::CommunityMessage);
                assert!(!n.is_linked());
            }
            other => panic!("expected receive_notification, got {other:?}"),
        }
        assert!(hub.notifications_for(&"stu-1".into()).await.is_empty());
        assert_eq!(hub.notifications_for(&"stu-2".into()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_courses_and_roster_reflect_live_state() {
        let hub = ChatHub::new(100);
        let (alice, _rx1) = connect(&hub, "stu-1").await;
        let (bob, _rx2) = connect(&hub, "stu-2").await;

        hub.join(alice, &community()).await;
        hub.join(bob, &community()).await;
        hub.send_message(alice, &community(), message("Ada", "hi"), None)
            .await;
        hub.send_notification(&community(), "Rust 101", "hi", &"stu-1".into())
            .await;

        let courses = hub.courses().await;
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].title, "Rust 101");

        let roster = hub.roster(&"crs-1".into()).await;
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].id, "stu-1".into());
        assert_eq!(roster[0].name, "Ada");
        // Bob never spoke, so his id stands in for a name.
        assert_eq!(roster[1].name, "stu-2");
    }

    #[tokio::test]
    async fn test_unregister_clears_membership() {
        let hub = ChatHub::new(100);
        let (alice, _rx) = connect(&hub, "stu-1").await;
        let (bob, mut bob_rx) = connect(&hub, "stu-2").await;

        hub.join(alice, &community()).await;
        hub.join(bob, &community()).await;
        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::MessageHistory(_)
        ));
        hub.unregister(alice).await;

        assert!(hub.roster(&"crs-1".into()).await.len() == 1);
        hub.send_message(bob, &community(), message("Bob", "hi"), None)
            .await;
        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::ReceiveMessage(_)
        ));
    }
}
