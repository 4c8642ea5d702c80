//! The chat session state machine.
//!
//! `ChatSession` owns every piece of client chat state: link status, the
//! active room, the message log and its visible window, the conversation
//! directory and the notification tracker. It is synchronous; the bridge
//! task drives it with socket notifications and timer ticks, and the
//! embedding application calls its methods under a short-lived lock.
//! Methods that change remote state emit events on the socket command
//! queue and never wait for acknowledgments.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tutoria_net::{SocketCommand, SocketNotification};
use tutoria_shared::{
    ChatMessage, ClientEvent, ConversationId, CourseId, LinkState, Notification, Principal,
    PrivateThreadId, ServerEvent,
};
use tutoria_store::{
    AppendOutcome, ConversationDirectory, ConversationEntry, MessageLog, MessageWindow,
    NotificationTracker, ReadAction,
};

use crate::composer;
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::events::{SessionEvent, UserNotice};
use crate::rest::CourseSummary;
use crate::rooms::{HistoryOutcome, HistoryPhase, RoomKind, RoomTracker};

pub struct ChatSession {
    principal: Principal,
    link: LinkState,
    rooms: RoomTracker,
    log: MessageLog,
    window: MessageWindow,
    directory: ConversationDirectory,
    notifications: NotificationTracker,
    courses: Vec<CourseSummary>,
    join_timeout: Duration,
    cmd_tx: mpsc::Sender<SocketCommand>,
}

impl ChatSession {
    pub fn new(
        principal: Principal,
        config: &ClientConfig,
        cmd_tx: mpsc::Sender<SocketCommand>,
    ) -> Self {
        Self {
            principal,
            link: LinkState::Connecting,
            rooms: RoomTracker::new(),
            log: MessageLog::new(),
            window: MessageWindow::new(config.page_size),
            directory: ConversationDirectory::new(),
            notifications: NotificationTracker::new(),
            courses: Vec::new(),
            join_timeout: config.join_timeout,
            cmd_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Socket notifications
    // -----------------------------------------------------------------------

    /// Fold one socket notification into the session. Returns the events
    /// to surface to the embedding UI.
    pub fn apply(&mut self, notification: SocketNotification) -> Vec<SessionEvent> {
        match notification {
            SocketNotification::Up { reconnected } => self.on_up(reconnected),
            SocketNotification::Down { reason } => self.on_down(reason),
            SocketNotification::Lost { attempts } => self.on_lost(attempts),
            SocketNotification::EmitFailed { event } => self.on_emit_failed(event),
            SocketNotification::Event(event) => self.on_server_event(event),
        }
    }

    /// Expire pending joins. Called once a second by the bridge.
    pub fn on_tick(&mut self) -> Vec<SessionEvent> {
        self.rooms
            .expire_stale(self.join_timeout)
            .into_iter()
            .map(|conversation| {
                warn!(conversation = %conversation, "Join went unanswered");
                SessionEvent::HistoryTimedOut { conversation }
            })
            .collect()
    }

    fn on_up(&mut self, reconnected: bool) -> Vec<SessionEvent> {
        info!(reconnected, "Chat link up");
        self.link = LinkState::Up;

        if reconnected {
            // Presence is re-announced by the socket task; the room has to
            // be re-entered here, targeting the last user-selected one.
            if let Some(event) = self.rooms.rejoin() {
                self.send_best_effort(event);
            }
        }

        vec![SessionEvent::LinkUp { reconnected }]
    }

    fn on_down(&mut self, reason: String) -> Vec<SessionEvent> {
        warn!(reason = %reason, "Chat link down, reconnecting");
        self.link = LinkState::Connecting;
        self.rooms.on_disconnect();
        vec![SessionEvent::LinkDown { reason }]
    }

    fn on_lost(&mut self, attempts: u32) -> Vec<SessionEvent> {
        warn!(attempts, "Chat link lost, no further reconnects");
        self.link = LinkState::Down;
        self.rooms.on_disconnect();
        vec![SessionEvent::LinkLost { attempts }]
    }

    fn on_emit_failed(&mut self, event: &'static str) -> Vec<SessionEvent> {
        let text = if event.starts_with("send") {
            "Message could not be delivered: connection is down".to_string()
        } else {
            format!("Could not reach the chat relay ({event})")
        };
        vec![SessionEvent::Notice(UserNotice::warning(text))]
    }

    fn on_server_event(&mut self, event: ServerEvent) -> Vec<SessionEvent> {
        match event {
            ServerEvent::MessageHistory(messages) => {
                self.on_history(RoomKind::Community, messages)
            }
            ServerEvent::PrivateMessageHistory(messages) => {
                self.on_history(RoomKind::Private, messages)
            }
            ServerEvent::ReceiveMessage(message) => {
                self.on_live_message(RoomKind::Community, message)
            }
            ServerEvent::ReceivePrivateMessage(message) => {
                self.on_live_message(RoomKind::Private, message)
            }
            ServerEvent::ReceiveNotification(notification)
            | ServerEvent::Notification(notification) => self.on_notification(notification),
            ServerEvent::NotificationRead { notification_id } => {
                if self.notifications.apply_remote_read(&notification_id) {
                    vec![SessionEvent::UnreadChanged {
                        count: self.notifications.unread_count(),
                    }]
                } else {
                    Vec::new()
                }
            }
            ServerEvent::Error { message } => {
                warn!(message = %message, "Relay reported an error");
                vec![SessionEvent::Notice(UserNotice::error(message))]
            }
        }
    }

    fn on_history(&mut self, kind: RoomKind, messages: Vec<ChatMessage>) -> Vec<SessionEvent> {
        match self.rooms.resolve_history(kind) {
            HistoryOutcome::Current(conversation) => {
                self.log.replace_history(messages);
                self.window.reset(self.log.len());
                if let Some(last) = self.log.messages().last() {
                    self.directory.record_activity(&conversation, last);
                }
                info!(
                    conversation = %conversation,
                    count = self.log.len(),
                    "History replayed"
                );
                vec![SessionEvent::HistoryLoaded {
                    conversation,
                    count: self.log.len(),
                }]
            }
            HistoryOutcome::Stale(conversation) => {
                debug!(
                    conversation = %conversation,
                    count = messages.len(),
                    "Discarded history for a conversation no longer open"
                );
                Vec::new()
            }
            HistoryOutcome::Unexpected => Vec::new(),
        }
    }

    fn on_live_message(&mut self, kind: RoomKind, message: ChatMessage) -> Vec<SessionEvent> {
        let Some(conversation) = self.rooms.current().cloned() else {
            debug!("Live message with no open conversation");
            return Vec::new();
        };
        if RoomKind::of(&conversation) != kind {
            debug!(
                conversation = %conversation,
                "Live message kind does not match the open conversation"
            );
            return Vec::new();
        }
        if self.rooms.phase() != HistoryPhase::Ready {
            // The authoritative snapshot is still in flight and will carry
            // this message if it belongs here.
            debug!(conversation = %conversation, "Live message before history is ready");
            return Vec::new();
        }

        match self.log.append_incoming(message.clone(), &self.principal) {
            AppendOutcome::Appended => {
                self.directory.record_activity(&conversation, &message);
                vec![SessionEvent::MessageReceived {
                    conversation,
                    message,
                }]
            }
            AppendOutcome::Duplicate | AppendOutcome::OwnEcho => Vec::new(),
        }
    }

    fn on_notification(&mut self, notification: Notification) -> Vec<SessionEvent> {
        if self
            .notifications
            .record_inbound(notification.clone(), &self.principal.id)
        {
            info!(id = %notification.id, "Notification received");
            vec![
                SessionEvent::NotificationReceived(notification),
                SessionEvent::UnreadChanged {
                    count: self.notifications.unread_count(),
                },
            ]
        } else {
            Vec::new()
        }
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Open a course community room.
    pub fn open_community(&mut self, course_id: impl Into<CourseId>) -> Result<()> {
        self.switch_to(ConversationId::community(course_id))
    }

    /// Open a private student-tutor thread.
    pub fn open_private(&mut self, thread: PrivateThreadId) -> Result<()> {
        self.switch_to(ConversationId::Private(thread))
    }

    fn switch_to(&mut self, conversation: ConversationId) -> Result<()> {
        if self.link != LinkState::Up {
            return Err(ChatError::NotConnected);
        }
        if self.rooms.is_current(&conversation)
            && matches!(
                self.rooms.phase(),
                HistoryPhase::Loading | HistoryPhase::Ready
            )
        {
            debug!(conversation = %conversation, "Join is a no-op: already open");
            return Ok(());
        }

        self.send(RoomTracker::join_event(&conversation))?;
        self.log.clear();
        self.window.reset(0);
        self.rooms.switch(conversation.clone());
        info!(conversation = %conversation, "Opening conversation");
        Ok(())
    }

    /// Send a text message to the active conversation. The local copy is
    /// appended before the event is emitted; the returned message is what
    /// the UI should render.
    pub fn send_text(&mut self, body: &str) -> Result<ChatMessage> {
        let conversation = self.ready_conversation()?;
        let message = composer::compose_text(&self.principal, conversation.is_private(), body)?;

        self.log.append_local(message.clone());
        self.directory.record_activity(&conversation, &message);
        self.send(Self::text_event(&conversation, message.clone()))?;
        self.fanout_notification(&conversation, &message);

        Ok(message)
    }

    /// Send an image message to the active conversation.
    pub fn send_image(&mut self, file_name: &str, mime: &str, bytes: &[u8]) -> Result<ChatMessage> {
        let conversation = self.ready_conversation()?;
        let (message, image) = composer::compose_image(
            &self.principal,
            conversation.is_private(),
            file_name,
            mime,
            bytes,
        )?;

        self.log.append_local(message.clone());
        self.directory.record_activity(&conversation, &message);

        // The attachment travels beside the envelope, not inside it.
        let wire = ChatMessage {
            image: None,
            ..message.clone()
        };
        let event = match &conversation {
            ConversationId::Community(course_id) => ClientEvent::SendImageMessage {
                course_id: course_id.clone(),
                message: wire,
                image,
            },
            ConversationId::Private(thread) => ClientEvent::SendPrivateImageMessage {
                thread: thread.clone(),
                message: wire,
                image,
            },
        };
        self.send(event)?;
        self.fanout_notification(&conversation, &message);

        Ok(message)
    }

    /// Grow the visible window one page toward older messages.
    pub fn load_older(&mut self) -> bool {
        self.window.grow()
    }

    /// Flip one notification read locally and acknowledge it over the
    /// transport when it carries linkage. The caller mirrors the flip to
    /// the REST store when `flipped` is set.
    pub fn mark_notification_read(&mut self, id: &str) -> ReadAction {
        let action = self.notifications.mark_read(id);
        if let Some(receipt) = &action.receipt {
            self.send_best_effort(ClientEvent::MarkPrivateMessageNotificationAsRead(
                receipt.clone(),
            ));
        }
        action
    }

    /// Flip every unread notification, acknowledging each linked one.
    /// Returns how many entries flipped.
    pub fn mark_all_notifications_read(&mut self) -> usize {
        let flipped = self.notifications.unread_count();
        for receipt in self.notifications.mark_all_read() {
            self.send_best_effort(ClientEvent::MarkPrivateMessageNotificationAsRead(receipt));
        }
        flipped
    }

    // -----------------------------------------------------------------------
    // Bootstrap seeding
    // -----------------------------------------------------------------------

    pub fn seed_courses(&mut self, courses: Vec<CourseSummary>) {
        info!(count = courses.len(), "Enrolled courses loaded");
        for course in &courses {
            self.directory.upsert(
                ConversationId::community(course.id.clone()),
                course.title.clone(),
            );
        }
        self.courses = courses;
    }

    pub fn seed_notifications(&mut self, fetched: Vec<Notification>) {
        self.notifications.bootstrap(fetched);
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// The active conversation's visible message window, oldest first.
    pub fn visible_messages(&self) -> &[ChatMessage] {
        self.window.slice(self.log.messages())
    }

    pub fn has_older(&self) -> bool {
        self.window.has_older()
    }

    /// Conversations sorted by latest activity, most recent first.
    pub fn conversations(&self) -> Vec<&ConversationEntry> {
        self.directory.sorted()
    }

    pub fn notifications(&self) -> &[Notification] {
        self.notifications.entries()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.unread_count()
    }

    pub fn courses(&self) -> &[CourseSummary] {
        &self.courses
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn current_conversation(&self) -> Option<&ConversationId> {
        self.rooms.current()
    }

    pub fn history_phase(&self) -> HistoryPhase {
        self.rooms.phase()
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    fn ready_conversation(&self) -> Result<ConversationId> {
        if self.link != LinkState::Up {
            return Err(ChatError::NotConnected);
        }
        let Some(conversation) = self.rooms.current() else {
            return Err(ChatError::NoActiveConversation);
        };
        if self.rooms.phase() != HistoryPhase::Ready {
            return Err(ChatError::ConversationNotReady);
        }
        Ok(conversation.clone())
    }

    fn text_event(conversation: &ConversationId, message: ChatMessage) -> ClientEvent {
        match conversation {
            ConversationId::Community(course_id) => ClientEvent::SendMessage {
                course_id: course_id.clone(),
                message,
            },
            ConversationId::Private(thread) => ClientEvent::SendPrivateMessage {
                thread: thread.clone(),
                message,
            },
        }
    }

    /// Best-effort fanout accompanying a send, so other participants get a
    /// notification entry with a human-readable preview.
    fn fanout_notification(&self, conversation: &ConversationId, message: &ChatMessage) {
        let course_title = self
            .directory
            .get(conversation)
            .map(|entry| entry.title.clone())
            .unwrap_or_else(|| conversation.course_id().as_str().to_string());

        self.send_best_effort(ClientEvent::SendNotification {
            conversation_id: conversation.clone(),
            course_title,
            message: message.preview(),
            sender_id: self.principal.id.clone(),
        });
    }

    fn send(&self, event: ClientEvent) -> Result<()> {
        let name = event.name();
        self.cmd_tx
            .try_send(SocketCommand::Emit(event))
            .map_err(|e| {
                warn!(event = name, error = %e, "Socket command queue rejected event");
                ChatError::Transport(e.to_string())
            })
    }

    fn send_best_effort(&self, event: ClientEvent) {
        let name = event.name();
        if self.cmd_tx.try_send(SocketCommand::Emit(event)).is_err() {
            warn!(event = name, "Dropped emission: socket command queue unavailable");
        }
    }
}
