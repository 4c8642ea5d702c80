//! # tutoria-client
//!
//! Embeddable chat client for the tutoria platform: the WebSocket event
//! channel, the REST bootstrap, and all client-side chat state behind a
//! single [`ChatClient`] handle. The embedding application consumes
//! [`SessionEvent`]s from [`ChatClient::next_event`] and calls the async
//! methods for everything user-initiated.

pub mod bridge;
pub mod composer;
pub mod config;
pub mod error;
pub mod events;
pub mod profile;
pub mod rest;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use tutoria_net::{spawn_socket, SocketCommand, SocketConfig};

pub use tutoria_shared::{
    ChatMessage, ConversationId, CourseId, DeliveryStatus, ImageAttachment, LinkState,
    Notification, Principal, PrivateThreadId, Role, UserId,
};
pub use tutoria_store::ConversationEntry;

pub use config::ClientConfig;
pub use error::{ChatError, ComposeError, Result};
pub use events::{NoticeKind, SessionEvent, UserNotice};
pub use profile::{Profile, ProfileStore};
pub use rest::{CourseSummary, RestClient, StudentSummary};
pub use rooms::{HistoryPhase, RoomKind};
pub use session::ChatSession;

/// Install the global tracing subscriber. Call once, early.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("tutoria_client=debug,tutoria_net=debug,tutoria_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// A connected chat client: one socket task, one session, one bridge.
pub struct ChatClient {
    session: Arc<Mutex<ChatSession>>,
    events: mpsc::Receiver<SessionEvent>,
    rest: RestClient,
    cmd_tx: mpsc::Sender<SocketCommand>,
    bridge: JoinHandle<()>,
}

impl ChatClient {
    /// Start the socket and bridge tasks for the signed-in user. Returns
    /// as soon as the tasks are spawned; the channel becoming usable is
    /// reported through [`SessionEvent::LinkUp`].
    pub async fn connect(config: ClientConfig, profile: Profile) -> Result<Self> {
        let rest = RestClient::new(&config.api_url, &profile.token)?;

        let socket_config = SocketConfig::new(&config.socket_url, profile.principal.id.clone());
        let (cmd_tx, notif_rx) = spawn_socket(socket_config);

        let session = Arc::new(Mutex::new(ChatSession::new(
            profile.principal,
            &config,
            cmd_tx.clone(),
        )));

        let (event_tx, events) = mpsc::channel(256);
        let bridge = bridge::spawn_bridge(
            Arc::clone(&session),
            rest.clone(),
            notif_rx,
            event_tx,
            config.poll_interval,
        );

        Ok(Self {
            session,
            events,
            rest,
            cmd_tx,
            bridge,
        })
    }

    /// Next event to surface in the UI. `None` once the bridge has
    /// stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub async fn open_community(&self, course_id: impl Into<CourseId>) -> Result<()> {
        self.session.lock().await.open_community(course_id)
    }

    pub async fn open_private(&self, thread: PrivateThreadId) -> Result<()> {
        self.session.lock().await.open_private(thread)
    }

    pub async fn send_text(&self, body: &str) -> Result<ChatMessage> {
        self.session.lock().await.send_text(body)
    }

    pub async fn send_image(
        &self,
        file_name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<ChatMessage> {
        self.session.lock().await.send_image(file_name, mime, bytes)
    }

    /// Reveal one more page of older messages. Returns false at the top.
    pub async fn load_older(&self) -> bool {
        self.session.lock().await.load_older()
    }

    /// Clone of the visible window, oldest first.
    pub async fn visible_messages(&self) -> Vec<ChatMessage> {
        self.session.lock().await.visible_messages().to_vec()
    }

    /// Conversation list, most recently active first.
    pub async fn conversations(&self) -> Vec<ConversationEntry> {
        self.session
            .lock()
            .await
            .conversations()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.session.lock().await.notifications().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.session.lock().await.unread_count()
    }

    pub async fn link_state(&self) -> LinkState {
        self.session.lock().await.link_state()
    }

    /// Mark one notification read everywhere: locally, over the event
    /// channel when it links to a private thread, and in the REST store.
    /// Returns whether anything actually flipped.
    pub async fn mark_notification_read(&self, id: &str) -> Result<bool> {
        let action = self.session.lock().await.mark_notification_read(id);
        if action.flipped {
            self.rest.mark_notification_read(id).await?;
        }
        Ok(action.flipped)
    }

    /// Mark every notification read. Returns how many flipped.
    pub async fn mark_all_notifications_read(&self) -> Result<usize> {
        let flipped = self.session.lock().await.mark_all_notifications_read();
        if flipped > 0 {
            self.rest.mark_all_notifications_read().await?;
        }
        Ok(flipped)
    }

    /// Roster of a course's students, for starting private threads.
    pub async fn course_students(&self, course_id: &CourseId) -> Result<Vec<StudentSummary>> {
        self.rest.fetch_course_students(course_id).await
    }

    /// Shared handle to the underlying session, for callers that need
    /// more than this facade exposes.
    pub fn session(&self) -> Arc<Mutex<ChatSession>> {
        Arc::clone(&self.session)
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Stop the socket task and wait for the bridge to drain.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(SocketCommand::Shutdown).await;
        let _ = self.bridge.await;
    }
}
