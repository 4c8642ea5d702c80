//! Bridge between the socket task, the REST bootstrap, and the session.
//!
//! A single task owns the inbound side of the session: it seeds courses
//! and notifications over REST, then folds socket notifications into the
//! session and forwards the resulting events to the embedding application.
//! A one-second timer drives join expiry and a slow poll re-fetches
//! notifications as a backstop for fanout events lost while offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant};
use tracing::{debug, info, warn};

use tutoria_net::SocketNotification;

use crate::error::Result;
use crate::events::{SessionEvent, UserNotice};
use crate::rest::RestClient;
use crate::session::ChatSession;

pub fn spawn_bridge(
    session: Arc<Mutex<ChatSession>>,
    rest: RestClient,
    notif_rx: mpsc::Receiver<SocketNotification>,
    event_tx: mpsc::Sender<SessionEvent>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(bridge_loop(session, rest, notif_rx, event_tx, poll_interval))
}

async fn bridge_loop(
    session: Arc<Mutex<ChatSession>>,
    rest: RestClient,
    mut notif_rx: mpsc::Receiver<SocketNotification>,
    event_tx: mpsc::Sender<SessionEvent>,
    poll_interval: Duration,
) {
    info!("Session bridge started");

    bootstrap(&session, &rest, &event_tx).await;

    let mut expiry = interval(Duration::from_secs(1));
    let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);

    loop {
        tokio::select! {
            notification = notif_rx.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                let events = session.lock().await.apply(notification);
                forward(&event_tx, events).await;
            }
            _ = expiry.tick() => {
                let events = session.lock().await.on_tick();
                forward(&event_tx, events).await;
            }
            _ = poll.tick() => {
                if let Err(e) = refresh_notifications(&session, &rest, &event_tx).await {
                    debug!(error = %e, "Notification poll failed");
                }
            }
        }
    }

    warn!("Session bridge ended");
}

async fn bootstrap(
    session: &Arc<Mutex<ChatSession>>,
    rest: &RestClient,
    event_tx: &mpsc::Sender<SessionEvent>,
) {
    match rest.fetch_enrolled_courses().await {
        Ok(courses) => session.lock().await.seed_courses(courses),
        Err(e) => {
            warn!(error = %e, "Could not load enrolled courses");
            forward(
                event_tx,
                vec![SessionEvent::Notice(UserNotice::warning(
                    "Course list is unavailable; conversations may show ids instead of titles",
                ))],
            )
            .await;
        }
    }

    if let Err(e) = refresh_notifications(session, rest, event_tx).await {
        warn!(error = %e, "Could not load notifications");
        forward(
            event_tx,
            vec![SessionEvent::Notice(UserNotice::warning(
                "Notifications are unavailable right now",
            ))],
        )
        .await;
    }
}

/// Re-fetch the notification feed and merge it into the tracker. The
/// fetched read state wins, so a flip made on another device converges
/// here within one poll interval.
async fn refresh_notifications(
    session: &Arc<Mutex<ChatSession>>,
    rest: &RestClient,
    event_tx: &mpsc::Sender<SessionEvent>,
) -> Result<()> {
    let fetched = rest.fetch_notifications().await?;

    let mut session = session.lock().await;
    let before = session.unread_count();
    session.seed_notifications(fetched);
    let after = session.unread_count();
    drop(session);

    if before != after {
        forward(
            event_tx,
            vec![SessionEvent::UnreadChanged { count: after }],
        )
        .await;
    }
    Ok(())
}

async fn forward(event_tx: &mpsc::Sender<SessionEvent>, events: Vec<SessionEvent>) {
    for event in events {
        // The embedding application may have stopped listening; the
        // session itself stays queryable either way.
        let _ = event_tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;
    use tutoria_shared::{Principal, Role};

    use crate::config::ClientConfig;

    #[tokio::test]
    async fn test_bridge_reports_bootstrap_failure_and_keeps_pumping() {
        let principal = Principal {
            id: "stu-1".into(),
            name: "Ada".to_string(),
            role: Role::Student,
        };
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let session = Arc::new(Mutex::new(ChatSession::new(
            principal,
            &ClientConfig::default(),
            cmd_tx,
        )));

        // Nothing listens on port 1, so both bootstrap fetches fail fast.
        let rest = RestClient::new("http://127.0.0.1:1", "token").unwrap();
        let (notif_tx, notif_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(32);

        let handle = spawn_bridge(
            session,
            rest,
            notif_rx,
            event_tx,
            Duration::from_secs(300),
        );

        notif_tx
            .send(SocketNotification::Up { reconnected: false })
            .await
            .unwrap();

        let mut saw_link_up = false;
        for _ in 0..8 {
            let event = timeout(Duration::from_secs(5), event_rx.recv())
                .await
                .expect("bridge produced no event")
                .expect("event channel closed");
            if event == (SessionEvent::LinkUp { reconnected: false }) {
                saw_link_up = true;
                break;
            }
            assert!(matches!(event, SessionEvent::Notice(_)));
        }
        assert!(saw_link_up);

        drop(notif_tx);
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("bridge did not stop")
            .unwrap();
    }
}
