use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method},
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use tutoria_shared::{CourseId, Notification, UserId};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::hub::ChatHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: ChatHub,
    pub config: Arc<RelayConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(crate::session::ws_handler))
        .route("/tutor/notifications", get(list_notifications))
        .route(
            "/tutor/notifications/{id}/read",
            put(mark_notification_read),
        )
        .route(
            "/tutor/notifications/read-all",
            put(mark_all_notifications_read),
        )
        .route("/purchase/enrolled-courses", get(enrolled_courses))
        .route("/courses/{course_id}/students", get(course_students))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseResponse {
    id: CourseId,
    title: String,
    tutor_id: Option<UserId>,
    tutor_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentResponse {
    id: UserId,
    name: String,
}

/// The bearer token doubles as the caller's identity id. This is a dev
/// stand-in; real authentication is an upstream collaborator.
fn bearer_identity(headers: &HeaderMap) -> Result<UserId, RelayError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth).trim();

    if token.is_empty() {
        return Err(RelayError::Unauthorized("Missing bearer token".into()));
    }
    Ok(UserId::from(token))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_notifications(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, RelayError> {
    let user = bearer_identity(&headers)?;
    Ok(Json(state.hub.notifications_for(&user).await))
}

async fn mark_notification_read(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let user = bearer_identity(&headers)?;

    if !state.hub.mark_read_for(&user, &id).await {
        return Err(RelayError::NotFound(format!("No unread notification {id}")));
    }

    info!(user = %user, notification = %id, "Notification marked read");
    Ok(Json(serde_json::json!({ "updated": true })))
}

async fn mark_all_notifications_read(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let user = bearer_identity(&headers)?;
    let updated = state.hub.mark_all_read_for(&user).await;

    info!(user = %user, updated, "All notifications marked read");
    Ok(Json(serde_json::json!({ "updated": updated })))
}

/// Course list stand-in: every community room this relay has seen.
/// Enrollment bookkeeping lives upstream.
async fn enrolled_courses(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseResponse>>, RelayError> {
    let user = bearer_identity(&headers)?;
    debug!(user = %user, "Course list served");

    let courses = state
        .hub
        .courses()
        .await
        .into_iter()
        .map(|c| CourseResponse {
            id: c.id,
            title: c.title,
            tutor_id: None,
            tutor_name: None,
        })
        .collect();
    Ok(Json(courses))
}

async fn course_students(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<StudentResponse>>, RelayError> {
    let _user = bearer_identity(&headers)?;

    let roster = state
        .hub
        .roster(&CourseId::from(course_id))
        .await
        .into_iter()
        .map(|entry| StudentResponse {
            id: entry.id,
            name: entry.name,
        })
        .collect();
    Ok(Json(roster))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting relay HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
