/// Application name
pub const APP_NAME: &str = "Tutoria";

/// Maximum raw image attachment size in bytes (5 MiB)
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum size of one wire frame in bytes (base64 headroom over the
/// image cap plus envelope)
pub const MAX_EVENT_BYTES: usize = 8 * 1024 * 1024;

/// Messages revealed per pagination step
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Notification bootstrap re-fetch interval in seconds
pub const NOTIFICATION_POLL_SECS: u64 = 30;

/// Seconds before an unanswered room join is abandoned
pub const JOIN_TIMEOUT_SECS: u64 = 5;

/// First reconnect delay in milliseconds
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Ceiling for the reconnect delay in seconds
pub const RECONNECT_MAX_DELAY_SECS: u64 = 30;

/// Reconnect attempts before the channel is declared lost
pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;

/// Messages kept per room by the relay's in-memory history
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Notifications kept per identity by the relay
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 200;

/// Default relay HTTP/WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 8085;

/// Preview text for messages whose body is an image
pub const IMAGE_PREVIEW_TEXT: &str = "Sent an image";
