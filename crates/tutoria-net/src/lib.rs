// Client side of the chat event channel: one WebSocket per identity.

pub mod backoff;
pub mod socket;

pub use backoff::Backoff;
pub use socket::{spawn_socket, SocketCommand, SocketConfig, SocketNotification};
