//! # tutoria-store
//!
//! In-memory client-side state for the chat stack: per-conversation
//! message logs with duplicate suppression, the visible-window engine,
//! the notification read-state tracker, and the conversation directory.
//!
//! Every store is a plain synchronous owner of its data; async plumbing
//! lives in the crates that drive them.

pub mod directory;
pub mod log;
pub mod notifications;
pub mod window;

pub use directory::{ConversationDirectory, ConversationEntry, LatestActivity};
pub use log::{AppendOutcome, MessageLog};
pub use notifications::{NotificationTracker, ReadAction};
pub use window::MessageWindow;
