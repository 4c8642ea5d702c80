use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

/// Failures surfaced by the chat client, one variant per boundary of the
/// error taxonomy: connection, validation, not-connected, remote, bootstrap.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Not connected to the chat relay")]
    NotConnected,

    #[error("No conversation is open")]
    NoActiveConversation,

    #[error("Conversation is not ready: history has not loaded yet")]
    ConversationNotReady,

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("Transport unavailable: {0}")]
    Transport(String),

    #[error("Bootstrap request failed: {0}")]
    Bootstrap(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile storage: {0}")]
    Profile(String),
}

/// Local validation failures for outgoing messages, raised before any
/// network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Message is empty")]
    EmptyBody,

    #[error("Image is too large: {size} bytes (limit {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Attachment is not an image: {0}")]
    NotAnImage(String),
}
