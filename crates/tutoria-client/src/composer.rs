//! Builds outgoing message envelopes.
//!
//! All validation happens here, before any network call: empty bodies,
//! oversized attachments and non-image MIME types never reach the
//! transport. Every composed message carries a fresh correlation id so the
//! log can reject a re-delivered copy before the durable id exists.

use chrono::Utc;
use uuid::Uuid;

use tutoria_shared::constants::MAX_IMAGE_BYTES;
use tutoria_shared::{ChatMessage, ImageAttachment, Principal};

use crate::error::ComposeError;

/// Compose a text message. The body is trimmed; an empty result is
/// rejected.
pub fn compose_text(
    author: &Principal,
    private: bool,
    body: &str,
) -> Result<ChatMessage, ComposeError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ComposeError::EmptyBody);
    }

    Ok(fresh_message(author, private, body.to_string(), None))
}

/// Compose an image message. Returns the local message (attachment
/// embedded, for rendering) together with the attachment itself, which
/// travels beside the envelope on the wire.
pub fn compose_image(
    author: &Principal,
    private: bool,
    file_name: &str,
    mime: &str,
    bytes: &[u8],
) -> Result<(ChatMessage, ImageAttachment), ComposeError> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ComposeError::ImageTooLarge {
            size: bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }
    if !mime.starts_with("image/") {
        return Err(ComposeError::NotAnImage(mime.to_string()));
    }

    let attachment = ImageAttachment::from_bytes(file_name, mime, bytes);
    let message = fresh_message(author, private, String::new(), Some(attachment.clone()));

    Ok((message, attachment))
}

fn fresh_message(
    author: &Principal,
    private: bool,
    body: String,
    image: Option<ImageAttachment>,
) -> ChatMessage {
    // Private-thread messages carry the durable author id; community
    // messages identify the author by display name only.
    let author_id = private.then(|| author.id.clone());

    ChatMessage {
        id: None,
        client_ref: Some(Uuid::new_v4()),
        author_name: author.name.clone(),
        author_id,
        body,
        image,
        sent_at: Utc::now(),
        status: Default::default(),
    }
}
