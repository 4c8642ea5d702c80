//! # tutoria-shared
//!
//! Domain types, message/notification models, and the wire protocol for the
//! tutoria chat stack.
//!
//! The wire format is one JSON object per text frame, `{"event", "data"}`,
//! shared verbatim between the client crates and the relay server.

pub mod constants;
pub mod models;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use models::*;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::*;
