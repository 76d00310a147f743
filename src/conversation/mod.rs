//! Conversation log shared by the text-chat and voice-call views.
//!
//! * [`Message`] / [`Sender`] — one immutable entry per utterance or reply.
//! * [`ConversationLog`] — append-only, chronologically ordered history.
//!
//! Both views read the same log through
//! [`SharedState`](crate::pipeline::SharedState), so a question typed in the
//! chat view and an answer spoken during a call land in one history.

pub mod history;
pub mod message;

pub use history::{ConversationLog, GREETING};
pub use message::{Message, Sender};
