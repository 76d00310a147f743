//! A single conversation entry.

use uuid::Uuid;

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    /// Typed or spoken by the person using the app.
    User,
    /// Produced by JusBot, including apology entries for failed turns.
    Assistant,
}

impl Sender {
    /// Label shown above assistant bubbles in the chat view.
    pub fn display_name(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "JusBot",
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One immutable conversation entry.
///
/// Fields are private; once a message is built it can only be read.
///
/// ```
/// use jusbot_voice::conversation::{Message, Sender};
///
/// let m = Message::user("What is a contract?");
/// assert_eq!(m.sender(), Sender::User);
/// assert_eq!(m.text(), "What is a contract?");
/// assert!(!m.id().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: String,
    sender: Sender,
    text: String,
}

impl Message {
    /// Create a message with a fresh UUID v4 id.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
        }
    }

    /// Shorthand for `Message::new(Sender::User, text)`.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Shorthand for `Message::new(Sender::Assistant, text)`.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
