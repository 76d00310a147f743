//! Append-only conversation history.

use super::message::{Message, Sender};

/// Opening line shown before the user has said anything.
pub const GREETING: &str = "Hello! I'm JusBot, your AI legal assistant. How can I help you today? \
Please remember, I am an AI and cannot provide legal advice.";

/// Ordered record of every exchanged [`Message`].
///
/// Insertion order is chronological order.  There is deliberately no API to
/// edit, reorder or remove entries during a session.
///
/// ```
/// use jusbot_voice::conversation::{ConversationLog, Message};
///
/// let mut log = ConversationLog::new();
/// log.append(Message::user("Hi"));
/// log.append(Message::assistant("Hello!"));
/// assert_eq!(log.len(), 2);
/// assert_eq!(log.last().unwrap().text(), "Hello!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log seeded with the JusBot [`GREETING`].
    pub fn with_greeting() -> Self {
        let mut log = Self::new();
        log.append(Message::assistant(GREETING));
        log
    }

    /// Append `message` and return a reference to the stored entry.
    pub fn append(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of entries authored by `sender`.
    pub fn count_from(&self, sender: Sender) -> usize {
        self.messages.iter().filter(|m| m.sender() == sender).count()
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
