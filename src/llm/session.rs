//! Core chat-session traits and the `LlmError` type.
//!
//! A [`ChatBackend`] creates [`ChatSession`]s.  Each session is bound to one
//! model and one system instruction and carries its own conversation context,
//! so consecutive [`ChatSession::send`] calls are context-aware.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while creating a session or exchanging a turn.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The service client could not be set up (usually a missing API key).
    #[error("Chat service not initialized: {0}")]
    NotInitialized(String),

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("chat request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("chat service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse chat response: {0}")]
    Parse(String),

    /// The model returned a response with no usable text content.
    #[error("chat service returned an empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

/// One stateful conversation with the completion service.
///
/// Concurrent `send` calls on one session are not supported; the `&mut self`
/// receiver plus [`SharedSession`]'s async mutex serialise turns.
#[async_trait]
pub trait ChatSession: Send {
    /// Exchange `text` for the assistant's reply.
    ///
    /// On success both the outgoing and the incoming turn are appended to the
    /// session context.  On failure the context is left unchanged.
    async fn send(&mut self, text: &str) -> Result<String, LlmError>;

    /// Model this session is bound to.
    fn model(&self) -> &str;
}

/// Session handle shared between the orchestrator loop and the task that
/// runs the in-flight turn.
pub type SharedSession = Arc<tokio::sync::Mutex<Box<dyn ChatSession>>>;

// ---------------------------------------------------------------------------
// ChatBackend
// ---------------------------------------------------------------------------

/// Factory for [`ChatSession`]s.
pub trait ChatBackend: Send + Sync {
    /// Establish a fresh session with empty context.
    ///
    /// Fails fast with [`LlmError::NotInitialized`] when the client cannot be
    /// used at all (e.g. no API key).
    fn start_session(
        &self,
        model: &str,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatSession>, LlmError>;
}
