//! Owns the active chat session and its connection status.
//!
//! ```text
//! connect() ──ok──▶ Connected   (session = Some)
//!           ──err─▶ Failed      (session = None)
//! select_model(m != current) ──▶ connect() again with m, fresh context
//! ```

use std::sync::Arc;

use crate::llm::session::{ChatBackend, LlmError, SharedSession};

// ---------------------------------------------------------------------------
// ConnectionStatus
// ---------------------------------------------------------------------------

/// Progress of establishing the chat session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Session could not be created; carries the underlying reason.
    Failed(String),
}

impl ConnectionStatus {
    /// Status line shown above the chat input.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "Connecting to JusBot...",
            ConnectionStatus::Connected => "Connected. Ready for your questions.",
            ConnectionStatus::Failed(_) => "Connection failed. Please check the API key.",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

// ---------------------------------------------------------------------------
// ChatConnection
// ---------------------------------------------------------------------------

/// The single session shared by the text chat and the voice call.
pub struct ChatConnection {
    backend: Arc<dyn ChatBackend>,
    system_instruction: String,
    model: String,
    session: Option<SharedSession>,
    status: ConnectionStatus,
}

impl ChatConnection {
    /// Create an unconnected handle.  Call [`ChatConnection::connect`] next.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            system_instruction: system_instruction.into(),
            model: model.into(),
            session: None,
            status: ConnectionStatus::Connecting,
        }
    }

    /// (Re)establish a session for the current model, dropping any previous
    /// session and its context.
    pub fn connect(&mut self) -> Result<(), LlmError> {
        self.session = None;
        self.status = ConnectionStatus::Connecting;

        match self
            .backend
            .start_session(&self.model, &self.system_instruction)
        {
            Ok(session) => {
                log::info!("chat: connected ({})", self.model);
                self.session = Some(Arc::new(tokio::sync::Mutex::new(session)));
                self.status = ConnectionStatus::Connected;
                Ok(())
            }
            Err(e) => {
                log::error!("chat: failed to start session: {e}");
                self.status = ConnectionStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Switch to `model` and start over with an empty context.
    ///
    /// Selecting the model that is already active is a no-op and keeps the
    /// current conversation context.
    pub fn select_model(&mut self, model: &str) -> Result<(), LlmError> {
        if model == self.model && self.session.is_some() {
            return Ok(());
        }
        log::info!("chat: switching model {} -> {model}", self.model);
        self.model = model.to_string();
        self.connect()
    }

    /// Handle to the active session, if any.
    pub fn session(&self) -> Option<SharedSession> {
        self.session.clone()
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
