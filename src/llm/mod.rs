//! Chat-completion module for JusBot.
//!
//! This module provides:
//! * [`ChatSession`] — async trait for one stateful conversation.
//! * [`ChatBackend`] — factory that opens sessions for a model + persona.
//! * [`GeminiBackend`] / [`GeminiSession`] — Gemini REST implementation.
//! * [`ChatConnection`] — owns the active session and its [`ConnectionStatus`].
//! * [`JUSBOT_SYSTEM_INSTRUCTION`], [`AVAILABLE_MODELS`] — persona and model catalogue.
//! * [`LlmError`] — error variants for chat operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jusbot_voice::config::AppConfig;
//! use jusbot_voice::llm::{ChatConnection, GeminiBackend, JUSBOT_SYSTEM_INSTRUCTION};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let backend = Arc::new(GeminiBackend::from_config(&config.chat));
//!
//!     let mut chat = ChatConnection::new(backend, &config.chat.model, JUSBOT_SYSTEM_INSTRUCTION);
//!     chat.connect().unwrap();
//!
//!     let session = chat.session().unwrap();
//!     let reply = session.lock().await.send("What is a contract?").await.unwrap();
//!     println!("{reply}");
//! }
//! ```

pub mod connection;
pub mod gemini;
pub mod prompt;
pub mod session;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use connection::{ChatConnection, ConnectionStatus};
pub use gemini::{GeminiBackend, GeminiSession};
pub use prompt::{
    is_known_model, model_label, AVAILABLE_MODELS, DEFAULT_MODEL, JUSBOT_SYSTEM_INSTRUCTION,
};
pub use session::{ChatBackend, ChatSession, LlmError, SharedSession};
