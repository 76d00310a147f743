//! Call pipeline for JusBot.
//!
//! This module wires speech capture → chat completion → speech synthesis →
//! playback and exposes the shared state that the UI reads every frame.
//!
//! # Architecture
//!
//! ```text
//! CallCommand (mpsc, from the UI)
//!        │
//!        ▼
//! CallOrchestrator::run()  ← async tokio task
//!        │
//!        ├─ StartListening → SpeechCapture::start_listening   → Listening
//!        ├─ final transcript → ChatSession::send              → Processing
//!        ├─ reply → SpeechSynthesizer::synthesize → AudioOutput::play
//!        ├─ PlaybackEvent::Started                            → Speaking
//!        ├─ PlaybackEvent::Ended                              → Idle
//!        ├─ SendText → ChatSession::send (call status untouched)
//!        └─ HangUp → release capture + audio                  → Idle
//!
//! SharedState (Arc<Mutex<AppState>>) ←─── read by egui update() each frame
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use jusbot_voice::config::AppConfig;
//! use jusbot_voice::llm::{ChatConnection, GeminiBackend, JUSBOT_SYSTEM_INSTRUCTION};
//! use jusbot_voice::pipeline::{new_shared_state, CallCommand, CallOrchestrator};
//! use jusbot_voice::playback::RodioOutput;
//! use jusbot_voice::stt::{RecognizerConfig, SpeechCapture, UnsupportedRecognizer};
//! use jusbot_voice::tts::ElevenLabsSynthesizer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let shared_state = new_shared_state(config.clone());
//!
//!     let chat = ChatConnection::new(
//!         Arc::new(GeminiBackend::from_config(&config.chat)),
//!         &config.chat.model,
//!         JUSBOT_SYSTEM_INSTRUCTION,
//!     );
//!     let capture = SpeechCapture::new(
//!         Box::new(UnsupportedRecognizer),
//!         RecognizerConfig::from(&config.stt),
//!     );
//!
//!     let (tx, rx) = mpsc::channel::<CallCommand>(32);
//!     let orchestrator = CallOrchestrator::new(
//!         shared_state.clone(),
//!         chat,
//!         Arc::new(ElevenLabsSynthesizer::from_config(&config.tts)),
//!         capture,
//!         Arc::new(RodioOutput::new()),
//!     );
//!     tokio::spawn(orchestrator.run(rx));
//!
//!     tx.send(CallCommand::SendText("What is a contract?".into())).await.unwrap();
//! }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::CallOrchestrator;
pub use state::{
    lock_state, new_shared_state, AppState, CallCommand, CallStatus, CallTrigger, SharedState,
};
