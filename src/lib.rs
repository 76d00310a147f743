//! JusBot Voice — a chat and voice-call front-end for an AI legal assistant.
//!
//! * [`config`] — settings file and environment overrides.
//! * [`conversation`] — the append-only message log shared by both views.
//! * [`llm`] — chat sessions against the completion service.
//! * [`stt`] — single-utterance speech capture.
//! * [`tts`] — speech synthesis and emphasis markup.
//! * [`playback`] — playing synthesized replies.
//! * [`pipeline`] — the call state machine and its orchestrator.
//! * [`app`] — the egui window.

pub mod app;
pub mod config;
pub mod conversation;
pub mod llm;
pub mod pipeline;
pub mod playback;
pub mod stt;
pub mod tts;
