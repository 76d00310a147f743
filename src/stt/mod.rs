//! Speech capture: microphone → single utterance → transcript.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ SpeechCapture  (session ids, interim text, error, listening) │
//! │      │ start/stop                ▲ handle_event()            │
//! │      ▼                           │                           │
//! │ Recognizer (trait) ──RecognitionEvent (tokio mpsc)──────────▶│
//! │      │                                                       │
//! │      ├─ WhisperRecognizer                                    │
//! │      │     cpal mic → mono → rubato 16 kHz → Endpointer      │
//! │      │     → WhisperTranscriber → Results{final} + End       │
//! │      └─ UnsupportedRecognizer                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod recognizer;
pub mod signal;
pub mod whisper;

use thiserror::Error;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use capture::{CaptureOutcome, SpeechCapture};
pub use recognizer::{
    RecognitionAlternative, RecognitionEvent, RecognitionResult, Recognizer, RecognizerConfig,
    UnsupportedRecognizer,
};
pub use signal::{Endpoint, EndpointSettings, Endpointer, MonoResampler};
pub use whisper::{WhisperRecognizer, WhisperTranscriber};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the speech-capture subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// Speech capture is not available on this system.
    #[error("Speech recognition is not supported on this system.")]
    Unsupported,

    /// The GGML model file was not found at the given path.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a `WhisperContext` or `WhisperState`.
    #[error("Whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// The microphone could not be opened or started.
    #[error("audio input error: {0}")]
    Device(String),

    /// Sample-rate conversion failed.
    #[error("audio conversion error: {0}")]
    Audio(String),

    /// An error occurred during the inference pass.
    #[error("Transcription error: {0}")]
    Transcription(String),
}
