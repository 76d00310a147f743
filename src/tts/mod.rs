//! Text-to-speech for spoken replies.
//!
//! * [`SpeechSynthesizer`] — async trait turning reply text into an [`AudioClip`].
//! * [`ElevenLabsSynthesizer`] — ElevenLabs REST implementation.
//! * [`markup`] — emphasis markers: stripped before synthesis, rendered as
//!   bold / italic spans in the transcript.

pub mod elevenlabs;
pub mod markup;

use async_trait::async_trait;
use thiserror::Error;

pub use elevenlabs::ElevenLabsSynthesizer;
pub use markup::{emphasis_spans, strip_emphasis, Span};

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// Encoded audio returned by the synthesizer, ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Raw encoded bytes (MP3 by default).
    pub data: Vec<u8>,
    /// MIME type of `data`, e.g. `audio/mpeg`.
    pub content_type: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TtsError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum TtsError {
    /// No API key configured.
    #[error("speech synthesis not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("speech synthesis request timed out")]
    Timeout,

    /// Non-success status; `detail` is the service's own explanation.
    #[error("ElevenLabs API error: {status} - {detail}")]
    Api { status: u16, detail: String },

    #[error("speech synthesis returned no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else {
            TtsError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer
// ---------------------------------------------------------------------------

/// Converts reply text into playable audio.
///
/// Implementations receive text that has already had emphasis markup removed.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, TtsError>;
}
