//! Recognizer seam and the events it emits.

use tokio::sync::mpsc::UnboundedSender;

use crate::config::SttConfig;
use crate::stt::SttError;

/// Per-session recognition options.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerConfig {
    /// Keep listening after the first utterance.
    pub continuous: bool,
    /// Emit non-final results while the user is speaking.
    pub interim_results: bool,
    /// BCP-47 locale, e.g. `en-US`.
    pub locale: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            interim_results: true,
            locale: "en-US".into(),
        }
    }
}

impl From<&SttConfig> for RecognizerConfig {
    fn from(config: &SttConfig) -> Self {
        Self {
            continuous: config.continuous,
            interim_results: config.interim_results,
            locale: config.locale.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAlternative {
    pub transcript: String,
}

/// One recognition hypothesis group.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub is_final: bool,
    /// Most likely first.
    pub alternatives: Vec<RecognitionAlternative>,
}

impl RecognitionResult {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            is_final: true,
            alternatives: vec![RecognitionAlternative {
                transcript: text.into(),
            }],
        }
    }

    pub fn interim_text(text: impl Into<String>) -> Self {
        Self {
            is_final: false,
            ..Self::final_text(text)
        }
    }

    /// Transcript of the most likely alternative, or `""`.
    pub fn best(&self) -> &str {
        self.alternatives
            .first()
            .map(|a| a.transcript.as_str())
            .unwrap_or("")
    }
}

/// Everything a recognizer reports, tagged with the capture session id
/// passed to [`Recognizer::start`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Results {
        session: u64,
        results: Vec<RecognitionResult>,
    },
    Error {
        session: u64,
        message: String,
    },
    End {
        session: u64,
    },
}

impl RecognitionEvent {
    pub fn session(&self) -> u64 {
        match self {
            RecognitionEvent::Results { session, .. }
            | RecognitionEvent::Error { session, .. }
            | RecognitionEvent::End { session } => *session,
        }
    }
}

/// A speech recognizer.
///
/// `start` begins one capture session; events for it are sent on `events`
/// until an `End` event or until `stop` is called.
pub trait Recognizer: Send {
    fn is_supported(&self) -> bool;

    fn start(
        &mut self,
        session: u64,
        config: &RecognizerConfig,
        events: UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SttError>;

    /// End the current session.  No further events are sent for it.
    fn stop(&mut self);
}

/// Stand-in for systems without speech capture.
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

impl Recognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(
        &mut self,
        _session: u64,
        _config: &RecognizerConfig,
        _events: UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SttError> {
        Err(SttError::Unsupported)
    }

    fn stop(&mut self) {}
}
