//! [`SpeechCapture`]: one-utterance-at-a-time capture on top of a
//! [`Recognizer`].
//!
//! Each `start_listening` opens a new session id.  Events carrying an older
//! id are ignored, so a recognizer that reports late after `stop` can never
//! deliver a transcript into the wrong turn.

use tokio::sync::mpsc::UnboundedSender;

use crate::stt::recognizer::{RecognitionEvent, RecognitionResult, Recognizer, RecognizerConfig};
use crate::stt::SttError;

/// What [`SpeechCapture::handle_event`] reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// The final transcript of the session.  Delivered at most once.
    Transcript(String),
    /// The recognizer reported an error; carries the user-facing message.
    Failed(String),
    /// The session ended without a transcript.
    Ended,
}

pub struct SpeechCapture {
    recognizer: Box<dyn Recognizer>,
    config: RecognizerConfig,
    session: u64,
    listening: bool,
    transcript: String,
    error: Option<String>,
}

impl SpeechCapture {
    pub fn new(recognizer: Box<dyn Recognizer>, config: RecognizerConfig) -> Self {
        Self {
            recognizer,
            config,
            session: 0,
            listening: false,
            transcript: String::new(),
            error: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Interim (in-progress) transcript of the current session.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Last capture error, user-facing.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Open a new capture session.
    ///
    /// A no-op while already listening.  Fails with
    /// [`SttError::Unsupported`] when the recognizer cannot capture at all.
    pub fn start_listening(
        &mut self,
        events: UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SttError> {
        if !self.recognizer.is_supported() {
            self.error = Some(SttError::Unsupported.to_string());
            return Err(SttError::Unsupported);
        }
        if self.listening {
            return Ok(());
        }

        self.transcript.clear();
        self.error = None;
        self.session += 1;

        match self.recognizer.start(self.session, &self.config, events) {
            Ok(()) => {
                log::info!("capture: session {} started", self.session);
                self.listening = true;
                Ok(())
            }
            Err(e) => {
                log::error!("capture: could not start: {e}");
                self.error = Some(match &e {
                    SttError::Unsupported => e.to_string(),
                    other => format!("Speech recognition error: {other}"),
                });
                Err(e)
            }
        }
    }

    /// End the current session early.  No transcript is delivered for it.
    pub fn stop_listening(&mut self) {
        if self.listening {
            log::info!("capture: session {} stopped", self.session);
            self.recognizer.stop();
            self.listening = false;
        }
    }

    /// Feed one recognizer event.
    pub fn handle_event(&mut self, event: RecognitionEvent) -> Option<CaptureOutcome> {
        if event.session() != self.session || !self.listening {
            log::debug!("capture: ignoring event for session {}", event.session());
            return None;
        }

        match event {
            RecognitionEvent::Results { results, .. } => self.on_results(&results),
            RecognitionEvent::Error { message, .. } => {
                log::warn!("capture: recognizer error: {message}");
                let message = format!("Speech recognition error: {message}");
                self.error = Some(message.clone());
                self.finish();
                Some(CaptureOutcome::Failed(message))
            }
            RecognitionEvent::End { .. } => {
                self.listening = false;
                Some(CaptureOutcome::Ended)
            }
        }
    }

    fn on_results(&mut self, results: &[RecognitionResult]) -> Option<CaptureOutcome> {
        let finals: Vec<&RecognitionResult> = results.iter().filter(|r| r.is_final).collect();

        if finals.is_empty() {
            self.transcript = results.iter().map(RecognitionResult::best).collect();
            return None;
        }

        let text: String = finals.into_iter().map(RecognitionResult::best).collect();
        self.transcript.clear();
        self.finish();

        if text.trim().is_empty() {
            log::info!("capture: session {} produced no words", self.session);
            return Some(CaptureOutcome::Ended);
        }
        Some(CaptureOutcome::Transcript(text))
    }

    fn finish(&mut self) {
        self.recognizer.stop();
        self.listening = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
