//! whisper.cpp-backed [`Recognizer`].
//!
//! [`WhisperTranscriber`] wraps a `whisper_rs::WhisperContext` and turns one
//! 16 kHz mono clip into text.  [`WhisperRecognizer`] runs a capture thread
//! per session:
//!
//! ```text
//! start() ──spawn──▶ [capture thread]
//!                      Microphone ─▶ downmix ─▶ MonoResampler ─▶ Endpointer
//!                        │ every INTERIM_EVERY of speech: Results{interim}
//!                        ├─ Complete ─▶ transcribe ─▶ Results{final}, End
//!                        ├─ NoSpeech ─▶ Error{"no-speech"}, End
//!                        └─ stop flag ─▶ exit without events
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::SttConfig;
use crate::stt::recognizer::{RecognitionEvent, RecognitionResult, Recognizer, RecognizerConfig};
use crate::stt::signal::{
    downmix_to_mono, Endpoint, EndpointSettings, Endpointer, Microphone, MonoResampler,
    TARGET_RATE,
};
use crate::stt::SttError;

/// Whisper rejects clips shorter than one second; shorter ones are padded.
const MIN_SAMPLES: usize = TARGET_RATE as usize;
/// How often an interim transcript is produced while the user speaks.
const INTERIM_EVERY_MS: u64 = 2_000;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// WhisperTranscriber
// ---------------------------------------------------------------------------

/// A loaded GGML model.
///
/// A new `WhisperState` is created for every [`transcribe`] call so the
/// transcriber can be shared across threads without locking.
///
/// [`transcribe`]: WhisperTranscriber::transcribe
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    /// ISO-639-1 code derived from the locale (`en-US` → `en`).
    language: String,
    n_threads: i32,
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    /// Load the GGML model at `model_path`.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`] — `model_path` does not exist.
    /// - [`SttError::ContextInit`]  — whisper-rs failed to load the file.
    pub fn load(model_path: impl AsRef<Path>, locale: &str) -> Result<Self, SttError> {
        let path = model_path.as_ref();
        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }
        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("capture: loaded whisper model {}", path.display());
        Ok(Self {
            ctx,
            language: language_of(locale),
            n_threads: optimal_threads(),
        })
    }

    /// Transcribe 16 kHz mono `audio`.  Returns trimmed text.
    pub fn transcribe(&self, audio: &[f32]) -> Result<String, SttError> {
        let mut padded;
        let audio = if audio.len() < MIN_SAMPLES {
            padded = audio.to_vec();
            padded.resize(MIN_SAMPLES, 0.0);
            padded.as_slice()
        } else {
            audio
        };

        let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        fp.set_language(Some(self.language.as_str()));
        fp.set_n_threads(self.n_threads);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }
        Ok(text.trim().to_string())
    }
}

/// `en-US` → `en`.  Empty input falls back to `en`.
fn language_of(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("en")
        .to_ascii_lowercase()
}

/// CPU threads handed to whisper, capped at 8.
fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// WhisperRecognizer
// ---------------------------------------------------------------------------

pub struct WhisperRecognizer {
    transcriber: Arc<WhisperTranscriber>,
    endpoint: EndpointSettings,
    stop: Option<Arc<AtomicBool>>,
}

impl WhisperRecognizer {
    pub fn new(transcriber: WhisperTranscriber, config: &SttConfig) -> Self {
        Self {
            transcriber: Arc::new(transcriber),
            endpoint: EndpointSettings::from(config),
            stop: None,
        }
    }
}

impl Recognizer for WhisperRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(
        &mut self,
        session: u64,
        config: &RecognizerConfig,
        events: UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SttError> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let job = CaptureJob {
            session,
            transcriber: self.transcriber.clone(),
            endpoint: self.endpoint.clone(),
            interim_results: config.interim_results,
            stop: stop.clone(),
            events,
        };

        std::thread::Builder::new()
            .name(format!("capture-{session}"))
            .spawn(move || job.run())
            .map_err(|e| SttError::Device(format!("could not start capture thread: {e}")))?;

        self.stop = Some(stop);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(flag) = self.stop.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for WhisperRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the capture thread owns for one session.
struct CaptureJob {
    session: u64,
    transcriber: Arc<WhisperTranscriber>,
    endpoint: EndpointSettings,
    interim_results: bool,
    stop: Arc<AtomicBool>,
    events: UnboundedSender<RecognitionEvent>,
}

impl CaptureJob {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Send unless the session was stopped meanwhile.
    fn emit(&self, event: RecognitionEvent) {
        if !self.stopped() {
            let _ = self.events.send(event);
        }
    }

    fn run(self) {
        let session = self.session;
        match self.capture() {
            Ok(Some(text)) => {
                log::info!("capture: session {session} recognised {} chars", text.len());
                self.emit(RecognitionEvent::Results {
                    session,
                    results: vec![RecognitionResult::final_text(text)],
                });
            }
            Ok(None) => {}
            Err(message) => {
                log::warn!("capture: session {session} failed: {message}");
                self.emit(RecognitionEvent::Error { session, message });
            }
        }
        self.emit(RecognitionEvent::End { session });
    }

    /// Record one utterance.  `Ok(None)` means the session was stopped.
    fn capture(&self) -> Result<Option<String>, String> {
        let mic = Microphone::open_default().map_err(|e| e.to_string())?;
        let mut resampler = MonoResampler::new(mic.sample_rate()).map_err(|e| e.to_string())?;
        let mut endpointer = Endpointer::new(self.endpoint.clone());

        let (tx, rx) = std_mpsc::channel::<Vec<f32>>();
        let stream = mic.start(tx).map_err(|e| e.to_string())?;
        log::debug!(
            "capture: session {} recording at {} Hz, {} ch",
            self.session,
            mic.sample_rate(),
            mic.channels()
        );

        let mut next_interim_ms = INTERIM_EVERY_MS;
        let verdict = loop {
            if self.stopped() {
                return Ok(None);
            }
            let buffer = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(b) => b,
                Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    return Err("audio-capture".into());
                }
            };

            let mono = downmix_to_mono(&buffer, mic.channels());
            let samples = resampler.push(&mono).map_err(|e| e.to_string())?;
            let verdict = endpointer.push(&samples);
            if verdict != Endpoint::Listening {
                break verdict;
            }

            if self.interim_results
                && endpointer.heard_speech()
                && endpointer.buffered_ms() >= next_interim_ms
            {
                next_interim_ms = endpointer.buffered_ms() + INTERIM_EVERY_MS;
                if let Ok(partial) = self.transcriber.transcribe(endpointer.voiced_audio()) {
                    self.emit(RecognitionEvent::Results {
                        session: self.session,
                        results: vec![RecognitionResult::interim_text(partial)],
                    });
                }
            }
        };
        drop(stream);

        match verdict {
            Endpoint::NoSpeech => Err("no-speech".into()),
            _ => {
                let audio = endpointer.voiced_audio();
                if self.stopped() {
                    return Ok(None);
                }
                self.transcriber
                    .transcribe(audio)
                    .map(Some)
                    .map_err(|e| e.to_string())
            }
        }
    }
}
