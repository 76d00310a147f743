//! Call orchestrator: drives capture → completion → synthesis → playback.
//!
//! [`CallOrchestrator`] owns every piece of mutable call state and mirrors
//! what the UI needs into [`SharedState`].  It reacts to four sources:
//!
//! ```text
//! CallCommand (UI, mpsc) ───────────┐
//! RecognitionEvent (recognizer) ────┤
//! TurnProgress (spawned tasks) ─────┼──▶ select! loop ──▶ SharedState
//! PlaybackNotice (audio device) ────┘
//!
//! transcript ─▶ user Message ─▶ spawn(ChatSession::send)
//!    Reply ─▶ assistant Message ─▶ strip_emphasis ─▶ spawn(synthesize)
//!    Synthesized ─▶ spawn_blocking(AudioOutput::play)
//!    Playing ─▶ ActivePlayback
//!    Started ─▶ Speaking    Ended ─▶ Idle    Failed ─▶ Error
//! ```
//!
//! Network and device work runs off the loop, tagged with the turn token
//! that started it.  A result whose token is no longer current is
//! discarded, which drops (and so releases) any audio it carried.
//!
//! Hanging up during a voice turn abandons synthesis and playback only.  A
//! reply that is still being generated is appended to the log when it
//! arrives, so the log and the session context stay one history.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::conversation::Message;
use crate::llm::{is_known_model, ChatConnection, LlmError, SharedSession};
use crate::playback::{
    ActivePlayback, AudioOutput, PlaybackError, PlaybackEvent, PlaybackNotice,
};
use crate::stt::{CaptureOutcome, RecognitionEvent, SpeechCapture, SttError};
use crate::tts::{strip_emphasis, AudioClip, SpeechSynthesizer, TtsError};

use super::state::{lock_state, CallCommand, CallStatus, CallTrigger, SharedState};

// ---------------------------------------------------------------------------
// User-facing messages
// ---------------------------------------------------------------------------

const TEXT_APOLOGY: &str = "Sorry, I encountered an error. Please try again.";
const PLAYBACK_FAILED: &str = "An error occurred while trying to play the audio.";
const PLAY_REJECTED: &str = "Could not play the audio response.";
const NO_SESSION: &str = "Chat session not initialized.";

fn voice_apology(error: &str) -> String {
    format!("Sorry, an error occurred: {error}")
}

// ---------------------------------------------------------------------------
// Turn bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnKind {
    Voice,
    Text,
}

/// The result a turn is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Reply(TurnKind),
    Synthesis,
    Playback,
}

/// Results reported back by spawned tasks.
enum TurnProgress {
    Reply {
        turn: u64,
        kind: TurnKind,
        result: Result<String, LlmError>,
    },
    Synthesized {
        turn: u64,
        result: Result<AudioClip, TtsError>,
    },
    Playing {
        turn: u64,
        result: Result<ActivePlayback, PlaybackError>,
    },
}

impl TurnProgress {
    fn turn(&self) -> u64 {
        match self {
            TurnProgress::Reply { turn, .. }
            | TurnProgress::Synthesized { turn, .. }
            | TurnProgress::Playing { turn, .. } => *turn,
        }
    }
}

// ---------------------------------------------------------------------------
// CallOrchestrator
// ---------------------------------------------------------------------------

/// Owner of the call state machine and the single live audio resource.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use jusbot_voice::config::AppConfig;
/// use jusbot_voice::llm::{ChatConnection, GeminiBackend, JUSBOT_SYSTEM_INSTRUCTION};
/// use jusbot_voice::pipeline::{new_shared_state, CallOrchestrator};
/// use jusbot_voice::playback::UnavailableOutput;
/// use jusbot_voice::stt::{RecognizerConfig, SpeechCapture, UnsupportedRecognizer};
/// use jusbot_voice::tts::ElevenLabsSynthesizer;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let state = new_shared_state(config.clone());
/// let chat = ChatConnection::new(
///     Arc::new(GeminiBackend::from_config(&config.chat)),
///     &config.chat.model,
///     JUSBOT_SYSTEM_INSTRUCTION,
/// );
/// let capture = SpeechCapture::new(Box::new(UnsupportedRecognizer), RecognizerConfig::default());
///
/// let (command_tx, command_rx) = tokio::sync::mpsc::channel(16);
/// let orchestrator = CallOrchestrator::new(
///     state,
///     chat,
///     Arc::new(ElevenLabsSynthesizer::from_config(&config.tts)),
///     capture,
///     Arc::new(UnavailableOutput),
/// );
/// tokio::spawn(orchestrator.run(command_rx));
/// # drop(command_tx);
/// # }
/// ```
pub struct CallOrchestrator {
    state: SharedState,
    chat: ChatConnection,
    tts: Arc<dyn SpeechSynthesizer>,
    capture: SpeechCapture,
    output: Arc<dyn AudioOutput>,

    /// The only place an audio handle lives.
    active: Option<ActivePlayback>,
    /// Token of the most recent turn.
    turn: u64,
    /// Turn whose spawned task has not reported back yet.
    in_flight: Option<(u64, Stage)>,
    /// Voice turn hung up while its reply was pending.  The reply is still
    /// logged but not spoken.
    unspoken: Option<u64>,
    /// Notices for the pending clip that beat `play`'s own result.
    early_notices: Vec<PlaybackEvent>,

    recognition_tx: UnboundedSender<RecognitionEvent>,
    recognition_rx: UnboundedReceiver<RecognitionEvent>,
    progress_tx: UnboundedSender<TurnProgress>,
    progress_rx: UnboundedReceiver<TurnProgress>,
    playback_tx: UnboundedSender<PlaybackNotice>,
    playback_rx: UnboundedReceiver<PlaybackNotice>,
}

impl CallOrchestrator {
    pub fn new(
        state: SharedState,
        chat: ChatConnection,
        tts: Arc<dyn SpeechSynthesizer>,
        capture: SpeechCapture,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();

        Self {
            state,
            chat,
            tts,
            capture,
            output,
            active: None,
            turn: 0,
            in_flight: None,
            unspoken: None,
            early_notices: Vec::new(),
            recognition_tx,
            recognition_rx,
            progress_tx,
            progress_rx,
            playback_tx,
            playback_rx,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Connect the chat session, then serve until `command_rx` is closed.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<CallCommand>) {
        if self.chat.session().is_none() {
            let _ = self.chat.connect();
        }
        self.publish_connection();
        if !self.capture.is_supported() {
            log::warn!("capture: speech recognition is not available");
            lock_state(&self.state).capture_unsupported = true;
        }

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = self.recognition_rx.recv() => self.handle_recognition(event),
                Some(progress) = self.progress_rx.recv() => self.handle_progress(progress),
                Some(notice) = self.playback_rx.recv() => self.handle_playback(notice),
            }
        }

        self.capture.stop_listening();
        self.active = None;
        log::info!("pipeline: command channel closed, orchestrator shutting down");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, command: CallCommand) {
        log::debug!("pipeline: command {command:?}");
        match command {
            CallCommand::StartListening => self.start_listening(),
            CallCommand::StopListening => self.stop_listening(),
            CallCommand::SendText(text) => self.send_text(text),
            CallCommand::SelectModel(model) => self.select_model(&model),
            CallCommand::HangUp => self.hang_up(),
        }
    }

    fn start_listening(&mut self) {
        if self.busy() {
            log::info!("pipeline: listen rejected, a reply is pending");
            return;
        }
        let status = self.status();
        if !status.accepts_listen() {
            log::info!("pipeline: listen rejected in {status:?}");
            return;
        }

        {
            let mut st = lock_state(&self.state);
            st.call_error = None;
            st.interim_transcript.clear();
        }

        match self.capture.start_listening(self.recognition_tx.clone()) {
            Ok(()) => {
                self.apply(CallTrigger::StartListening);
            }
            Err(SttError::Unsupported) => {
                lock_state(&self.state).capture_unsupported = true;
                self.fail(SttError::Unsupported.to_string());
            }
            Err(e) => {
                let message = self
                    .capture
                    .error()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Speech recognition error: {e}"));
                self.fail(message);
            }
        }
    }

    fn stop_listening(&mut self) {
        if !self.capture.is_listening() {
            return;
        }
        self.capture.stop_listening();
        lock_state(&self.state).interim_transcript.clear();
        self.apply(CallTrigger::CancelListening);
    }

    fn send_text(&mut self, text: String) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.busy() || self.capture.is_listening() {
            log::info!("pipeline: text rejected, a turn is in progress");
            return;
        }

        self.turn += 1;
        let turn = self.turn;
        {
            let mut st = lock_state(&self.state);
            st.log.append(Message::user(text));
            st.awaiting_reply = true;
        }

        match self.chat.session() {
            Some(session) => self.spawn_reply(session, turn, TurnKind::Text, text.to_string()),
            None => {
                log::error!("pipeline: {NO_SESSION}");
                let mut st = lock_state(&self.state);
                st.log.append(Message::assistant(TEXT_APOLOGY));
                st.awaiting_reply = false;
            }
        }
    }

    fn select_model(&mut self, model: &str) {
        if self.busy() || self.capture.is_listening() {
            log::info!("pipeline: model change rejected, a turn is in progress");
            return;
        }
        if !is_known_model(model) {
            log::warn!("pipeline: unknown model {model:?}");
            return;
        }
        let _ = self.chat.select_model(model);
        self.publish_connection();
    }

    fn hang_up(&mut self) {
        self.capture.stop_listening();
        self.active = None;
        self.early_notices.clear();

        let mut st = lock_state(&self.state);
        match self.in_flight {
            Some((turn, Stage::Reply(TurnKind::Voice))) => {
                log::info!("pipeline: call ended, turn {turn} reply will not be spoken");
                self.unspoken = Some(turn);
                self.in_flight = None;
                st.awaiting_reply = true;
            }
            Some((turn, Stage::Synthesis | Stage::Playback)) => {
                log::info!("pipeline: call ended, abandoning audio of turn {turn}");
                self.in_flight = None;
            }
            Some((_, Stage::Reply(TurnKind::Text))) | None => {}
        }
        st.call_error = None;
        st.interim_transcript.clear();
        drop(st);

        self.apply(CallTrigger::HangUp);
    }

    // -----------------------------------------------------------------------
    // Recognition
    // -----------------------------------------------------------------------

    fn handle_recognition(&mut self, event: RecognitionEvent) {
        match self.capture.handle_event(event) {
            Some(CaptureOutcome::Transcript(text)) => self.begin_voice_turn(text),
            Some(CaptureOutcome::Failed(message)) => {
                lock_state(&self.state).interim_transcript.clear();
                self.fail(message);
            }
            Some(CaptureOutcome::Ended) => {
                lock_state(&self.state).interim_transcript.clear();
                if self.status() == CallStatus::Listening {
                    self.apply(CallTrigger::CancelListening);
                }
            }
            None => {
                lock_state(&self.state).interim_transcript = self.capture.transcript().to_string();
            }
        }
    }

    fn begin_voice_turn(&mut self, transcript: String) {
        self.active = None;
        if !self.apply(CallTrigger::TranscriptReady) {
            return;
        }

        self.turn += 1;
        let turn = self.turn;
        log::info!("pipeline: turn {turn} transcript {transcript:?}");
        {
            let mut st = lock_state(&self.state);
            st.interim_transcript.clear();
            st.log.append(Message::user(transcript.clone()));
        }

        match self.chat.session() {
            Some(session) => self.spawn_reply(session, turn, TurnKind::Voice, transcript),
            None => {
                lock_state(&self.state)
                    .log
                    .append(Message::assistant(voice_apology(NO_SESSION)));
                self.fail(NO_SESSION.to_string());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Turn progress
    // -----------------------------------------------------------------------

    fn spawn_reply(&mut self, session: SharedSession, turn: u64, kind: TurnKind, text: String) {
        self.in_flight = Some((turn, Stage::Reply(kind)));
        let tx = self.progress_tx.clone();
        tokio::spawn(async move {
            let result = session.lock().await.send(&text).await;
            let _ = tx.send(TurnProgress::Reply { turn, kind, result });
        });
    }

    fn spawn_synthesis(&mut self, turn: u64, spoken: String) {
        self.in_flight = Some((turn, Stage::Synthesis));
        let tts = Arc::clone(&self.tts);
        let tx = self.progress_tx.clone();
        tokio::spawn(async move {
            let result = tts.synthesize(&spoken).await;
            let _ = tx.send(TurnProgress::Synthesized { turn, result });
        });
    }

    fn handle_progress(&mut self, progress: TurnProgress) {
        if self.unspoken == Some(progress.turn()) {
            if let TurnProgress::Reply { result, .. } = progress {
                self.unspoken = None;
                self.log_unspoken_reply(result);
            }
            return;
        }
        if self.in_flight.map(|(t, _)| t) != Some(progress.turn()) {
            log::debug!("pipeline: discarding result of stale turn {}", progress.turn());
            return;
        }
        self.in_flight = None;

        match progress {
            TurnProgress::Reply {
                kind: TurnKind::Text,
                result,
                ..
            } => {
                let mut st = lock_state(&self.state);
                st.awaiting_reply = false;
                match result {
                    Ok(reply) => {
                        st.log.append(Message::assistant(reply));
                    }
                    Err(e) => {
                        log::error!("pipeline: chat reply failed: {e}");
                        st.log.append(Message::assistant(TEXT_APOLOGY));
                    }
                }
            }
            TurnProgress::Reply {
                turn,
                kind: TurnKind::Voice,
                result,
            } => match result {
                Ok(reply) => {
                    let spoken = strip_emphasis(&reply);
                    lock_state(&self.state).log.append(Message::assistant(reply));
                    self.spawn_synthesis(turn, spoken);
                }
                Err(e) => {
                    let error = e.to_string();
                    lock_state(&self.state)
                        .log
                        .append(Message::assistant(voice_apology(&error)));
                    self.fail(error);
                }
            },
            TurnProgress::Synthesized { turn, result } => match result {
                Ok(clip) => self.start_playback(turn, clip),
                Err(e) => self.fail(format!("Speech synthesis failed: {e}")),
            },
            TurnProgress::Playing { result, .. } => match result {
                Ok(playback) => self.begin_playback(playback),
                Err(e) => {
                    log::error!("playback: play rejected: {e}");
                    self.fail(PLAY_REJECTED.to_string());
                }
            },
        }
    }

    /// Log the reply of a turn whose call was hung up.  Nothing is spoken
    /// and the call status is left alone.
    fn log_unspoken_reply(&mut self, result: Result<String, LlmError>) {
        let mut st = lock_state(&self.state);
        st.awaiting_reply = false;
        let text = match result {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("pipeline: chat reply failed after hang-up: {e}");
                voice_apology(&e.to_string())
            }
        };
        st.log.append(Message::assistant(text));
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Open the device on the blocking pool; the loop keeps serving while
    /// the device starts.
    fn start_playback(&mut self, turn: u64, clip: AudioClip) {
        self.active = None;
        self.early_notices.clear();
        self.in_flight = Some((turn, Stage::Playback));

        let output = Arc::clone(&self.output);
        let events = self.playback_tx.clone();
        let tx = self.progress_tx.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                output
                    .play(clip, turn, events)
                    .map(|handle| ActivePlayback::new(turn, handle))
            })
            .await
            .unwrap_or_else(|e| Err(PlaybackError::Device(format!("playback task failed: {e}"))));
            let _ = tx.send(TurnProgress::Playing { turn, result });
        });
    }

    fn begin_playback(&mut self, playback: ActivePlayback) {
        log::info!("playback: turn {} queued", playback.turn());
        self.active = Some(playback);
        for event in std::mem::take(&mut self.early_notices) {
            self.on_playback_event(event);
        }
    }

    fn handle_playback(&mut self, notice: PlaybackNotice) {
        if self.active.as_ref().map(ActivePlayback::turn) == Some(notice.turn) {
            self.on_playback_event(notice.event);
        } else if self.in_flight == Some((notice.turn, Stage::Playback)) {
            self.early_notices.push(notice.event);
        } else {
            log::debug!("playback: ignoring {:?} for turn {}", notice.event, notice.turn);
        }
    }

    fn on_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started => {
                self.apply(CallTrigger::PlaybackStarted);
            }
            PlaybackEvent::Ended => {
                self.active = None;
                if self.status() == CallStatus::Processing {
                    self.apply(CallTrigger::PlaybackStarted);
                }
                self.apply(CallTrigger::PlaybackEnded);
            }
            PlaybackEvent::Failed(reason) => {
                log::error!("playback: {reason}");
                self.active = None;
                self.fail(PLAYBACK_FAILED.to_string());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn status(&self) -> CallStatus {
        lock_state(&self.state).call_status
    }

    /// A reply or its audio is still on its way.
    fn busy(&self) -> bool {
        self.in_flight.is_some() || self.unspoken.is_some()
    }

    /// Apply `trigger`; returns `false` (and changes nothing) if the current
    /// status does not allow it.
    fn apply(&self, trigger: CallTrigger) -> bool {
        let mut st = lock_state(&self.state);
        match st.call_status.next(trigger) {
            Some(next) => {
                log::debug!("pipeline: {:?} --{trigger:?}--> {next:?}", st.call_status);
                st.call_status = next;
                true
            }
            None => {
                log::debug!("pipeline: {trigger:?} ignored in {:?}", st.call_status);
                false
            }
        }
    }

    fn fail(&self, message: String) {
        log::error!("pipeline error: {message}");
        let mut st = lock_state(&self.state);
        if let Some(next) = st.call_status.next(CallTrigger::Fail) {
            st.call_status = next;
        }
        st.call_error = Some(message);
    }

    fn publish_connection(&self) {
        let mut st = lock_state(&self.state);
        st.connection = self.chat.status().clone();
        st.model = self.chat.model().to_string();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::conversation::Sender;
    use crate::llm::{ChatBackend, ChatSession, ConnectionStatus, JUSBOT_SYSTEM_INSTRUCTION};
    use crate::pipeline::state::{new_shared_state, AppState};
    use crate::playback::{PlaybackError, PlaybackHandle};
    use crate::stt::{
        RecognitionResult, Recognizer, RecognizerConfig, UnsupportedRecognizer,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Park until the test hands out a permit.
    async fn pass(gate: &Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
    }

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// What a session saw when `send` was called.
    #[derive(Debug, Clone, PartialEq)]
    struct Sent {
        model: String,
        text: String,
        context_len: usize,
    }

    #[derive(Default)]
    struct ScriptedBackend {
        replies: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
        sent: Arc<Mutex<Vec<Sent>>>,
        fail_start: bool,
        /// Holds every reply until a permit is added.
        gate: Option<Arc<Semaphore>>,
    }

    impl ScriptedBackend {
        fn script(&self, reply: Result<&str, LlmError>) {
            self.replies
                .lock()
                .unwrap()
                .push_back(reply.map(str::to_string));
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    struct ScriptedSession {
        model: String,
        context: Vec<String>,
        replies: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
        sent: Arc<Mutex<Vec<Sent>>>,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl ChatSession for ScriptedSession {
        async fn send(&mut self, text: &str) -> Result<String, LlmError> {
            self.sent.lock().unwrap().push(Sent {
                model: self.model.clone(),
                text: text.to_string(),
                context_len: self.context.len(),
            });
            pass(&self.gate).await;
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("Reply to: {text}")));
            if let Ok(r) = &reply {
                self.context.push(text.to_string());
                self.context.push(r.clone());
            }
            reply
        }

        fn model(&self) -> &str {
            &self.model
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn start_session(
            &self,
            model: &str,
            _system_instruction: &str,
        ) -> Result<Box<dyn ChatSession>, LlmError> {
            if self.fail_start {
                return Err(LlmError::NotInitialized("no API key".into()));
            }
            Ok(Box::new(ScriptedSession {
                model: model.to_string(),
                context: Vec::new(),
                replies: self.replies.clone(),
                sent: self.sent.clone(),
                gate: self.gate.clone(),
            }))
        }
    }

    #[derive(Default)]
    struct MockSynth {
        texts: Mutex<Vec<String>>,
        fail: bool,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynth {
        async fn synthesize(&self, text: &str) -> Result<AudioClip, TtsError> {
            self.texts.lock().unwrap().push(text.to_string());
            pass(&self.gate).await;
            if self.fail {
                return Err(TtsError::Api {
                    status: 401,
                    detail: "invalid api key".into(),
                });
            }
            Ok(AudioClip::new(vec![0xFF, 0xFB, 0x90], "audio/mpeg"))
        }
    }

    /// Hands the orchestrator's event sender to the test.
    #[derive(Clone, Default)]
    struct MicTap {
        current: Arc<Mutex<Option<(u64, UnboundedSender<RecognitionEvent>)>>>,
        starts: Arc<AtomicUsize>,
    }

    struct TapRecognizer(MicTap);

    impl Recognizer for TapRecognizer {
        fn is_supported(&self) -> bool {
            true
        }
        fn start(
            &mut self,
            session: u64,
            _config: &RecognizerConfig,
            events: UnboundedSender<RecognitionEvent>,
        ) -> Result<(), SttError> {
            self.0.starts.fetch_add(1, Ordering::SeqCst);
            *self.0.current.lock().unwrap() = Some((session, events));
            Ok(())
        }
        fn stop(&mut self) {}
    }

    impl MicTap {
        fn session(&self) -> (u64, UnboundedSender<RecognitionEvent>) {
            self.current.lock().unwrap().clone().expect("recognizer not started")
        }

        fn say(&self, text: &str) {
            let (session, tx) = self.session();
            tx.send(RecognitionEvent::Results {
                session,
                results: vec![RecognitionResult::final_text(text)],
            })
            .unwrap();
        }

        fn error(&self, message: &str) {
            let (session, tx) = self.session();
            tx.send(RecognitionEvent::Error {
                session,
                message: message.into(),
            })
            .unwrap();
        }

        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum OutputMode {
        /// Sends `Started` as soon as `play` is called.
        AutoStart,
        /// The test sends every notice itself.
        Manual,
        Reject,
    }

    struct MockOutput {
        mode: OutputMode,
        /// Time the device takes to open, counted as live.
        delay: Duration,
        live: Arc<AtomicUsize>,
        max_live: Arc<AtomicUsize>,
        plays: Mutex<Vec<(u64, UnboundedSender<PlaybackNotice>)>>,
    }

    struct MockHandle {
        live: Arc<AtomicUsize>,
        released: bool,
    }

    impl PlaybackHandle for MockHandle {
        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    impl MockOutput {
        fn new(mode: OutputMode, delay: Duration) -> Self {
            Self {
                mode,
                delay,
                live: Arc::new(AtomicUsize::new(0)),
                max_live: Arc::new(AtomicUsize::new(0)),
                plays: Mutex::new(Vec::new()),
            }
        }

        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        fn play_count(&self) -> usize {
            self.plays.lock().unwrap().len()
        }

        /// Turn token of the `n`-th clip played.
        fn turn_of(&self, n: usize) -> u64 {
            self.plays.lock().unwrap()[n].0
        }

        fn notify(&self, turn: u64, event: PlaybackEvent) {
            let plays = self.plays.lock().unwrap();
            let (_, tx) = plays.last().expect("nothing played");
            tx.send(PlaybackNotice { turn, event }).unwrap();
        }

        fn notify_last(&self, event: PlaybackEvent) {
            let turn = self.plays.lock().unwrap().last().expect("nothing played").0;
            self.notify(turn, event);
        }
    }

    impl AudioOutput for MockOutput {
        fn play(
            &self,
            _clip: AudioClip,
            turn: u64,
            events: UnboundedSender<PlaybackNotice>,
        ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
            if self.mode == OutputMode::Reject {
                return Err(PlaybackError::Rejected("autoplay blocked".into()));
            }
            let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.mode == OutputMode::AutoStart {
                events
                    .send(PlaybackNotice {
                        turn,
                        event: PlaybackEvent::Started,
                    })
                    .unwrap();
            }
            self.plays.lock().unwrap().push((turn, events));
            Ok(Box::new(MockHandle {
                live: self.live.clone(),
                released: false,
            }))
        }
    }

    // -----------------------------------------------------------------------
    // Harness
    // -----------------------------------------------------------------------

    struct Harness {
        state: SharedState,
        commands: mpsc::Sender<CallCommand>,
        backend: Arc<ScriptedBackend>,
        synth: Arc<MockSynth>,
        output: Arc<MockOutput>,
        mic: MicTap,
    }

    struct Setup {
        backend: ScriptedBackend,
        synth: MockSynth,
        output: OutputMode,
        play_delay: Duration,
        supported: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                backend: ScriptedBackend::default(),
                synth: MockSynth::default(),
                output: OutputMode::AutoStart,
                play_delay: Duration::ZERO,
                supported: true,
            }
        }
    }

    fn start(setup: Setup) -> Harness {
        let state = new_shared_state(AppConfig::default());
        let backend = Arc::new(setup.backend);
        let synth = Arc::new(setup.synth);
        let output = Arc::new(MockOutput::new(setup.output, setup.play_delay));
        let mic = MicTap::default();

        let recognizer: Box<dyn Recognizer> = if setup.supported {
            Box::new(TapRecognizer(mic.clone()))
        } else {
            Box::new(UnsupportedRecognizer)
        };
        let chat = ChatConnection::new(
            backend.clone(),
            crate::llm::DEFAULT_MODEL,
            JUSBOT_SYSTEM_INSTRUCTION,
        );
        let orchestrator = CallOrchestrator::new(
            Arc::clone(&state),
            chat,
            synth.clone(),
            SpeechCapture::new(recognizer, RecognizerConfig::default()),
            output.clone(),
        );

        let (commands, rx) = mpsc::channel(16);
        tokio::spawn(orchestrator.run(rx));

        Harness {
            state,
            commands,
            backend,
            synth,
            output,
            mic,
        }
    }

    impl Harness {
        async fn send(&self, command: CallCommand) {
            self.commands.send(command).await.unwrap();
        }

        async fn wait_for(&self, what: &str, cond: impl Fn(&AppState) -> bool) {
            for _ in 0..300 {
                if cond(&*lock_state(&self.state)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("timed out waiting for {what}");
        }

        async fn wait_status(&self, status: CallStatus) {
            self.wait_for(&format!("{status:?}"), |st| st.call_status == status)
                .await;
        }

        /// Let queued commands and events drain.
        async fn settle(&self) {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        fn status(&self) -> CallStatus {
            lock_state(&self.state).call_status
        }

        fn error(&self) -> Option<String> {
            lock_state(&self.state).call_error.clone()
        }

        fn log_texts(&self) -> Vec<(Sender, String)> {
            lock_state(&self.state)
                .log
                .iter()
                .map(|m| (m.sender(), m.text().to_string()))
                .collect()
        }

        async fn listen_and_say(&self, text: &str) {
            self.send(CallCommand::StartListening).await;
            self.wait_status(CallStatus::Listening).await;
            self.mic.say(text);
        }
    }

    // -----------------------------------------------------------------------
    // Voice turns
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn voice_turn_runs_to_speaking_and_back_to_idle() {
        let h = start(Setup::default());
        h.backend.script(Ok("A contract is an agreement."));

        h.listen_and_say("What is a contract?").await;
        h.wait_status(CallStatus::Speaking).await;

        assert_eq!(
            h.backend.sent()[0].text,
            "What is a contract?",
            "transcript must reach the session unchanged"
        );
        let log = h.log_texts();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1], (Sender::User, "What is a contract?".into()));
        assert_eq!(log[2], (Sender::Assistant, "A contract is an agreement.".into()));
        assert_eq!(h.output.live(), 1);

        h.output.notify_last(PlaybackEvent::Ended);
        h.wait_status(CallStatus::Idle).await;
        assert_eq!(h.output.live(), 0);
        assert!(h.error().is_none());
    }

    #[tokio::test]
    async fn emphasis_is_stripped_for_speech_only() {
        let h = start(Setup::default());
        h.backend.script(Ok("**Hello** there, *friend*"));

        h.listen_and_say("hi").await;
        h.wait_status(CallStatus::Speaking).await;

        assert_eq!(*h.synth.texts.lock().unwrap(), vec!["Hello there, friend".to_string()]);
        assert_eq!(h.log_texts()[2].1, "**Hello** there, *friend*");
    }

    #[tokio::test]
    async fn completion_failure_appends_apology_and_errors() {
        let h = start(Setup::default());
        h.backend.script(Err(LlmError::Api {
            status: 500,
            message: "backend down".into(),
        }));

        h.listen_and_say("What is a tort?").await;
        h.wait_status(CallStatus::Error).await;

        let log = h.log_texts();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1], (Sender::User, "What is a tort?".into()));
        assert_eq!(
            log[2].1,
            "Sorry, an error occurred: chat service returned 500: backend down"
        );
        assert!(h.synth.texts.lock().unwrap().is_empty());
        assert_eq!(h.output.play_count(), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_keeps_reply_and_errors() {
        let h = start(Setup {
            synth: MockSynth {
                fail: true,
                ..Default::default()
            },
            ..Default::default()
        });
        h.backend.script(Ok("Here is the answer."));

        h.listen_and_say("question").await;
        h.wait_status(CallStatus::Error).await;

        let log = h.log_texts();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2], (Sender::Assistant, "Here is the answer.".into()));
        assert!(h.error().unwrap().contains("invalid api key"));
        assert_eq!(h.output.play_count(), 0);
    }

    #[tokio::test]
    async fn rejected_play_releases_and_errors() {
        let h = start(Setup {
            output: OutputMode::Reject,
            ..Default::default()
        });

        h.listen_and_say("question").await;
        h.wait_status(CallStatus::Error).await;

        assert_eq!(h.error().as_deref(), Some("Could not play the audio response."));
        assert_eq!(h.output.live(), 0);
    }

    #[tokio::test]
    async fn playback_failure_releases_and_errors() {
        let h = start(Setup::default());

        h.listen_and_say("question").await;
        h.wait_status(CallStatus::Speaking).await;
        h.output
            .notify_last(PlaybackEvent::Failed("device unplugged".into()));
        h.wait_status(CallStatus::Error).await;

        assert_eq!(
            h.error().as_deref(),
            Some("An error occurred while trying to play the audio.")
        );
        assert_eq!(h.output.live(), 0);
    }

    #[tokio::test]
    async fn listening_is_rejected_while_processing() {
        let h = start(Setup {
            output: OutputMode::Manual,
            ..Default::default()
        });

        h.listen_and_say("question").await;
        h.wait_for("clip queued", |_| h.output.play_count() == 1).await;
        assert_eq!(h.status(), CallStatus::Processing);

        h.send(CallCommand::StartListening).await;
        h.settle().await;
        assert_eq!(h.status(), CallStatus::Processing);
        assert_eq!(h.mic.starts(), 1);
    }

    #[tokio::test]
    async fn listening_is_rejected_while_speaking() {
        let h = start(Setup::default());

        h.listen_and_say("question").await;
        h.wait_status(CallStatus::Speaking).await;

        h.send(CallCommand::StartListening).await;
        h.settle().await;
        assert_eq!(h.status(), CallStatus::Speaking);
        assert_eq!(h.mic.starts(), 1);
    }

    #[tokio::test]
    async fn stale_playback_events_are_ignored_and_one_clip_lives() {
        let h = start(Setup::default());

        h.listen_and_say("first").await;
        h.wait_status(CallStatus::Speaking).await;
        let first_turn = h.output.turn_of(0);

        h.send(CallCommand::HangUp).await;
        h.wait_status(CallStatus::Idle).await;
        assert_eq!(h.output.live(), 0);

        // Late end of the abandoned clip.
        h.output.notify(first_turn, PlaybackEvent::Ended);
        h.settle().await;
        assert_eq!(h.status(), CallStatus::Idle);

        h.listen_and_say("second").await;
        h.wait_status(CallStatus::Speaking).await;
        assert_ne!(h.output.turn_of(1), first_turn);

        h.output.notify(first_turn, PlaybackEvent::Ended);
        h.settle().await;
        assert_eq!(h.status(), CallStatus::Speaking);
        assert_eq!(h.output.live(), 1);
        assert_eq!(h.output.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reply_arriving_after_hang_up_is_logged_but_not_spoken() {
        let gate = Arc::new(Semaphore::new(0));
        let h = start(Setup {
            backend: ScriptedBackend {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            ..Default::default()
        });
        h.backend.script(Ok("A tort is a civil wrong."));

        h.listen_and_say("What is a tort?").await;
        h.wait_for("request sent", |_| h.backend.sent().len() == 1).await;
        h.send(CallCommand::HangUp).await;
        h.wait_status(CallStatus::Idle).await;
        assert!(lock_state(&h.state).awaiting_reply);

        // No new turn while the old reply is outstanding.
        h.send(CallCommand::StartListening).await;
        h.settle().await;
        assert_eq!(h.mic.starts(), 1);
        assert_eq!(h.status(), CallStatus::Idle);

        gate.add_permits(1);
        h.wait_for("reply logged", |st| st.log.len() == 3 && !st.awaiting_reply)
            .await;
        let log = h.log_texts();
        assert_eq!(log[1], (Sender::User, "What is a tort?".into()));
        assert_eq!(log[2], (Sender::Assistant, "A tort is a civil wrong.".into()));
        h.settle().await;
        assert!(h.synth.texts.lock().unwrap().is_empty());
        assert_eq!(h.output.play_count(), 0);
        assert_eq!(h.status(), CallStatus::Idle);
        assert!(h.error().is_none());

        // Log and session context still describe the same conversation.
        gate.add_permits(1);
        h.send(CallCommand::SendText("And a crime?".into())).await;
        h.wait_for("second reply", |st| st.log.len() == 5 && !st.awaiting_reply)
            .await;
        assert_eq!(h.backend.sent()[1].context_len, 2);
    }

    #[tokio::test]
    async fn failed_reply_after_hang_up_logs_apology_without_error() {
        let gate = Arc::new(Semaphore::new(0));
        let h = start(Setup {
            backend: ScriptedBackend {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            ..Default::default()
        });
        h.backend.script(Err(LlmError::Timeout));

        h.listen_and_say("question").await;
        h.wait_for("request sent", |_| h.backend.sent().len() == 1).await;
        h.send(CallCommand::HangUp).await;
        h.wait_status(CallStatus::Idle).await;

        gate.add_permits(1);
        h.wait_for("apology logged", |st| st.log.len() == 3 && !st.awaiting_reply)
            .await;
        assert!(h.log_texts()[2].1.starts_with("Sorry, an error occurred:"));
        assert_eq!(h.status(), CallStatus::Idle);
        assert!(h.error().is_none());
    }

    #[tokio::test]
    async fn synthesis_finishing_after_hang_up_is_not_played() {
        let gate = Arc::new(Semaphore::new(0));
        let h = start(Setup {
            synth: MockSynth {
                gate: Some(gate.clone()),
                ..Default::default()
            },
            ..Default::default()
        });
        let synthesized = || h.synth.texts.lock().unwrap().len();

        h.listen_and_say("first").await;
        h.wait_for("first synthesis", |_| synthesized() == 1).await;
        h.send(CallCommand::HangUp).await;
        h.wait_status(CallStatus::Idle).await;

        h.listen_and_say("second").await;
        h.wait_for("second synthesis", |_| synthesized() == 2).await;

        // Permits go to the oldest waiter: the abandoned clip.
        gate.add_permits(1);
        h.settle().await;
        assert_eq!(h.output.play_count(), 0);
        assert_eq!(h.status(), CallStatus::Processing);

        gate.add_permits(1);
        h.wait_status(CallStatus::Speaking).await;
        assert_eq!(h.output.play_count(), 1);
        assert_eq!(h.log_texts().len(), 5);
        assert_eq!(h.output.live(), 1);
        assert_eq!(h.output.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_device_does_not_hold_up_hang_up() {
        let h = start(Setup {
            play_delay: Duration::from_millis(400),
            ..Default::default()
        });

        h.listen_and_say("question").await;
        h.wait_for("device opening", |_| h.output.live() == 1).await;

        h.send(CallCommand::HangUp).await;
        tokio::time::timeout(Duration::from_millis(150), h.wait_status(CallStatus::Idle))
            .await
            .expect("hang-up waited for the device");

        // The clip that opened after the hang-up is released on arrival.
        h.wait_for("late clip released", |_| {
            h.output.play_count() == 1 && h.output.live() == 0
        })
        .await;
        h.settle().await;
        assert_eq!(h.status(), CallStatus::Idle);
        assert_eq!(h.output.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn log_grows_by_two_per_turn() {
        let h = start(Setup::default());
        for (i, question) in ["one", "two"].into_iter().enumerate() {
            h.listen_and_say(question).await;
            h.wait_status(CallStatus::Speaking).await;
            h.output.notify_last(PlaybackEvent::Ended);
            h.wait_status(CallStatus::Idle).await;
            assert_eq!(h.log_texts().len(), 1 + 2 * (i + 1));
        }
        // Second turn was sent with the first exchange as context.
        assert_eq!(h.backend.sent()[1].context_len, 2);
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unsupported_capture_is_flagged_before_first_use() {
        let h = start(Setup {
            supported: false,
            ..Default::default()
        });

        h.wait_for("unsupported warning", |st| st.capture_unsupported)
            .await;
        assert_eq!(h.status(), CallStatus::Idle);
        assert!(h.error().is_none());
    }

    #[tokio::test]
    async fn unsupported_capture_sets_warning_and_error() {
        let h = start(Setup {
            supported: false,
            ..Default::default()
        });

        h.send(CallCommand::StartListening).await;
        h.wait_status(CallStatus::Error).await;

        let st = lock_state(&h.state);
        assert!(st.capture_unsupported);
        assert_eq!(
            st.call_error.as_deref(),
            Some("Speech recognition is not supported on this system.")
        );
    }

    #[tokio::test]
    async fn stop_listening_cancels_without_turn() {
        let h = start(Setup::default());

        h.send(CallCommand::StartListening).await;
        h.wait_status(CallStatus::Listening).await;
        h.send(CallCommand::StopListening).await;
        h.wait_status(CallStatus::Idle).await;

        // Result from the cancelled session arrives late.
        h.mic.say("too late");
        h.settle().await;
        assert_eq!(h.status(), CallStatus::Idle);
        assert_eq!(h.log_texts().len(), 1);
        assert!(h.backend.sent().is_empty());
    }

    #[tokio::test]
    async fn capture_error_is_shown() {
        let h = start(Setup::default());

        h.send(CallCommand::StartListening).await;
        h.wait_status(CallStatus::Listening).await;
        h.mic.error("network");
        h.wait_status(CallStatus::Error).await;

        assert_eq!(h.error().as_deref(), Some("Speech recognition error: network"));
    }

    #[tokio::test]
    async fn interim_transcript_is_published() {
        let h = start(Setup::default());

        h.send(CallCommand::StartListening).await;
        h.wait_status(CallStatus::Listening).await;
        let (session, tx) = h.mic.session();
        tx.send(RecognitionEvent::Results {
            session,
            results: vec![RecognitionResult::interim_text("What is")],
        })
        .unwrap();

        h.wait_for("interim caption", |st| st.interim_transcript == "What is")
            .await;
        assert_eq!(h.status(), CallStatus::Listening);
    }

    #[tokio::test]
    async fn retry_from_error_clears_previous_error() {
        let h = start(Setup::default());
        h.backend.script(Err(LlmError::Timeout));

        h.listen_and_say("first").await;
        h.wait_status(CallStatus::Error).await;
        assert!(h.error().is_some());

        h.send(CallCommand::StartListening).await;
        h.wait_status(CallStatus::Listening).await;
        assert!(h.error().is_none());
    }

    // -----------------------------------------------------------------------
    // Text chat and session
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn text_message_gets_reply_without_touching_call_status() {
        let h = start(Setup::default());
        h.backend.script(Ok("Hello!"));

        h.send(CallCommand::SendText("  Hi JusBot  ".into())).await;
        h.wait_for("reply", |st| st.log.len() == 3 && !st.awaiting_reply)
            .await;

        let log = h.log_texts();
        assert_eq!(log[1], (Sender::User, "Hi JusBot".into()));
        assert_eq!(log[2], (Sender::Assistant, "Hello!".into()));
        assert_eq!(h.status(), CallStatus::Idle);
        assert!(h.synth.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_failure_appends_apology() {
        let h = start(Setup::default());
        h.backend.script(Err(LlmError::Timeout));

        h.send(CallCommand::SendText("Hi".into())).await;
        h.wait_for("apology", |st| st.log.len() == 3 && !st.awaiting_reply)
            .await;

        assert_eq!(
            h.log_texts()[2].1,
            "Sorry, I encountered an error. Please try again."
        );
        assert_eq!(h.status(), CallStatus::Idle);
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let h = start(Setup::default());
        h.send(CallCommand::SendText("   ".into())).await;
        h.settle().await;
        assert_eq!(h.log_texts().len(), 1);
        assert!(h.backend.sent().is_empty());
    }

    #[tokio::test]
    async fn model_switch_starts_fresh_context() {
        let h = start(Setup::default());
        h.wait_for("connected", |st| st.connection == ConnectionStatus::Connected)
            .await;

        h.send(CallCommand::SendText("first".into())).await;
        h.wait_for("first reply", |st| st.log.len() == 3).await;

        h.send(CallCommand::SelectModel("gemini-2.5-pro".into())).await;
        h.wait_for("model switched", |st| st.model == "gemini-2.5-pro")
            .await;

        h.send(CallCommand::SendText("second".into())).await;
        h.wait_for("second reply", |st| st.log.len() == 5).await;

        let sent = h.backend.sent();
        assert_eq!(sent[0].model, "gemini-2.5-flash");
        assert_eq!(sent[1].model, "gemini-2.5-pro");
        assert_eq!(sent[1].context_len, 0);
    }

    #[tokio::test]
    async fn unknown_model_is_rejected() {
        let h = start(Setup::default());
        h.send(CallCommand::SelectModel("gpt-4o".into())).await;
        h.settle().await;
        assert_eq!(lock_state(&h.state).model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn missing_session_reports_failure() {
        let h = start(Setup {
            backend: ScriptedBackend {
                fail_start: true,
                ..Default::default()
            },
            ..Default::default()
        });
        h.wait_for("failed connection", |st| {
            matches!(st.connection, ConnectionStatus::Failed(_))
        })
        .await;

        h.send(CallCommand::SendText("Hi".into())).await;
        h.wait_for("text apology", |st| st.log.len() == 3).await;
        assert_eq!(
            h.log_texts()[2].1,
            "Sorry, I encountered an error. Please try again."
        );

        h.listen_and_say("question").await;
        h.wait_status(CallStatus::Error).await;
        let log = h.log_texts();
        assert_eq!(log.len(), 5);
        assert_eq!(log[3], (Sender::User, "question".into()));
        assert_eq!(
            log[4].1,
            "Sorry, an error occurred: Chat session not initialized."
        );
    }
}
