//! Call state machine and shared application state.
//!
//! [`CallStatus`] drives the voice call.  Its transitions are the pure
//! function [`CallStatus::next`]; the orchestrator never assigns a status
//! any other way.
//!
//! [`AppState`] is the single source of truth for everything the UI needs:
//! call status, conversation log, connection status, interim caption and
//! any error message.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::AppConfig;
use crate::conversation::ConversationLog;
use crate::llm::ConnectionStatus;

// ---------------------------------------------------------------------------
// CallStatus
// ---------------------------------------------------------------------------

/// States of the voice call.
///
/// ```text
/// Idle / Error ──StartListening──▶ Listening
/// Listening ──TranscriptReady──▶ Processing
///           ──CancelListening──▶ Idle
/// Processing ──PlaybackStarted──▶ Speaking
/// Speaking ──PlaybackEnded──▶ Idle
/// Idle/Listening/Processing/Speaking ──Fail──▶ Error
/// any ──HangUp──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStatus {
    /// Waiting for the user to tap the microphone.
    #[default]
    Idle,
    /// Capturing one utterance.
    Listening,
    /// Waiting for the reply and its audio.
    Processing,
    /// Playing the spoken reply.
    Speaking,
    /// The last turn failed; a new one may be started.
    Error,
}

/// Inputs to the call state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTrigger {
    StartListening,
    CancelListening,
    TranscriptReady,
    PlaybackStarted,
    PlaybackEnded,
    Fail,
    HangUp,
}

impl CallStatus {
    /// The status `trigger` leads to, or `None` if it is not allowed here.
    ///
    /// ```
    /// use jusbot_voice::pipeline::{CallStatus, CallTrigger};
    ///
    /// assert_eq!(
    ///     CallStatus::Processing.next(CallTrigger::PlaybackStarted),
    ///     Some(CallStatus::Speaking)
    /// );
    /// assert_eq!(CallStatus::Idle.next(CallTrigger::PlaybackStarted), None);
    /// ```
    pub fn next(self, trigger: CallTrigger) -> Option<CallStatus> {
        use CallStatus::*;
        use CallTrigger::*;

        match (self, trigger) {
            (_, HangUp) => Some(Idle),
            (Idle | Error, StartListening) => Some(Listening),
            (Idle | Listening | Processing | Speaking, Fail) => Some(Error),
            (Listening, TranscriptReady) => Some(Processing),
            (Listening, CancelListening) => Some(Idle),
            (Processing, PlaybackStarted) => Some(Speaking),
            (Speaking, PlaybackEnded) => Some(Idle),
            _ => None,
        }
    }

    /// Whether the microphone button may start a new capture.
    pub fn accepts_listen(self) -> bool {
        self.next(CallTrigger::StartListening).is_some()
    }

    /// Status text shown in the call view.
    pub fn label(self) -> &'static str {
        match self {
            CallStatus::Idle => "Tap the microphone to speak",
            CallStatus::Listening => "Listening...",
            CallStatus::Processing => "Thinking...",
            CallStatus::Speaking => "JusBot is speaking...",
            CallStatus::Error => "Something went wrong. Tap to try again.",
        }
    }
}

// ---------------------------------------------------------------------------
// CallCommand
// ---------------------------------------------------------------------------

/// Requests sent from the UI to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum CallCommand {
    /// Microphone tapped while idle (or after an error).
    StartListening,
    /// Microphone tapped while listening.
    StopListening,
    /// A typed chat message.
    SendText(String),
    /// Switch the chat model; starts a fresh session.
    SelectModel(String),
    /// Leave the call view.
    HangUp,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state, the single source of truth for the UI.
///
/// Held behind [`SharedState`].  The orchestrator mutates it; the egui
/// update loop reads it each frame.
pub struct AppState {
    pub call_status: CallStatus,

    /// Error message to display while `call_status == CallStatus::Error`.
    pub call_error: Option<String>,

    /// Set once capture has been found unsupported; stays set.
    pub capture_unsupported: bool,

    /// Live caption of the utterance being captured.
    pub interim_transcript: String,

    pub log: ConversationLog,

    pub connection: ConnectionStatus,

    /// Identifier of the active chat model.
    pub model: String,

    /// A text-chat reply is pending ("JusBot is thinking...").
    pub awaiting_reply: bool,

    pub config: AppConfig,
}

impl AppState {
    /// Fresh state with the greeting already in the log.
    pub fn new(config: AppConfig) -> Self {
        Self {
            call_status: CallStatus::Idle,
            call_error: None,
            capture_unsupported: false,
            interim_transcript: String::new(),
            log: ConversationLog::with_greeting(),
            connection: ConnectionStatus::Connecting,
            model: config.chat.model.clone(),
            awaiting_reply: false,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].
///
/// Lock with [`lock_state`] for a short critical section; do **not** hold
/// the lock across `.await` points.
pub type SharedState = Arc<Mutex<AppState>>;

/// Construct a new [`SharedState`].
pub fn new_shared_state(config: AppConfig) -> SharedState {
    Arc::new(Mutex::new(AppState::new(config)))
}

/// Lock `state`, recovering the guard if a previous holder panicked.
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
