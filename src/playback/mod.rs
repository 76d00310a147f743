//! Playback of synthesized replies.
//!
//! ```text
//! AudioOutput::play(clip, turn) ──Err──▶ rejected synchronously
//!                               ──Ok(handle)
//!                                    │  events channel
//!                                    ├──▶ PlaybackNotice { turn, Started }
//!                                    ├──▶ PlaybackNotice { turn, Ended }
//!                                    └──▶ PlaybackNotice { turn, Failed(msg) }
//! ```
//!
//! The orchestrator keeps the returned handle inside [`ActivePlayback`];
//! dropping it halts the sound and frees the device.  Notices are tagged with
//! the turn that started them so late events from a superseded clip can be
//! recognised and ignored.

pub mod device;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::tts::AudioClip;

pub use device::{RodioOutput, UnavailableOutput};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle of one playing clip.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Ended,
    Failed(String),
}

/// A [`PlaybackEvent`] tagged with the turn token it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackNotice {
    pub turn: u64,
    pub event: PlaybackEvent,
}

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Synchronous refusal to start playback.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("playback rejected: {0}")]
    Rejected(String),

    #[error("audio output device error: {0}")]
    Device(String),

    #[error("could not decode audio: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Device-side handle to a playing clip.
pub trait PlaybackHandle: Send {
    /// Halt the sound and release the device resource.  Must be idempotent.
    fn release(&mut self);
}

/// An audio output device.
pub trait AudioOutput: Send + Sync {
    /// Start playing `clip`.  Lifecycle notices for this clip are sent on
    /// `events`, tagged with `turn`; they may arrive before `play` returns.
    ///
    /// May block while the device opens, so callers on an async runtime run
    /// it on the blocking pool.  Errors found before the clip starts are
    /// returned here rather than sent as [`PlaybackEvent::Failed`].
    fn play(
        &self,
        clip: AudioClip,
        turn: u64,
        events: UnboundedSender<PlaybackNotice>,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError>;
}

// ---------------------------------------------------------------------------
// ActivePlayback
// ---------------------------------------------------------------------------

/// The single live audio resource.  Releases the device on drop.
pub struct ActivePlayback {
    turn: u64,
    handle: Box<dyn PlaybackHandle>,
}

impl ActivePlayback {
    pub fn new(turn: u64, handle: Box<dyn PlaybackHandle>) -> Self {
        Self { turn, handle }
    }

    /// Turn token of the clip being played.
    pub fn turn(&self) -> u64 {
        self.turn
    }
}

impl Drop for ActivePlayback {
    fn drop(&mut self) {
        log::debug!("playback: releasing clip for turn {}", self.turn);
        self.handle.release();
    }
}
