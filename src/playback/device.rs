//! Concrete [`AudioOutput`]s: rodio on the default device, and a stand-in
//! for systems without one.
//!
//! `rodio::OutputStream` is `!Send`, so each clip gets its own short-lived
//! thread that owns the stream and sink for the clip's lifetime:
//!
//! ```text
//! play() ──spawn──▶ [clip thread] open device, decode, append
//!    ◀──ready/err──┘      │ poll every 50 ms
//!                         ├─ stop flag set   ──▶ sink.stop(), exit silently
//!                         ├─ sink.empty()    ──▶ send Ended, exit
//!                         └─ past stall limit ─▶ sink.stop(), send Failed, exit
//! ```
//!
//! Device and decode errors happen before the clip starts and come back
//! from `play` itself.  rodio does not report a stream that dies mid-clip,
//! so the only later failure is a sink that stays busy well past the clip's
//! length.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::{Duration, Instant};

use rodio::{OutputStream, Sink, Source};
use tokio::sync::mpsc::UnboundedSender;

use crate::playback::{AudioOutput, PlaybackError, PlaybackEvent, PlaybackHandle, PlaybackNotice};
use crate::tts::AudioClip;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READY_TIMEOUT: Duration = Duration::from_secs(3);
const STALL_MARGIN: Duration = Duration::from_secs(3);
/// Stall limit for clips whose decoder cannot tell their length.
const UNKNOWN_LENGTH_LIMIT: Duration = Duration::from_secs(300);

/// How long a clip may keep the sink busy before playback counts as stalled.
fn stall_deadline(length: Option<Duration>) -> Duration {
    length.map_or(UNKNOWN_LENGTH_LIMIT, |l| l + STALL_MARGIN)
}

// ---------------------------------------------------------------------------
// RodioOutput
// ---------------------------------------------------------------------------

/// Plays clips on the system's default output device.
#[derive(Debug, Default)]
pub struct RodioOutput;

impl RodioOutput {
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when a default output device can be opened.
    pub fn probe() -> bool {
        match OutputStream::try_default() {
            Ok(_) => true,
            Err(e) => {
                log::warn!("playback: no default output device: {e}");
                false
            }
        }
    }
}

struct RodioHandle {
    stop: Arc<AtomicBool>,
}

impl PlaybackHandle for RodioHandle {
    fn release(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl AudioOutput for RodioOutput {
    /// Blocks until the device is open and the clip decodes, at most
    /// `READY_TIMEOUT`.
    fn play(
        &self,
        clip: AudioClip,
        turn: u64,
        events: UnboundedSender<PlaybackNotice>,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), PlaybackError>>(1);

        let thread_stop = stop.clone();
        std::thread::Builder::new()
            .name(format!("playback-{turn}"))
            .spawn(move || run_clip(clip, turn, thread_stop, ready_tx, events))
            .map_err(|e| PlaybackError::Rejected(format!("could not start playback thread: {e}")))?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => Ok(Box::new(RodioHandle { stop })),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                Err(PlaybackError::Rejected("audio device did not respond".into()))
            }
        }
    }
}

/// Body of the per-clip thread.
fn run_clip(
    clip: AudioClip,
    turn: u64,
    stop: Arc<AtomicBool>,
    ready: std_mpsc::SyncSender<Result<(), PlaybackError>>,
    events: UnboundedSender<PlaybackNotice>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(PlaybackError::Device(e.to_string())));
            return;
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(PlaybackError::Device(e.to_string())));
            return;
        }
    };
    let source = match rodio::Decoder::new(Cursor::new(clip.data)) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(PlaybackError::Decode(e.to_string())));
            return;
        }
    };

    let limit = stall_deadline(source.total_duration());
    sink.append(source.convert_samples::<f32>());
    if ready.send(Ok(())).is_err() {
        // play() gave up waiting.
        sink.stop();
        return;
    }

    log::debug!("playback: turn {turn} started");
    let notify = |event: PlaybackEvent| {
        let _ = events.send(PlaybackNotice { turn, event });
    };
    notify(PlaybackEvent::Started);

    let started = Instant::now();
    loop {
        if stop.load(Ordering::SeqCst) {
            sink.stop();
            log::debug!("playback: turn {turn} halted");
            return;
        }
        if sink.empty() {
            log::debug!("playback: turn {turn} ended");
            notify(PlaybackEvent::Ended);
            return;
        }
        if started.elapsed() > limit {
            sink.stop();
            log::warn!("playback: turn {turn} stalled after {limit:?}");
            notify(PlaybackEvent::Failed("audio output stalled".into()));
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// UnavailableOutput
// ---------------------------------------------------------------------------

/// Used when no output device exists; every `play` is rejected.
#[derive(Debug, Default)]
pub struct UnavailableOutput;

impl AudioOutput for UnavailableOutput {
    fn play(
        &self,
        _clip: AudioClip,
        _turn: u64,
        _events: UnboundedSender<PlaybackNotice>,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        Err(PlaybackError::Rejected("no audio output device available".into()))
    }
}
