//! Microphone input and the per-utterance signal chain.
//!
//! Whisper requires **16 kHz mono `f32`** audio:
//!
//! ```text
//! cpal callback (native rate, interleaved)
//!   → downmix_to_mono → MonoResampler (rubato FFT, → 16 kHz)
//!   → Endpointer (30 ms RMS frames) → utterance buffer
//! ```

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rubato::{FftFixedIn, Resampler};

use crate::config::SttConfig;
use crate::stt::SttError;

/// Whisper's input rate.
pub const TARGET_RATE: u32 = 16_000;

/// 30 ms at 16 kHz.
const FRAME_SIZE: usize = 480;
const FRAME_MS: u64 = 30;

/// Samples fed to the FFT resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Default input device and its native stream configuration.
pub struct Microphone {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl Microphone {
    /// Open the system default input device.
    pub fn open_default() -> Result<Self, SttError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SttError::Device("no input device found".into()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| SttError::Device(e.to_string()))?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Start streaming interleaved buffers to `tx`.  Dropping the returned
    /// stream stops the hardware.
    pub fn start(&self, tx: mpsc::Sender<Vec<f32>>) -> Result<cpal::Stream, SttError> {
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means the session is over.
                    let _ = tx.send(data.to_vec());
                },
                |err: cpal::StreamError| {
                    log::error!("capture: cpal stream error: {err}");
                },
                None,
            )
            .map_err(|e| SttError::Device(e.to_string()))?;

        stream.play().map_err(|e| SttError::Device(e.to_string()))?;
        Ok(stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Downmix + resample
// ---------------------------------------------------------------------------

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Streaming mono resampler to [`TARGET_RATE`].
///
/// Input arrives in arbitrary-sized buffers; it is queued and fed to rubato
/// in the fixed chunk size the FFT resampler expects.
pub struct MonoResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl MonoResampler {
    pub fn new(source_rate: u32) -> Result<Self, SttError> {
        let inner = if source_rate == TARGET_RATE {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    source_rate as usize,
                    TARGET_RATE as usize,
                    RESAMPLE_CHUNK,
                    2,
                    1,
                )
                .map_err(|e| SttError::Audio(e.to_string()))?,
            )
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Queue `input` and return every 16 kHz sample that is ready.
    pub fn push(&mut self, input: &[f32]) -> Result<Vec<f32>, SttError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };

        self.pending.extend_from_slice(input);
        let mut out = Vec::new();

        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let mut frames = resampler
                .process(&[chunk], None)
                .map_err(|e| SttError::Audio(e.to_string()))?;
            if let Some(mono) = frames.pop() {
                out.extend(mono);
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Endpointer
// ---------------------------------------------------------------------------

/// Limits that decide when an utterance is over.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSettings {
    /// Frame RMS above which a frame counts as speech.
    pub threshold: f32,
    pub silence_ms: u64,
    pub max_utterance_ms: u64,
    pub no_speech_ms: u64,
}

impl From<&SttConfig> for EndpointSettings {
    fn from(c: &SttConfig) -> Self {
        Self {
            threshold: c.vad_threshold,
            silence_ms: c.silence_ms,
            max_utterance_ms: c.max_utterance_secs * 1000,
            no_speech_ms: c.no_speech_timeout_secs * 1000,
        }
    }
}

/// Verdict after feeding audio to the [`Endpointer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Keep listening.
    Listening,
    /// Speech followed by enough silence, or the length cap was hit.
    Complete,
    /// Nothing was said before the no-speech timeout.
    NoSpeech,
}

/// Energy-based end-of-utterance detector over 16 kHz mono audio.
pub struct Endpointer {
    settings: EndpointSettings,
    audio: Vec<f32>,
    scanned: usize,
    heard_speech: bool,
    trailing_silence: u64,
    verdict: Endpoint,
}

impl Endpointer {
    pub fn new(settings: EndpointSettings) -> Self {
        Self {
            settings,
            audio: Vec::new(),
            scanned: 0,
            heard_speech: false,
            trailing_silence: 0,
            verdict: Endpoint::Listening,
        }
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Length of the buffered audio in milliseconds.
    pub fn buffered_ms(&self) -> u64 {
        self.audio.len() as u64 * 1000 / TARGET_RATE as u64
    }

    /// Append 16 kHz samples and classify every newly completed frame.
    pub fn push(&mut self, samples: &[f32]) -> Endpoint {
        if self.verdict != Endpoint::Listening {
            return self.verdict;
        }
        self.audio.extend_from_slice(samples);

        while self.scanned + FRAME_SIZE <= self.audio.len() {
            let frame = &self.audio[self.scanned..self.scanned + FRAME_SIZE];
            let voiced = is_voiced(frame, self.settings.threshold);
            self.scanned += FRAME_SIZE;

            if voiced {
                self.heard_speech = true;
                self.trailing_silence = 0;
            } else if self.heard_speech {
                self.trailing_silence += FRAME_MS;
            }

            let elapsed = self.scanned as u64 * 1000 / TARGET_RATE as u64;
            self.verdict = if self.heard_speech && self.trailing_silence >= self.settings.silence_ms
            {
                Endpoint::Complete
            } else if elapsed >= self.settings.max_utterance_ms {
                if self.heard_speech {
                    Endpoint::Complete
                } else {
                    Endpoint::NoSpeech
                }
            } else if !self.heard_speech && elapsed >= self.settings.no_speech_ms {
                Endpoint::NoSpeech
            } else {
                Endpoint::Listening
            };

            if self.verdict != Endpoint::Listening {
                break;
            }
        }
        self.verdict
    }

    /// Buffered audio with leading and trailing silence trimmed.
    pub fn voiced_audio(&self) -> &[f32] {
        trim_silence(&self.audio, self.settings.threshold)
    }
}

fn is_voiced(frame: &[f32], threshold: f32) -> bool {
    if frame.is_empty() {
        return false;
    }
    let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
    mean_sq.sqrt() > threshold
}

/// Trim leading and trailing silent frames.  All-silent input yields `&[]`.
fn trim_silence(audio: &[f32], threshold: f32) -> &[f32] {
    let total_frames = audio.len().div_ceil(FRAME_SIZE);
    let frame = |i: usize| &audio[i * FRAME_SIZE..((i + 1) * FRAME_SIZE).min(audio.len())];

    let Some(first) = (0..total_frames).find(|&i| is_voiced(frame(i), threshold)) else {
        return &audio[0..0];
    };
    let last = (0..total_frames)
        .rfind(|&i| is_voiced(frame(i), threshold))
        .unwrap_or(first);

    &audio[first * FRAME_SIZE..((last + 1) * FRAME_SIZE).min(audio.len())]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EndpointSettings {
        EndpointSettings {
            threshold: 0.01,
            silence_ms: 300,
            max_utterance_ms: 3_000,
            no_speech_ms: 1_500,
        }
    }

    fn ms(n: u64, level: f32) -> Vec<f32> {
        vec![level; (n * TARGET_RATE as u64 / 1000) as usize]
    }

    #[test]
    fn downmix_two_channels() {
        let out = downmix_to_mono(&[1.0, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_mono_and_zero() {
        assert_eq!(downmix_to_mono(&[0.1, 0.2], 1), vec![0.1, 0.2]);
        assert!(downmix_to_mono(&[0.1, 0.2], 0).is_empty());
    }

    #[test]
    fn resampler_passthrough_at_16k() {
        let mut r = MonoResampler::new(16_000).unwrap();
        let out = r.push(&[0.25; 100]).unwrap();
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn resampler_48k_roughly_thirds_length() {
        let mut r = MonoResampler::new(48_000).unwrap();
        let mut out = Vec::new();
        for _ in 0..48 {
            out.extend(r.push(&[0.0; 1000]).unwrap());
        }
        // 1 s of input; a partial chunk stays queued and the FFT adds latency.
        assert!(out.len() > 13_000 && out.len() < 16_500, "got {}", out.len());
    }

    #[test]
    fn speech_then_silence_completes() {
        let mut ep = Endpointer::new(settings());
        assert_eq!(ep.push(&ms(300, 0.0)), Endpoint::Listening);
        assert_eq!(ep.push(&ms(600, 0.5)), Endpoint::Listening);
        assert!(ep.heard_speech());
        assert_eq!(ep.push(&ms(330, 0.0)), Endpoint::Complete);

        let voiced = ep.voiced_audio();
        assert_eq!(voiced.len(), ms(600, 0.5).len());
    }

    #[test]
    fn short_pause_keeps_listening() {
        let mut ep = Endpointer::new(settings());
        ep.push(&ms(300, 0.5));
        assert_eq!(ep.push(&ms(150, 0.0)), Endpoint::Listening);
        assert_eq!(ep.push(&ms(300, 0.5)), Endpoint::Listening);
    }

    #[test]
    fn silence_only_times_out_as_no_speech() {
        let mut ep = Endpointer::new(settings());
        assert_eq!(ep.push(&ms(1_000, 0.0)), Endpoint::Listening);
        assert_eq!(ep.push(&ms(600, 0.0)), Endpoint::NoSpeech);
        assert!(ep.voiced_audio().is_empty());
    }

    #[test]
    fn continuous_speech_is_capped() {
        let mut ep = Endpointer::new(settings());
        assert_eq!(ep.push(&ms(3_100, 0.5)), Endpoint::Complete);
    }

    #[test]
    fn verdict_is_sticky() {
        let mut ep = Endpointer::new(settings());
        ep.push(&ms(300, 0.5));
        assert_eq!(ep.push(&ms(400, 0.0)), Endpoint::Complete);
        assert_eq!(ep.push(&ms(400, 0.5)), Endpoint::Complete);
    }

    #[test]
    fn endpoint_settings_from_config() {
        let s = EndpointSettings::from(&SttConfig::default());
        assert_eq!(s.silence_ms, 800);
        assert_eq!(s.max_utterance_ms, 30_000);
        assert_eq!(s.no_speech_ms, 8_000);
    }
}
