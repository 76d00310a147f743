//! Application settings structs, defaults, TOML persistence and environment
//! overrides.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! API keys are the exception to the round trip: they are read from the
//! environment and never written back to `settings.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::llm::DEFAULT_MODEL;

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Settings for the chat-completion service (Gemini).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the Generative Language API, without trailing slash.
    pub base_url: String,
    /// Model identifier; must be one of [`crate::llm::AVAILABLE_MODELS`].
    pub model: String,
    /// Maximum seconds to wait for a reply before timing out.
    pub timeout_secs: u64,
    /// API key. `None` leaves the chat disconnected.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: DEFAULT_MODEL.into(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Voice tuning sent with every synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    /// 0 (no latency optimisation) to 4 (maximum).
    pub optimize_streaming_latency: u8,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.0,
            use_speaker_boost: true,
            optimize_streaming_latency: 0,
        }
    }
}

/// Settings for the text-to-speech service (ElevenLabs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Base URL of the ElevenLabs API, without trailing slash.
    pub base_url: String,
    /// Voice to synthesize with.
    pub voice_id: String,
    /// Synthesis model identifier.
    pub model_id: String,
    /// Value of the `Accept` header; decides the returned audio encoding.
    pub accept: String,
    pub voice: VoiceSettings,
    /// Maximum seconds to wait for the audio before timing out.
    pub timeout_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".into(),
            model_id: "eleven_v3".into(),
            accept: "audio/mpeg".into(),
            voice: VoiceSettings::default(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for speech capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML whisper model name / file stem (e.g. `"base.en"`).
    pub model: String,
    /// Recognition locale (BCP-47, e.g. `"en-US"`).
    pub locale: String,
    /// Report in-progress transcripts while the user is still speaking.
    pub interim_results: bool,
    /// Keep listening after the first utterance.  The call loop expects
    /// single-utterance capture, so this stays `false`.
    pub continuous: bool,
    /// RMS level above which a 30 ms frame counts as speech.
    pub vad_threshold: f32,
    /// Trailing silence that ends an utterance, in milliseconds.
    pub silence_ms: u64,
    /// Hard cap on a single utterance.
    pub max_utterance_secs: u64,
    /// Give up with a `no-speech` error when nothing is said for this long.
    pub no_speech_timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            locale: "en-US".into(),
            interim_results: true,
            continuous: false,
            vad_threshold: 0.01,
            silence_ms: 800,
            max_utterance_secs: 30,
            no_speech_timeout_secs: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// egui window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Initial inner window size `(width, height)` in points.
    pub window_size: (f32, f32),
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_size: (720.0, 860.0),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use jusbot_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing), then layer the
/// // environment's API keys on top.
/// let mut config = AppConfig::load().unwrap();
/// config.apply_env(|key| std::env::var(key).ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat-completion settings.
    pub chat: ChatConfig,
    /// Speech synthesis settings.
    pub tts: TtsConfig,
    /// Speech capture settings.
    pub stt: SttConfig,
    /// Window settings.
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay environment-level settings.
    ///
    /// `lookup` is normally `|k| std::env::var(k).ok()`; tests pass a map.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `GEMINI_API_KEY`, else `API_KEY` | `chat.api_key` |
    /// | `JUSBOT_MODEL` | `chat.model` |
    /// | `ELEVENLABS_API_KEY` | `tts.api_key` |
    /// | `ELEVENLABS_VOICE_ID` | `tts.voice_id` |
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY").or_else(|| get("API_KEY")) {
            self.chat.api_key = Some(key);
        }
        if let Some(model) = get("JUSBOT_MODEL") {
            self.chat.model = model;
        }
        if let Some(key) = get("ELEVENLABS_API_KEY") {
            self.tts.api_key = Some(key);
        }
        if let Some(voice) = get("ELEVENLABS_VOICE_ID") {
            self.tts.voice_id = voice;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
