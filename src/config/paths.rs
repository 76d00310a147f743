//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\jusbot-voice\
//!   macOS:   ~/Library/Application Support/jusbot-voice/
//!   Linux:   ~/.config/jusbot-voice/
//!
//! Data dir (whisper models):
//!   Windows: %LOCALAPPDATA%\jusbot-voice\
//!   macOS:   ~/Library/Application Support/jusbot-voice/
//!   Linux:   ~/.local/share/jusbot-voice/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for downloaded GGML whisper models.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "jusbot-voice";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let models_dir = data_dir.join("models");

        Self {
            config_dir,
            settings_file,
            models_dir,
        }
    }

    /// Path of the GGML file for whisper model `name`
    /// (`base.en` → `models/ggml-base.en.bin`).
    pub fn whisper_model(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{name}.bin"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
