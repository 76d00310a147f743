//! Configuration module for JusBot Voice.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and environment overrides for the
//! service API keys via `AppConfig::apply_env`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, ChatConfig, SttConfig, TtsConfig, UiConfig, VoiceSettings};
