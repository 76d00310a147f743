//! Application entry point — JusBot Voice.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (default on first run) and layer the
//!    environment's API keys on top.
//! 3. Create the [`tokio`] runtime.
//! 4. Build the chat backend, speech synthesizer, recognizer and audio
//!    output.  Missing pieces degrade to "unsupported" instead of aborting.
//! 5. Spawn the [`CallOrchestrator`] on the runtime.
//! 6. Run [`eframe::run_native`] — blocks the main thread until the window
//!    is closed.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use eframe::egui;
use tokio::sync::mpsc;

use jusbot_voice::{
    app::JusBotApp,
    config::{AppConfig, AppPaths},
    llm::{ChatConnection, GeminiBackend, JUSBOT_SYSTEM_INSTRUCTION},
    pipeline::{new_shared_state, CallCommand, CallOrchestrator},
    playback::{AudioOutput, RodioOutput, UnavailableOutput},
    stt::{
        Recognizer, RecognizerConfig, SpeechCapture, UnsupportedRecognizer, WhisperRecognizer,
        WhisperTranscriber,
    },
    tts::ElevenLabsSynthesizer,
};

// ---------------------------------------------------------------------------
// Component builders
// ---------------------------------------------------------------------------

/// Whisper-backed capture, or [`UnsupportedRecognizer`] when the model file
/// cannot be loaded.
fn build_recognizer(config: &AppConfig) -> Box<dyn Recognizer> {
    let model_path = AppPaths::new().whisper_model(&config.stt.model);
    match WhisperTranscriber::load(&model_path, &config.stt.locale) {
        Ok(transcriber) => Box::new(WhisperRecognizer::new(transcriber, &config.stt)),
        Err(e) => {
            log::warn!(
                "Speech capture disabled, could not load {}: {e}",
                model_path.display()
            );
            Box::new(UnsupportedRecognizer)
        }
    }
}

fn build_output() -> Arc<dyn AudioOutput> {
    if RodioOutput::probe() {
        Arc::new(RodioOutput::new())
    } else {
        log::warn!("No audio output device found; spoken replies are disabled");
        Arc::new(UnavailableOutput)
    }
}

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (width, height) = config.ui.window_size;
    let viewport = egui::ViewportBuilder::default()
        .with_title("JusBot")
        .with_inner_size([width, height])
        .with_min_inner_size([420.0, 480.0]);

    eframe::NativeOptions {
        viewport,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("JusBot Voice starting up");

    // 2. Configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    config.apply_env(|key| std::env::var(key).ok());

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Components
    let chat = ChatConnection::new(
        Arc::new(GeminiBackend::from_config(&config.chat)),
        &config.chat.model,
        JUSBOT_SYSTEM_INSTRUCTION,
    );
    let tts = Arc::new(ElevenLabsSynthesizer::from_config(&config.tts));
    let capture = SpeechCapture::new(
        build_recognizer(&config),
        RecognizerConfig::from(&config.stt),
    );
    let output = build_output();

    // 5. Orchestrator
    let state = new_shared_state(config.clone());
    let (command_tx, command_rx) = mpsc::channel::<CallCommand>(32);
    let orchestrator = CallOrchestrator::new(Arc::clone(&state), chat, tts, capture, output);
    rt.spawn(orchestrator.run(command_rx));

    // 6. Window (blocks until closed)
    let app = JusBotApp::new(state, command_tx);
    eframe::run_native(
        "JusBot",
        native_options(&config),
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow!("window error: {e}"))?;

    // The window dropped the command sender; let the orchestrator release
    // audio and the microphone.
    rt.shutdown_timeout(std::time::Duration::from_secs(1));
    log::info!("JusBot Voice stopped");
    Ok(())
}
