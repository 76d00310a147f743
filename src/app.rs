//! JusBot desktop window — egui/eframe application.
//!
//! # Architecture
//!
//! [`JusBotApp`] is the top-level [`eframe::App`].  It holds no conversation
//! or call state of its own: each frame it copies what it needs out of
//! [`SharedState`] and turns clicks into [`CallCommand`]s for the
//! orchestrator.
//!
//! # Views
//!
//! | View | Content |
//! |------|---------|
//! | `Chat` | Conversation log with emphasis, text input, model picker, call button |
//! | `Call` | Conversation log, call status, microphone button, live caption, End Call |
//!
//! Leaving the call view sends [`CallCommand::HangUp`], which releases the
//! microphone and any playing audio.

use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::conversation::{Message, Sender};
use crate::llm::{model_label, ConnectionStatus, AVAILABLE_MODELS};
use crate::pipeline::{lock_state, CallCommand, CallStatus, SharedState};
use crate::tts::{emphasis_spans, Span};

const USER_COLOR: egui::Color32 = egui::Color32::from_rgb(120, 170, 255);
const BOT_COLOR: egui::Color32 = egui::Color32::from_rgb(80, 200, 120);
const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(255, 136, 68);
const DIM_COLOR: egui::Color32 = egui::Color32::from_rgb(140, 140, 140);

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Chat,
    Call,
}

/// What one frame renders, copied out of [`SharedState`] so the lock is
/// held only briefly.
struct Snapshot {
    messages: Vec<Message>,
    call_status: CallStatus,
    call_error: Option<String>,
    capture_unsupported: bool,
    interim: String,
    connection: ConnectionStatus,
    model: String,
    awaiting_reply: bool,
}

impl Snapshot {
    fn take(state: &SharedState) -> Self {
        let st = lock_state(state);
        Self {
            messages: st.log.messages().to_vec(),
            call_status: st.call_status,
            call_error: st.call_error.clone(),
            capture_unsupported: st.capture_unsupported,
            interim: st.interim_transcript.clone(),
            connection: st.connection.clone(),
            model: st.model.clone(),
            awaiting_reply: st.awaiting_reply,
        }
    }

    /// Typing and model changes are only offered while no reply is pending.
    fn input_enabled(&self) -> bool {
        !self.awaiting_reply
    }
}

/// Command the microphone button sends in `status`, or `None` when the
/// button is disabled.
fn mic_command(status: CallStatus) -> Option<CallCommand> {
    match status {
        CallStatus::Listening => Some(CallCommand::StopListening),
        s if s.accepts_listen() => Some(CallCommand::StartListening),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// JusBotApp
// ---------------------------------------------------------------------------

/// eframe application — the JusBot chat and call window.
pub struct JusBotApp {
    state: SharedState,
    command_tx: mpsc::Sender<CallCommand>,
    view: View,
    /// Text being typed in the chat view.
    draft: String,
}

impl JusBotApp {
    /// Create a new [`JusBotApp`].
    ///
    /// * `state`      — shared state written by the orchestrator.
    /// * `command_tx` — sender end of the orchestrator's command channel.
    pub fn new(state: SharedState, command_tx: mpsc::Sender<CallCommand>) -> Self {
        Self {
            state,
            command_tx,
            view: View::Chat,
            draft: String::new(),
        }
    }

    fn send(&self, command: CallCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            log::warn!("ui: could not send command: {e}");
        }
    }

    // ── Shared pieces ────────────────────────────────────────────────────

    fn draw_log(&self, ui: &mut egui::Ui, snap: &Snapshot) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .max_height(ui.available_height() - 90.0)
            .show(ui, |ui| {
                for message in &snap.messages {
                    draw_message(ui, message);
                    ui.add_space(6.0);
                }
                if snap.awaiting_reply {
                    ui.label(
                        egui::RichText::new("JusBot is thinking...")
                            .color(DIM_COLOR)
                            .italics(),
                    );
                }
            });
    }

    // ── Chat view ────────────────────────────────────────────────────────

    fn draw_chat(&mut self, ui: &mut egui::Ui, snap: &Snapshot) {
        ui.horizontal(|ui| {
            ui.heading("JusBot");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Start Call").clicked() {
                    self.view = View::Call;
                }
                ui.add_enabled_ui(snap.input_enabled(), |ui| {
                    self.draw_model_picker(ui, &snap.model);
                });
            });
        });
        ui.label(egui::RichText::new(snap.connection.label()).color(
            match snap.connection {
                ConnectionStatus::Failed(_) => ERROR_COLOR,
                _ => DIM_COLOR,
            },
        ));
        ui.separator();

        self.draw_log(ui, snap);
        ui.separator();

        ui.horizontal(|ui| {
            let enabled = snap.input_enabled();
            let input = ui.add_enabled(
                enabled,
                egui::TextEdit::singleline(&mut self.draft)
                    .hint_text("Ask a legal question...")
                    .desired_width(ui.available_width() - 70.0),
            );
            let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let clicked = ui
                .add_enabled(enabled && !self.draft.trim().is_empty(), egui::Button::new("Send"))
                .clicked();

            if enabled && (submitted || clicked) && !self.draft.trim().is_empty() {
                let text = std::mem::take(&mut self.draft);
                self.send(CallCommand::SendText(text));
                input.request_focus();
            }
        });
    }

    fn draw_model_picker(&self, ui: &mut egui::Ui, current: &str) {
        let mut selected = current.to_string();
        egui::ComboBox::from_id_salt("model")
            .selected_text(model_label(current))
            .show_ui(ui, |ui| {
                for (id, label) in AVAILABLE_MODELS {
                    ui.selectable_value(&mut selected, id.to_string(), *label);
                }
            });
        if selected != current {
            self.send(CallCommand::SelectModel(selected));
        }
    }

    // ── Call view ────────────────────────────────────────────────────────

    fn draw_call(&mut self, ui: &mut egui::Ui, snap: &Snapshot) {
        ui.horizontal(|ui| {
            ui.heading("Voice Call");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let end = egui::Button::new(egui::RichText::new("End Call").color(egui::Color32::WHITE))
                    .fill(egui::Color32::from_rgb(200, 60, 60));
                if ui.add(end).clicked() {
                    self.send(CallCommand::HangUp);
                    self.view = View::Chat;
                }
            });
        });
        ui.separator();

        self.draw_log(ui, snap);
        ui.separator();

        ui.vertical_centered(|ui| {
            if !snap.interim.is_empty() {
                ui.label(egui::RichText::new(&snap.interim).color(DIM_COLOR).italics());
            }

            let command = mic_command(snap.call_status);
            let (icon, fill) = match snap.call_status {
                CallStatus::Listening => ("Stop", egui::Color32::from_rgb(255, 68, 68)),
                CallStatus::Speaking => ("Speaking", BOT_COLOR),
                _ => ("Mic", egui::Color32::from_rgb(68, 136, 255)),
            };
            let mic = egui::Button::new(egui::RichText::new(icon).size(18.0).color(egui::Color32::WHITE))
                .fill(fill)
                .min_size(egui::vec2(96.0, 40.0));
            if ui.add_enabled(command.is_some(), mic).clicked() {
                if let Some(command) = command {
                    self.send(command);
                }
            }

            ui.label(snap.call_status.label());
            if let Some(error) = &snap.call_error {
                ui.label(egui::RichText::new(error).color(ERROR_COLOR));
            }
            if snap.capture_unsupported {
                ui.label(
                    egui::RichText::new(
                        "Voice input is unavailable on this system. Use the text chat instead.",
                    )
                    .color(ERROR_COLOR)
                    .small(),
                );
            }
        });
    }
}

/// One log entry: sender name, then the text with emphasis applied.
fn draw_message(ui: &mut egui::Ui, message: &Message) {
    let color = match message.sender() {
        Sender::User => USER_COLOR,
        Sender::Assistant => BOT_COLOR,
    };
    ui.label(
        egui::RichText::new(message.sender().display_name())
            .color(color)
            .strong(),
    );
    for line in message.text().lines() {
        ui.label(layout_line(line, ui.visuals().text_color(), ui.visuals().strong_text_color()));
    }
}

/// Lay out `line` with `**bold**` shown in `strong` and `*italic*` slanted.
fn layout_line(line: &str, normal: egui::Color32, strong: egui::Color32) -> egui::text::LayoutJob {
    let mut job = egui::text::LayoutJob::default();
    for span in emphasis_spans(line) {
        let (text, format) = match span {
            Span::Plain(t) => (t, egui::TextFormat {
                color: normal,
                ..Default::default()
            }),
            Span::Bold(t) => (t, egui::TextFormat {
                color: strong,
                ..Default::default()
            }),
            Span::Italic(t) => (t, egui::TextFormat {
                color: normal,
                italics: true,
                ..Default::default()
            }),
        };
        job.append(text, 0.0, format);
    }
    job
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for JusBotApp {
    /// Called every frame by eframe.  Copies the shared state, then renders
    /// the active view.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let snap = Snapshot::take(&self.state);

        // Orchestrator updates arrive without input events.
        ctx.request_repaint_after(Duration::from_millis(100));

        egui::CentralPanel::default().show(ctx, |ui| match self.view {
            View::Chat => self.draw_chat(ui, &snap),
            View::Call => self.draw_call(ui, &snap),
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if self.view == View::Call {
            self.send(CallCommand::HangUp);
        }
        log::info!("JusBot window closing");
    }
}
