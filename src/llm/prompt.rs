//! Fixed persona and model catalogue.

/// System instruction every chat session is created with.
pub const JUSBOT_SYSTEM_INSTRUCTION: &str = "\
You are JusBot, a friendly and knowledgeable AI legal assistant. \
Explain legal concepts, terminology and procedures in clear, plain language, \
and help users understand their options and what questions to ask a lawyer. \
Keep answers concise, because many of them are read aloud during a voice call: \
prefer short paragraphs and avoid tables, code blocks and long lists. \
You may use **bold** and *italic* for emphasis. \
You are not a lawyer and you do not provide legal advice. When a question depends \
on the user's specific circumstances or jurisdiction, say so, and recommend \
consulting a qualified attorney. Never claim to create an attorney-client relationship.";

/// Model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Models the user can pick from: `(identifier, display label)`.
pub const AVAILABLE_MODELS: &[(&str, &str)] = &[
    ("gemini-2.5-flash", "Gemini 2.5 Flash (Faster)"),
    ("gemini-2.5-pro", "Gemini 2.5 Pro (More Capable)"),
];

/// Returns `true` when `model` is one of [`AVAILABLE_MODELS`].
///
/// ```
/// use jusbot_voice::llm::is_known_model;
///
/// assert!(is_known_model("gemini-2.5-flash"));
/// assert!(!is_known_model("gpt-4o"));
/// ```
pub fn is_known_model(model: &str) -> bool {
    AVAILABLE_MODELS.iter().any(|(id, _)| *id == model)
}

/// Display label for `model`, falling back to the raw identifier.
pub fn model_label(model: &str) -> &str {
    AVAILABLE_MODELS
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, label)| *label)
        .unwrap_or(model)
}
