//! `**bold**` / `*italic*` emphasis markers in assistant replies.

use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*|\*(.*?)\*").unwrap());

/// Remove emphasis markers, keeping the enclosed text.
///
/// Bold pairs are removed before italic pairs; unpaired asterisks are kept.
///
/// ```
/// use jusbot_voice::tts::strip_emphasis;
///
/// assert_eq!(strip_emphasis("A **binding** *agreement*"), "A binding agreement");
/// ```
pub fn strip_emphasis(text: &str) -> String {
    let without_bold = BOLD.replace_all(text, "$1");
    ITALIC.replace_all(&without_bold, "$1").into_owned()
}

/// A run of transcript text with its emphasis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span<'a> {
    Plain(&'a str),
    Bold(&'a str),
    Italic(&'a str),
}

/// Split one line of a reply into plain, bold and italic spans.
///
/// Empty spans are dropped.
pub fn emphasis_spans(line: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in EMPHASIS.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            spans.push(Span::Plain(&line[last..whole.start()]));
        }
        if let Some(bold) = caps.get(1) {
            if !bold.as_str().is_empty() {
                spans.push(Span::Bold(bold.as_str()));
            }
        } else if let Some(italic) = caps.get(2) {
            if !italic.as_str().is_empty() {
                spans.push(Span::Italic(italic.as_str()));
            }
        }
        last = whole.end();
    }

    if last < line.len() {
        spans.push(Span::Plain(&line[last..]));
    }
    spans
}
