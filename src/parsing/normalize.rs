// src/parsing/normalize.rs

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

/// Tags that end a visual line in mail-client HTML.
static BREAK_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|tr)\s*>|<(?:p|div|li|tr|table)\b[^>]*>")
        .expect("valid break tag regex")
});

/// Blocks whose content is never message text.
static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>|<head\b[^>]*>.*?</head\s*>")
        .expect("valid hidden block regex")
});

static BR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid br regex"));

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid whitespace regex"));

/// Lines that open a signature block. Matched against the trimmed line.
static SIGNATURE_MARKERS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^--\s*$",
        r"(?i)^thanks[\s,]*$",
        r"(?i)^regards[\s,]*$",
        r"(?i)Get Outlook for iOS",
        r"(?i)Get Outlook for Android",
        r"(?i)Powered by O365",
    ])
    .expect("valid signature marker set")
});

/// Format of a message body as reported by the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    Html,
    #[default]
    Text,
}

impl BodyType {
    /// `html` (any case) is HTML; every other tag, or none, is plain text.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(t) if t.trim().eq_ignore_ascii_case("html") => BodyType::Html,
            _ => BodyType::Text,
        }
    }
}

/// CRLF and lone CR become LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Bare `<br>` tags left in plain-text bodies by some forwarders.
pub fn br_to_newline(text: &str) -> String {
    BR_TAG.replace_all(text, "\n").into_owned()
}

/// Convert mail HTML into trimmed, non-empty lines joined by `\n`.
pub fn html_to_clean_text(html: &str) -> String {
    let html = normalize_line_endings(html);
    let visible = HIDDEN_BLOCKS.replace_all(&html, "");
    let broken = BREAK_TAGS.replace_all(&visible, "\n");
    let stripped = ANY_TAG.replace_all(&broken, "");
    let decoded = decode_entities(&stripped);
    let collapsed = HORIZONTAL_WS.replace_all(&decoded, " ");

    collapsed
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// Only the handful of entities Outlook and Gmail actually emit in reply bodies.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Drop everything from the first signature marker line onwards.
///
/// This is a prefix-stop: once a marker is seen no later line is kept, even
/// if it looks like message content.
pub fn strip_signature(body: &str) -> String {
    body.trim()
        .lines()
        .take_while(|line| !is_signature_marker(line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn is_signature_marker(line: &str) -> bool {
    SIGNATURE_MARKERS.is_match(line.trim())
}

/// Full normalizer: markup (or line endings) first, then signature removal.
pub fn clean_body(raw: &str, body_type: BodyType) -> String {
    let text = match body_type {
        BodyType::Html => html_to_clean_text(raw),
        BodyType::Text => normalize_line_endings(raw),
    };
    strip_signature(&text)
}
