//! Plain-text helpers for rendered HTML from the source API.

use std::sync::LazyLock;

use regex::Regex;

/// Reading speed used for read-time estimates.
pub const WORDS_PER_MINUTE: usize = 200;

/// Length of excerpts derived from post content.
pub const EXCERPT_CHARS: usize = 160;

static SCRIPT_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#([xX][0-9a-fA-F]+|[0-9]+);").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&hellip;", "\u{2026}"),
    ("&ndash;", "\u{2013}"),
    ("&mdash;", "\u{2014}"),
    ("&lsquo;", "\u{2018}"),
    ("&rsquo;", "\u{2019}"),
    ("&ldquo;", "\u{201C}"),
    ("&rdquo;", "\u{201D}"),
    // last, so "&amp;lt;" decodes to "&lt;" rather than "<"
    ("&amp;", "&"),
];

/// Decode numeric and common named HTML entities.
pub fn decode_entities(s: &str) -> String {
    let decoded = NUMERIC_ENTITY.replace_all(s, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    NAMED_ENTITIES
        .iter()
        .fold(decoded.into_owned(), |acc, (entity, ch)| acc.replace(entity, ch))
}

/// Reduce HTML to whitespace-normalized text.
pub fn strip_tags(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    let text = decode_entities(&without_tags);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated minutes to read `html`, at least 1.
pub fn read_time_minutes(html: &str) -> i32 {
    let words = word_count(&strip_tags(html));
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i32
}

/// First `max_chars` characters of the text content, or None when empty.
pub fn excerpt(html: &str, max_chars: usize) -> Option<String> {
    let text = strip_tags(html);
    if text.is_empty() {
        return None;
    }
    let truncated: String = text.chars().take(max_chars).collect();
    Some(truncated.trim_end().to_string())
}
