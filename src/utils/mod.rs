//! Shared utility functions.
//!
//! - `html`: plain text, excerpts and read time from rendered HTML
//! - `format`: human-readable sizes and durations
//! - `mime`: MIME type resolution for media files

mod format;
mod html;
mod mime;

pub use format::{format_duration, format_size};
pub use html::{
    decode_entities, excerpt, read_time_minutes, strip_tags, word_count, EXCERPT_CHARS,
    WORDS_PER_MINUTE,
};
pub use mime::{guess_from_filename, is_image, resolve_mime_type, DEFAULT_MIME};
