//! UTF-8–safe message previews.
//!
//! Admin-side notifications carry a short preview of the message text.
//! `&str[..n]` panics when `n` falls inside a multi-byte character, so the
//! cut point is counted in characters, not bytes.

/// Maximum number of characters in a notification preview.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// Truncate `text` to at most [`PREVIEW_MAX_CHARS`] characters, appending an
/// ellipsis when anything was cut. Text that fits is returned unchanged.
pub fn message_preview(text: &str) -> String {
    preview(text, PREVIEW_MAX_CHARS)
}

/// Truncate `text` to at most `max_chars` characters plus an ellipsis.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_owned(),
    }
}
