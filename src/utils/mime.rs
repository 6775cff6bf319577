//! MIME type helpers for downloaded media.

/// Fallback type when nothing better is known.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Pick a MIME type: the declared one if usable, else a guess from the filename.
pub fn resolve_mime_type(declared: Option<&str>, filename: &str) -> String {
    declared
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
        .filter(|m| m.contains('/') && m != DEFAULT_MIME)
        .unwrap_or_else(|| guess_from_filename(filename))
}

/// Guess a MIME type from a filename extension.
pub fn guess_from_filename(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}

/// Whether the MIME type is an image.
pub fn is_image(mime: &str) -> bool {
    mime.to_ascii_lowercase().starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_type_wins() {
        assert_eq!(resolve_mime_type(Some("image/PNG"), "photo.jpg"), "image/png");
        assert_eq!(
            resolve_mime_type(Some("text/plain; charset=utf-8"), "notes.bin"),
            "text/plain"
        );
    }

    #[test]
    fn test_falls_back_to_extension() {
        assert_eq!(resolve_mime_type(None, "photo.jpg"), "image/jpeg");
        assert_eq!(resolve_mime_type(Some(""), "doc.pdf"), "application/pdf");
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), "clip.mp4"),
            "video/mp4"
        );
        assert_eq!(resolve_mime_type(None, "README"), DEFAULT_MIME);
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/webp"));
        assert!(!is_image("application/pdf"));
    }
}
