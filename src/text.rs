//! Character-aware text helpers

/// Longest prefix of `text` holding at most `max` characters
///
/// Counts Unicode scalar values, so multi-byte text is never split inside a
/// character.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    text.char_indices()
        .nth(max)
        .map_or(text, |(idx, _)| &text[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_short_text() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(truncate_chars("привет мир", 6), "привет");
        assert_eq!(truncate_chars("🎤🎤🎤", 2), "🎤🎤");
    }

    #[test]
    fn long_text_is_cut_to_exact_length() {
        let text = "x".repeat(2000);
        let cut = truncate_chars(&text, 1024);
        assert_eq!(cut.chars().count(), 1024);
        assert_eq!(cut, &text[..1024]);
    }
}
