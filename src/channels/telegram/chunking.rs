//! Text chunking for Telegram's message size limit
//!
//! Telegram caps a message at 4096 characters. Long text is split on
//! paragraph boundaries first, then on newlines, then at the limit.

/// Telegram's hard cap on message text
pub const MESSAGE_LIMIT: usize = 4096;

/// Split `text` into chunks that each fit within `limit` bytes.
///
/// Byte length never undercounts characters, so a chunk within `limit` bytes
/// is also within `limit` characters. A `limit` of 0 means
/// [`MESSAGE_LIMIT`]. Every returned chunk is non-empty.
#[must_use]
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = if limit == 0 { MESSAGE_LIMIT } else { limit };

    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let needed = if current.is_empty() {
            paragraph.len()
        } else {
            current.len() + 2 + paragraph.len()
        };

        if needed <= limit {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.len() <= limit {
            current.push_str(paragraph);
        } else {
            chunks.extend(chunk_hard(paragraph, limit));
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split at `limit`-sized boundaries, preferring the last newline or space
fn chunk_hard(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= limit {
            chunks.push(remaining.to_string());
            break;
        }

        let split_at = find_split_point(remaining, limit);
        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Best byte offset to split at within `limit`
fn find_split_point(text: &str, limit: usize) -> usize {
    let mut boundary = limit;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }

    let window = &text[..boundary];
    if let Some(pos) = window.rfind('\n').filter(|p| *p > 0) {
        return pos + 1;
    }
    if let Some(pos) = window.rfind(' ').filter(|p| *p > 0) {
        return pos + 1;
    }

    // A single character wider than the limit still has to make progress
    if boundary == 0 {
        return text.chars().next().map_or(text.len(), char::len_utf8);
    }
    boundary
}
