//! Splitting scraped page text into bounded-size segments.
//!
//! The extraction engine has an input-size ceiling, so long pages are cut
//! into character-counted chunks that are fed to it independently.

/// Pages at or below this many characters go to the extraction engine in
/// one piece.
pub const CHUNK_MAX_CHARS: usize = 100_000;

/// Split `text` into non-overlapping substrings of at most `max_chars`
/// characters each. Every chunk except possibly the last is exactly
/// `max_chars` long, and concatenating the chunks reconstructs the input.
///
/// Counts characters, not bytes, so multi-byte input never splits inside a
/// code point.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    assert!(max_chars > 0, "chunk size must be positive");

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
