//! Paragraph-boundary text splitting.
//!
//! Two splitters feed the index:
//!
//! - [`split_into_chunks`] groups a document's `\n\n` paragraphs into base
//!   chunks of at least `min_chars` characters.
//! - [`split_into_sub_chunks`] groups a denoised rendering of one chunk
//!   into token-bounded sub-chunks, falling back to `#` bullet points when
//!   the text has no paragraph breaks.
//!
//! Both close a piece only once it has *reached* the minimum, so every
//! piece but the last is at least that large.
//!
//! # Example
//!
//! ```rust
//! use tiered_index_core::chunk::split_into_chunks;
//!
//! let chunks = split_into_chunks("Hello world.\n\nSecond paragraph.", 1000);
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

/// Default minimum characters per base chunk.
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 1000;

/// Default minimum tokens per sub-chunk.
pub const DEFAULT_MIN_SUB_CHUNK_TOKENS: usize = 300;

const PARAGRAPH_BREAK: &str = "\n\n";
const BULLET: char = '#';

/// Measures text length in tokens.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Counts words and standalone punctuation marks.
///
/// A word is a run of alphanumeric characters, apostrophes, or hyphens;
/// every other non-whitespace character is a token of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count(&self, text: &str) -> usize {
        let mut tokens = 0;
        let mut in_word = false;
        for c in text.chars() {
            if c.is_alphanumeric() || c == '\'' || c == '-' {
                if !in_word {
                    tokens += 1;
                    in_word = true;
                }
            } else {
                in_word = false;
                if !c.is_whitespace() {
                    tokens += 1;
                }
            }
        }
        tokens
    }
}

/// Split a document into base chunks on paragraph boundaries.
///
/// Paragraphs accumulate until the running character count reaches
/// `min_chars`; the next paragraph then starts a new chunk. Paragraphs are
/// rejoined with `\n\n` and never split internally.
pub fn split_into_chunks(text: &str, min_chars: usize) -> Vec<String> {
    accumulate(
        text.split(PARAGRAPH_BREAK).map(str::to_string),
        min_chars,
        |p| p.chars().count(),
        PARAGRAPH_BREAK,
    )
}

/// Split denoised text into sub-chunks of at least `min_tokens` tokens.
///
/// Text with more than one paragraph is split on `\n\n` and rejoined with
/// `\n\n`. Otherwise it is split into `#` bullet points, each keeping its
/// marker, and points are concatenated directly. Blank input yields no
/// sub-chunks.
pub fn split_into_sub_chunks(
    denoised: &str,
    min_tokens: usize,
    counter: &dyn TokenCounter,
) -> Vec<String> {
    let text = denoised.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let paragraphs: Vec<&str> = text.split(PARAGRAPH_BREAK).collect();
    if paragraphs.len() > 1 {
        return accumulate(
            paragraphs.into_iter().map(str::to_string),
            min_tokens,
            |p| counter.count(p),
            PARAGRAPH_BREAK,
        );
    }

    accumulate(bullet_points(text), min_tokens, |p| counter.count(p), "")
}

/// Split on the bullet marker and prefix every non-empty piece with it,
/// including any text before the first marker.
fn bullet_points(text: &str) -> Vec<String> {
    text.split(BULLET)
        .filter(|piece| !piece.is_empty())
        .map(|piece| format!("{}{}", BULLET, piece))
        .collect()
}

fn accumulate<I, F>(pieces: I, min_len: usize, measure: F, join_by: &str) -> Vec<String>
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> usize,
{
    let mut out = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for piece in pieces {
        let len = measure(&piece);
        if current_len >= min_len && !current.is_empty() {
            out.push(current.join(join_by));
            current = vec![piece];
            current_len = len;
        } else {
            current.push(piece);
            current_len += len;
        }
    }

    if !current.is_empty() {
        out.push(current.join(join_by));
    }

    out
}
