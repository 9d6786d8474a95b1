#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub window_size: usize,
    /// Characters shared between adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            window_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.window_size, self.overlap)
    }
}

/// Split text into overlapping, sentence-aware windows.
///
/// Sizes are counted in characters. Text no longer than `window_size` is returned as a single
/// untouched chunk. Longer text is covered with no gaps: each window ends after the last `.`
/// it contains (when one exists past its start), and the next window starts `overlap`
/// characters earlier, moved forward to a sentence start when the overlap contains a `.`.
///
/// The next start is never pushed out to `start + window_size - overlap` or beyond the
/// previous end. A window that snapped back to an early `.` would otherwise skip the text
/// between its end and that position.
#[inline]
pub fn chunk_text(text: &str, window_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let window = window_size.max(1);

    if len <= window {
        return vec![text.to_string()];
    }

    let overlap = overlap.min(window - 1);
    let is_terminator = |i: &usize| chars.get(*i) == Some(&'.');

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + window).min(len);

        if end < len {
            if let Some(last_period) = (start + 1..end).rev().find(is_terminator) {
                end = last_period + 1;
            }
        }

        let window_text: String = chars.get(start..end).unwrap_or_default().iter().collect();
        let trimmed = window_text.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end == len {
            break;
        }

        let mut next = end.saturating_sub(overlap).max(start + 1);
        if let Some(first_period) = (next..end).find(is_terminator) {
            next = first_period + 1;
        }
        start = next;
    }

    debug!(
        "Split {} characters into {} chunks (window {}, overlap {})",
        len,
        chunks.len(),
        window,
        overlap
    );

    chunks
}
