//! Fixed-window overlapping chunker

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid chunk window: window_size ({window_size}) must be greater than overlap ({overlap})")]
    InvalidWindow { window_size: usize, overlap: usize },
}

/// A contiguous window of one source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier of the originating document
    pub document_id: String,
    /// Human-readable file name
    pub source_name: String,
    /// 0-based position within the document
    pub ordinal: usize,
    /// Trimmed, non-empty window text
    pub text: String,
}

/// Splits text into overlapping windows of `window_size` characters
///
/// Consecutive windows start `window_size - overlap` characters apart.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    window_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(window_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if window_size == 0 || window_size <= overlap {
            return Err(ChunkError::InvalidWindow {
                window_size,
                overlap,
            });
        }
        Ok(Self {
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk one document's text
    ///
    /// Windows that are empty after trimming are dropped; ordinals are assigned
    /// to the surviving chunks only, so they stay dense.
    pub fn chunk(&self, document_id: &str, source_name: &str, text: &str) -> Vec<Chunk> {
        self.windows(text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, window)| Chunk {
                document_id: document_id.to_string(),
                source_name: source_name.to_string(),
                ordinal,
                text: window.to_string(),
            })
            .collect()
    }

    /// Raw trimmed windows over the character sequence of `text`
    pub fn windows<'a>(&self, text: &'a str) -> Vec<&'a str> {
        // Byte offset of every char boundary, including the end of the string
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;
        let step = self.window_size - self.overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.window_size).min(char_count);
            let window = text[boundaries[start]..boundaries[end]].trim();
            if !window.is_empty() {
                windows.push(window);
            }
            start += step;
        }
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the overlap: first window whole, then each later window minus its
    /// leading `overlap` characters.
    fn reconstruct(windows: &[&str], overlap: usize) -> String {
        let mut out = String::new();
        for (i, window) in windows.iter().enumerate() {
            if i == 0 {
                out.push_str(window);
            } else {
                out.extend(window.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_invalid_windows_rejected() {
        assert_eq!(
            Chunker::new(100, 100).unwrap_err(),
            ChunkError::InvalidWindow {
                window_size: 100,
                overlap: 100
            }
        );
        assert!(Chunker::new(10, 20).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(1, 0).is_ok());
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(500, 100).unwrap();
        assert!(chunker.chunk("doc", "a.pdf", "").is_empty());
        assert!(chunker.chunk("doc", "a.pdf", "   \n\t ").is_empty());
    }

    #[test]
    fn test_window_lengths() {
        let chunker = Chunker::new(10, 3).unwrap();
        let text: String = ('a'..='z').cycle().take(45).collect();

        let windows = chunker.windows(&text);
        // starts at 0, 7, 14, 21, 28, 35, 42
        assert_eq!(windows.len(), 7);
        for window in &windows[..windows.len() - 1] {
            assert_eq!(window.chars().count(), 10);
        }
        assert_eq!(windows.last().unwrap().chars().count(), 3);
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let chunker = Chunker::new(8, 3).unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz";

        let windows = chunker.windows(text);
        for pair in windows.windows(2) {
            let tail: String = pair[0].chars().skip(8 - 3).collect();
            let head: String = pair[1].chars().take(tail.chars().count()).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_reconstruction() {
        let cases = [(500, 100, 1234), (10, 0, 95), (7, 6, 40), (50, 10, 50), (3, 1, 2)];
        for (window_size, overlap, len) in cases {
            let chunker = Chunker::new(window_size, overlap).unwrap();
            let text: String = "0123456789".chars().cycle().take(len).collect();

            let windows = chunker.windows(&text);
            assert_eq!(
                reconstruct(&windows, overlap),
                text,
                "window={} overlap={} len={}",
                window_size,
                overlap,
                len
            );
        }
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunker = Chunker::new(4, 1).unwrap();
        let text = "§§§§éééé";

        let windows = chunker.windows(text);
        assert_eq!(windows, vec!["§§§§", "§ééé", "éé"]);
    }

    #[test]
    fn test_whitespace_only_windows_dropped() {
        let chunker = Chunker::new(5, 0).unwrap();
        let text = "abc       def";

        let chunks = chunker.chunk("d1", "brief.docx", text);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abc", "def"]);
        assert_eq!(chunks[1].ordinal, 1);
        assert_eq!(chunks[1].source_name, "brief.docx");
        assert_eq!(chunks[1].document_id, "d1");
    }
}
