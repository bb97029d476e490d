use std::collections::VecDeque;

use super::types::{Chunk, Document};

/// Separator levels tried in order, coarsest first. Each separator stays attached
/// to the piece it ends.
const SEPARATOR_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "? ", "! "], &[" "]];

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Upper bound on chunk length, in characters.
    pub chunk_size: usize,
    /// Upper bound on the text shared by consecutive chunks, in characters.
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

impl TextSplitter {
    /// A zero chunk size is treated as one; the overlap is clamped below the chunk size.
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let chunk_overlap = config.chunk_overlap.min(chunk_size - 1);
        Self {
            config: SplitterConfig {
                chunk_size,
                chunk_overlap,
            },
        }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split a document into chunks whose byte ranges tile its text with overlap.
    ///
    /// `chunk.content == document.content[chunk.start..chunk.end]` for every chunk.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = &document.content;
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces = Vec::new();
        self.atomize(text, 0, text.len(), 0, &mut pieces);

        self.merge(&pieces)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| Chunk {
                content: text[start..end].to_owned(),
                metadata: document.metadata.clone(),
                chunk_index: i,
                start,
                end,
            })
            .collect()
    }

    /// Cut `text[start..end]` into pieces no longer than the chunk size, trying
    /// coarser separators before finer ones.
    fn atomize(&self, text: &str, start: usize, end: usize, level: usize, out: &mut Vec<Piece>) {
        let chars = text[start..end].chars().count();
        if chars <= self.config.chunk_size {
            out.push(Piece { start, end, chars });
            return;
        }

        let Some(separators) = SEPARATOR_LEVELS.get(level) else {
            self.char_windows(text, start, end, out);
            return;
        };

        let cuts = cut_points(&text[start..end], separators);
        if cuts.is_empty() {
            self.atomize(text, start, end, level + 1, out);
            return;
        }

        let mut from = start;
        for cut in cuts {
            self.atomize(text, from, start + cut, level + 1, out);
            from = start + cut;
        }
        if from < end {
            self.atomize(text, from, end, level + 1, out);
        }
    }

    fn char_windows(&self, text: &str, start: usize, end: usize, out: &mut Vec<Piece>) {
        let window = if self.config.chunk_overlap > 0 {
            self.config.chunk_overlap
        } else {
            self.config.chunk_size
        };

        let mut from = start;
        let mut chars = 0;
        for (offset, _) in text[start..end].char_indices() {
            if chars == window {
                out.push(Piece {
                    start: from,
                    end: start + offset,
                    chars,
                });
                from = start + offset;
                chars = 0;
            }
            chars += 1;
        }
        if from < end {
            out.push(Piece {
                start: from,
                end,
                chars,
            });
        }
    }

    /// Greedily pack contiguous pieces into chunks, carrying trailing pieces of
    /// up to `chunk_overlap` characters into the next chunk.
    fn merge(&self, pieces: &[Piece]) -> Vec<(usize, usize)> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            if total + piece.chars > size
                && let (Some(first), Some(last)) = (window.front(), window.back())
            {
                chunks.push((first.start, last.end));
                while total > overlap || (total + piece.chars > size && total > 0) {
                    let Some(dropped) = window.pop_front() else {
                        break;
                    };
                    total -= dropped.chars;
                }
            }
            window.push_back(piece);
            total += piece.chars;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            chunks.push((first.start, last.end));
        }

        chunks
    }
}

/// Byte offsets (relative to `span`) just past each separator occurrence,
/// excluding the end of the span.
fn cut_points(span: &str, separators: &[&str]) -> Vec<usize> {
    let mut cuts: Vec<usize> = separators
        .iter()
        .flat_map(|sep| span.match_indices(sep).map(|(i, s)| i + s.len()))
        .filter(|&cut| cut < span.len())
        .collect();
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}
