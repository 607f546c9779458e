//! Content chunking for embedding generation.
//!
//! An item is embedded as a title chunk followed by body chunks. Chunk 0 is
//! always `title` (plus the first body paragraph when the title alone is
//! very short); it is the only chunk the matcher compares candidate sources
//! against, so the whole-item "what is this about" signal must land there.
//! Body paragraphs are folded into subsequent chunks up to the configured
//! size.

use regex::Regex;

use semlink_core::defaults;

/// Configuration for the item chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size of a chunk in characters.
    pub max_chunk_size: usize,
    /// Paragraphs shorter than this are folded into the previous chunk
    /// rather than emitted on their own.
    pub min_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::CHUNK_SIZE,
            min_chunk_size: defaults::CHUNK_MIN_SIZE,
        }
    }
}

/// Splits item text into the title chunk plus size-bounded body chunks.
#[derive(Debug, Clone)]
pub struct ItemChunker {
    config: ChunkerConfig,
    para_regex: Regex,
}

impl ItemChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            para_regex: Regex::new(r"\n\s*\n|\r\n\s*\r\n").expect("static paragraph regex"),
        }
    }

    /// Chunk an item. The returned vector is never empty for a non-empty
    /// title; index 0 is the title chunk.
    pub fn chunk(&self, title: &str, body: &str) -> Vec<String> {
        let title = title.trim();
        let paragraphs = self.split_paragraphs(body);

        let mut chunks = Vec::new();
        let mut title_chunk = title.to_string();

        let mut paragraphs = paragraphs.into_iter().peekable();
        // A bare title gives the matcher almost nothing to compare against,
        // so pull the lead paragraph up into chunk 0 when there is room.
        if title_chunk.len() < self.config.min_chunk_size {
            if let Some(lead) = paragraphs.peek() {
                if title_chunk.len() + 1 + lead.len() <= self.config.max_chunk_size {
                    let lead = paragraphs.next().expect("peeked paragraph");
                    if !title_chunk.is_empty() {
                        title_chunk.push('\n');
                    }
                    title_chunk.push_str(&lead);
                }
            }
        }
        if title_chunk.is_empty() {
            return chunks;
        }
        chunks.push(title_chunk);

        let mut current = String::new();
        for para in paragraphs {
            if para.len() > self.config.max_chunk_size {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(self.split_oversized(&para));
            } else if current.is_empty() {
                current = para;
            } else if current.len() + 1 + para.len() <= self.config.max_chunk_size {
                current.push('\n');
                current.push_str(&para);
            } else {
                chunks.push(std::mem::take(&mut current));
                current = para;
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    fn split_paragraphs(&self, text: &str) -> Vec<String> {
        self.para_regex
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Hard-split a paragraph longer than one chunk at UTF-8 boundaries,
    /// preferring whitespace near the cut point.
    fn split_oversized(&self, para: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut rest = para;
        while rest.len() > self.config.max_chunk_size {
            let mut cut = self.config.max_chunk_size;
            while cut > 0 && !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if let Some(ws) = rest[..cut].rfind(char::is_whitespace) {
                if ws >= self.config.min_chunk_size {
                    cut = ws;
                }
            }
            pieces.push(rest[..cut].trim().to_string());
            rest = rest[cut..].trim_start();
        }
        if !rest.is_empty() {
            pieces.push(rest.to_string());
        }
        pieces
    }
}

impl Default for ItemChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}
