use crate::document::Document;
use anyhow::{Context, Result};
use clap::ValueEnum;
use log::{debug, warn};
use serde_json::Value;
use tiktoken_rs::CoreBPE;

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// BPE vocabularies available for measuring chunk length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Encoding {
    #[default]
    #[value(name = "cl100k_base")]
    Cl100kBase,
    #[value(name = "p50k_base")]
    P50kBase,
    #[value(name = "r50k_base")]
    R50kBase,
}

impl Encoding {
    fn load(self) -> Result<CoreBPE> {
        let bpe = match self {
            Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            Encoding::P50kBase => tiktoken_rs::p50k_base(),
            Encoding::R50kBase => tiktoken_rs::r50k_base(),
        };
        bpe.with_context(|| format!("Failed to load {:?} encoding", self))
    }
}

/// Splits text on a separator and merges pieces into chunks bounded by a token count
pub struct TokenTextSplitter {
    bpe: CoreBPE,
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl TokenTextSplitter {
    pub fn new(encoding: Encoding, chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if chunk_overlap > chunk_size {
            anyhow::bail!(
                "Chunk overlap ({}) is larger than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }

        Ok(TokenTextSplitter {
            bpe: encoding.load()?,
            chunk_size,
            chunk_overlap,
            separator: DEFAULT_SEPARATOR.to_string(),
        })
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of tokens the configured encoding produces for a text
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Split text into chunks of at most `chunk_size` tokens where possible
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let pieces: Vec<&str> = if self.separator.is_empty() {
            vec![text]
        } else {
            text.split(self.separator.as_str())
                .filter(|p| !p.is_empty())
                .collect()
        };
        self.merge_pieces(&pieces)
    }

    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let separator_len = self.count_tokens(&self.separator);
        let mut chunks = Vec::new();
        // (piece, token length) of the chunk being built
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut total = 0;

        for &piece in pieces {
            let len = self.count_tokens(piece);
            let joined_len = |current: &[(&str, usize)]| {
                if current.is_empty() {
                    0
                } else {
                    separator_len
                }
            };

            if total + len + joined_len(&current) > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }
                if !current.is_empty() {
                    if let Some(chunk) = self.join(&current) {
                        chunks.push(chunk);
                    }
                    // Keep a tail of the closed chunk as overlap for the next one
                    while total > self.chunk_overlap
                        || (total + len + joined_len(&current) > self.chunk_size && total > 0)
                    {
                        let (_, first_len) = current.remove(0);
                        total -= first_len + if current.is_empty() { 0 } else { separator_len };
                    }
                }
            }

            total += len + joined_len(&current);
            current.push((piece, len));
        }

        if total > self.chunk_size {
            warn!(
                "Created a chunk of size {}, which is longer than the specified {}",
                total, self.chunk_size
            );
        }
        if let Some(chunk) = self.join(&current) {
            chunks.push(chunk);
        }

        debug!("Split text into {} chunks", chunks.len());
        chunks
    }

    fn join(&self, pieces: &[(&str, usize)]) -> Option<String> {
        let text = pieces
            .iter()
            .map(|(piece, _)| *piece)
            .collect::<Vec<_>>()
            .join(&self.separator);
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// Split each document into chunk documents that inherit its metadata
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let mut out = Vec::new();

        for source in documents {
            let mut search_from = 0;
            for (split_id, chunk) in self.split_text(&source.content).into_iter().enumerate() {
                let start = source.content[search_from..]
                    .find(&chunk)
                    .map(|offset| search_from + offset);
                if let Some(start) = start {
                    search_from = start;
                }

                let mut meta = source.meta.clone();
                meta.insert("source_id".to_string(), Value::String(source.id.clone()));
                meta.insert("split_id".to_string(), Value::from(split_id));
                if let Some(start) = start {
                    meta.insert("split_idx_start".to_string(), Value::from(start));
                }
                out.push(Document::with_meta(chunk, meta));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::TECH_REPORT;

    fn splitter(size: usize, overlap: usize) -> TokenTextSplitter {
        TokenTextSplitter::new(Encoding::Cl100kBase, size, overlap).unwrap()
    }

    #[test]
    fn test_rejects_overlap_larger_than_size() {
        assert!(TokenTextSplitter::new(Encoding::Cl100kBase, 10, 20).is_err());
        assert!(TokenTextSplitter::new(Encoding::Cl100kBase, 0, 0).is_err());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = splitter(512, 200).split_text("  One paragraph only.  ");
        assert_eq!(chunks, vec!["One paragraph only.".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(splitter(512, 0).split_text("").is_empty());
        assert!(splitter(512, 0).split_text("\n\n\n\n").is_empty());
    }

    #[test]
    fn test_chunks_respect_limit_and_order() {
        let splitter = splitter(512, 200);
        let chunks = splitter.split_text(TECH_REPORT);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(splitter.count_tokens(chunk) <= 512);
        }

        // Read order: each chunk starts no earlier than the previous one
        let mut last = 0;
        for chunk in &chunks {
            let pos = TECH_REPORT.find(chunk.as_str()).unwrap();
            assert!(pos >= last);
            last = pos;
        }
    }

    #[test]
    fn test_no_overlap_partitions_paragraphs() {
        let text = "alpha beta\n\ngamma delta\n\nepsilon zeta";
        let splitter = splitter(5, 0);
        let chunks = splitter.split_text(text);

        let paragraphs: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.split("\n\n"))
            .collect();
        assert_eq!(paragraphs, vec!["alpha beta", "gamma delta", "epsilon zeta"]);
    }

    #[test]
    fn test_oversized_piece_is_kept_whole() {
        let long = "word ".repeat(50);
        let text = format!("short\n\n{}", long);
        let chunks = splitter(10, 0).split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], long.trim());
    }

    #[test]
    fn test_split_documents_metadata() {
        let source = Document::new(TECH_REPORT);
        let chunks = splitter(512, 200).split_documents(&[source.clone()]);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.meta_str("source_id"), Some(source.id.as_str()));
            assert_eq!(chunk.meta["split_id"], Value::from(i));
            let start = chunk.meta["split_idx_start"].as_u64().unwrap() as usize;
            assert!(source.content[start..].starts_with(&chunk.content));
        }
    }
}
