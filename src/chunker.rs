//! Fixed-size character chunking and the chunk index.
//!
//! Every document is cut into windows of `chunk_size` characters, advancing by
//! `chunk_size - chunk_overlap` until the window start passes the end of the
//! document. Chunk identifiers are assigned globally in document order, then
//! chunk order, starting at 0 with no gaps.

use crate::document::Document;
use crate::error::{RagEvalError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Identifier of a chunk: its position in the index.
pub type ChunkId = usize;

/// Configuration for text chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }
}

impl ChunkConfig {
    /// Reject configurations whose stride is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagEvalError::Config(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagEvalError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// Distance between the starts of consecutive chunks.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// A chunk record as stored in the index artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Chunk {
    /// Name of the source document.
    pub file_name: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Start character offset (inclusive).
    pub start_chr: usize,
    /// End character offset (exclusive), clipped to the document length.
    pub end_chr: usize,
    /// Chunk text.
    pub text: String,
}

/// Immutable mapping from chunk identifier to chunk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    chunks: Vec<Chunk>,
}

impl Index {
    /// Rebuild an index from an identifier-keyed map.
    ///
    /// The keys must be exactly `0..n`.
    pub fn from_map(map: BTreeMap<ChunkId, Chunk>) -> Result<Self> {
        for (expected, id) in map.keys().enumerate() {
            if *id != expected {
                return Err(RagEvalError::DataIntegrity(format!(
                    "index identifiers are not contiguous: expected {}, found {}",
                    expected, id
                )));
            }
        }
        Ok(Self {
            chunks: map.into_values().collect(),
        })
    }

    /// Build from chunks already in identifier order.
    pub(crate) fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Identifier-keyed view used by the JSON artifact.
    pub fn to_map(&self) -> BTreeMap<ChunkId, &Chunk> {
        self.chunks.iter().enumerate().collect()
    }

    /// Look up a chunk by identifier.
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All chunks in identifier order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Chunk texts in identifier order, as fed to the embedding gateway.
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }

    /// Number of distinct source documents.
    pub fn document_count(&self) -> usize {
        let mut count = 0;
        let mut last: Option<&str> = None;
        for chunk in &self.chunks {
            if last != Some(chunk.file_name.as_str()) {
                count += 1;
                last = Some(chunk.file_name.as_str());
            }
        }
        count
    }
}

/// Accumulates chunks document by document and hands out an immutable [`Index`].
#[derive(Debug)]
pub struct IndexBuilder {
    config: ChunkConfig,
    chunks: Vec<Chunk>,
}

impl IndexBuilder {
    /// Create a builder. Fails if the chunk stride is not positive.
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            chunks: Vec::new(),
        })
    }

    /// Chunk one document and append its chunks. Returns the number added.
    pub fn add_document(&mut self, name: &str, text: &str) -> usize {
        let spans = chunk_spans(text, &self.config);
        let added = spans.len();

        for (chunk_index, (start_chr, end_chr, text)) in spans.into_iter().enumerate() {
            self.chunks.push(Chunk {
                file_name: name.to_string(),
                chunk_index,
                start_chr,
                end_chr,
                text,
            });
        }

        debug!(document = name, chunks = added, "chunked document");
        added
    }

    /// Finish building.
    pub fn build(self) -> Index {
        Index::from_chunks(self.chunks)
    }
}

/// Chunk a whole corpus in the given document order.
pub fn build_index(documents: &[Document], config: ChunkConfig) -> Result<Index> {
    let mut builder = IndexBuilder::new(config)?;
    for document in documents {
        builder.add_document(&document.name, &document.content);
    }
    let index = builder.build();

    info!(
        documents = documents.len(),
        chunks = index.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "built index"
    );
    Ok(index)
}

/// Split text into `(start_chr, end_chr, text)` windows using character offsets.
fn chunk_spans(text: &str, config: &ChunkConfig) -> Vec<(usize, usize, String)> {
    // Byte offset of every character boundary, including the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let stride = config.stride();

    (0..char_len)
        .step_by(stride)
        .map(|start| {
            let end = (start + config.chunk_size).min(char_len);
            let slice = &text[boundaries[start]..boundaries[end]];
            (start, end, slice.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn test_chunk_config_default() {
        let config = ChunkConfig::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 64);
        assert_eq!(config.stride(), 448);
    }

    #[test]
    fn test_non_positive_stride_is_config_error() {
        assert!(matches!(
            IndexBuilder::new(config(10, 10)),
            Err(RagEvalError::Config(_))
        ));
        assert!(matches!(
            IndexBuilder::new(config(10, 15)),
            Err(RagEvalError::Config(_))
        ));
        assert!(IndexBuilder::new(config(0, 0)).is_err());
    }

    #[test]
    fn test_simple_windows() {
        let spans = chunk_spans("abcdefghij", &config(4, 1));
        let starts: Vec<_> = spans.iter().map(|s| (s.0, s.1)).collect();
        assert_eq!(starts, vec![(0, 4), (3, 7), (6, 10), (9, 10)]);
        assert_eq!(spans[0].2, "abcd");
        assert_eq!(spans[1].2, "defg");
        assert_eq!(spans[3].2, "j");
    }

    #[test]
    fn test_chunk_layout_properties() {
        let text: String = (0..97).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        for (size, overlap) in [(10, 0), (10, 3), (7, 6), (1, 0), (200, 50), (97, 10)] {
            let cfg = config(size, overlap);
            let spans = chunk_spans(&text, &cfg);
            let len = text.len();

            // One window per stride step that starts inside the document.
            assert_eq!(spans.len(), len.div_ceil(cfg.stride()), "C={} O={}", size, overlap);

            assert_eq!(spans.first().unwrap().0, 0);
            assert_eq!(spans.last().unwrap().1, len);

            for (start, end, chunk_text) in &spans {
                assert!(end - start <= size);
                assert_eq!(chunk_text.chars().count(), end - start);
                assert_eq!(&text[*start..*end], chunk_text);
            }

            for pair in spans.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                assert_eq!(next.0, prev.0 + cfg.stride());
                // Unclipped windows overlap by exactly the configured amount.
                if prev.1 - prev.0 == size {
                    assert_eq!(prev.1 - next.0, overlap);
                }
            }
        }
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let mut builder = IndexBuilder::new(config(10, 2)).unwrap();
        assert_eq!(builder.add_document("empty.txt", ""), 0);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_character_offsets_not_bytes() {
        let spans = chunk_spans("héllo wörld", &config(4, 0));
        assert_eq!(spans[0].2, "héll");
        assert_eq!(spans[1].2, "o wö");
        assert_eq!(spans[2].2, "rld");
        assert_eq!(spans[2].1, 11);
    }

    #[test]
    fn test_identifiers_contiguous_across_documents() {
        let docs = vec![
            Document::from_text("a.txt", "0123456789"),
            Document::from_text("b.txt", ""),
            Document::from_text("c.txt", "abcdef"),
        ];
        let index = build_index(&docs, config(4, 0)).unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(index.document_count(), 2);

        let ids: Vec<_> = index.to_map().keys().copied().collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        let third = index.get(2).unwrap();
        assert_eq!(third.file_name, "a.txt");
        assert_eq!(third.chunk_index, 2);
        assert_eq!((third.start_chr, third.end_chr), (8, 10));

        let fourth = index.get(3).unwrap();
        assert_eq!(fourth.file_name, "c.txt");
        assert_eq!(fourth.chunk_index, 0);
        assert_eq!(fourth.text, "abcd");
    }

    #[test]
    fn test_from_map_rejects_gaps() {
        let chunk = Chunk {
            file_name: "a.txt".to_string(),
            chunk_index: 0,
            start_chr: 0,
            end_chr: 1,
            text: "a".to_string(),
        };
        let mut map = BTreeMap::new();
        map.insert(0, chunk.clone());
        map.insert(2, chunk);
        assert!(matches!(
            Index::from_map(map),
            Err(RagEvalError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_rebuilding_is_deterministic() {
        let docs = vec![Document::from_text("a.txt", "the quick brown fox jumps")];
        let first = build_index(&docs, config(8, 3)).unwrap();
        let second = build_index(&docs, config(8, 3)).unwrap();
        assert_eq!(first, second);
    }
}
