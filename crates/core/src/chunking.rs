use crate::error::IngestError;
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Window size and overlap, both counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size <= self.overlap {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk size {} must be greater than overlap {}",
                self.chunk_size, self.overlap
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// Splits `text` into overlapping windows of `chunk_size` characters.
///
/// Every window advances the cursor by `chunk_size - overlap`; windows that are blank after
/// trimming are dropped and do not consume a sequence number, so ids stay contiguous.
pub fn chunk_text(text: &str, source: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut sequence = 0u64;
    let mut start = 0usize;

    while start < char_len {
        let end = (start + config.chunk_size).min(char_len);
        let piece = &text[boundaries[start]..boundaries[end]];

        if !piece.trim().is_empty() {
            chunks.push(Chunk {
                id: Chunk::make_id(source, sequence),
                text: piece.to_string(),
                source: source.to_string(),
            });
            sequence = sequence.saturating_add(1);
        }

        start = start.saturating_add(config.stride());
    }

    chunks
}
