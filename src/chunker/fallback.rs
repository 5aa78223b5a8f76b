use super::{total_lines, Chunk, ChunkKind, Chunker};
use anyhow::Result;
use std::path::Path;

/// Whole-file chunker for extensions without a dedicated strategy
pub struct FallbackChunker {
    max_chars: usize,
}

impl FallbackChunker {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Chunker for FallbackChunker {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn extensions(&self) -> &[&'static str] {
        &[]
    }

    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        let file_name = Path::new(file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file_path);

        let head: String = content.chars().take(self.max_chars).collect();

        Ok(vec![Chunk::new(
            file_path,
            ChunkKind::File,
            Some(file_name.to_string()),
            1,
            total_lines(content),
            head,
        )])
    }
}
