use super::Embedder;
use crate::chunker::Chunk;
use crate::error::{EngineError, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Statistics for one embedding run
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStats {
    pub total_chunks: usize,
    pub batches: usize,
    pub total_time_ms: u128,
}

impl EmbeddingStats {
    pub fn chunks_per_second(&self) -> f32 {
        if self.total_time_ms == 0 {
            return 0.0;
        }
        (self.total_chunks as f32 / self.total_time_ms as f32) * 1000.0
    }
}

/// Batch processor for embedding chunks efficiently
pub struct BatchEmbedder {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_batch_size(embedder, 32)
    }

    pub fn with_batch_size(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Embed chunks in batches; output order matches input order
    pub fn embed_chunks(&self, chunks: &[Chunk]) -> Result<(Vec<Vec<f32>>, EmbeddingStats)> {
        let mut stats = EmbeddingStats {
            total_chunks: chunks.len(),
            ..Default::default()
        };
        if chunks.is_empty() {
            return Ok((Vec::new(), stats));
        }

        let start = Instant::now();
        let total_batches = chunks.len().div_ceil(self.batch_size);
        let mut embeddings = Vec::with_capacity(chunks.len());

        for (batch_idx, batch) in chunks.chunks(self.batch_size).enumerate() {
            debug!(
                "Embedding batch {}/{} ({} chunks)",
                batch_idx + 1,
                total_batches,
                batch.len()
            );

            let texts: Vec<String> = batch.iter().map(prepare_text).collect();
            let vectors = self.embed_texts(&texts)?;
            embeddings.extend(vectors);
            stats.batches += 1;
        }

        stats.total_time_ms = start.elapsed().as_millis();
        info!(
            "Embedded {} chunks in {} batches ({:.1} chunks/sec)",
            stats.total_chunks,
            stats.batches,
            stats.chunks_per_second()
        );

        Ok((embeddings, stats))
    }

    /// Embed a search query
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Embedding("No embedding generated".to_string()))
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .embedder
            .embed(texts)
            .map_err(|e| EngineError::Embedding(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(EngineError::Embedding(format!(
                "Backend returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let expected = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EngineError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

/// Text fed to the embedding model for a chunk
///
/// Combines the signature, cleaned documentation and content so the
/// vector reflects both the declaration and its body.
pub fn prepare_text(chunk: &Chunk) -> String {
    let mut parts = Vec::new();

    if let Some(symbol) = &chunk.symbol_name {
        parts.push(format!("{} {} in {}", chunk.kind, symbol, chunk.file_path));
    }

    if let Some(sig) = &chunk.signature {
        parts.push(format!("Signature: {}", sig));
    }

    if let Some(doc) = &chunk.docstring {
        let cleaned = clean_docstring(doc);
        if !cleaned.is_empty() {
            parts.push(format!("Documentation: {}", cleaned));
        }
    }

    parts.push(format!("Code:\n{}", chunk.content));

    parts.join("\n")
}

/// Clean docstring by removing comment markers
pub fn clean_docstring(doc: &str) -> String {
    doc.lines()
        .map(|line| {
            let trimmed = line.trim();
            let trimmed = trimmed
                .strip_prefix("/**")
                .or_else(|| trimmed.strip_prefix("/*"))
                .or_else(|| trimmed.strip_prefix("//"))
                .or_else(|| trimmed.strip_prefix("*/"))
                .or_else(|| trimmed.strip_prefix('*'))
                .or_else(|| trimmed.strip_prefix('#'))
                .unwrap_or(trimmed);
            trimmed.trim_matches('"').trim_end_matches("*/").trim()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
