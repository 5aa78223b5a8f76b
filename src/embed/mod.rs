mod batch;
mod embedder;

pub use batch::{clean_docstring, prepare_text, BatchEmbedder, EmbeddingStats};
pub use embedder::{FastEmbedder, ModelType};

use anyhow::Result;

/// Text embedding backend
///
/// Implementations must be deterministic for a given model and return one
/// vector of `dimensions()` floats per input text, in input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}
