use super::Embedder;
use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

/// Sentence-embedding models the engine can load
///
/// The vector index is sized from `dimensions()`, so switching models on an
/// existing index requires a forced re-index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModelType {
    /// sentence-transformers/all-MiniLM-L6-v2
    #[default]
    #[serde(rename = "all-minilm-l6-v2")]
    MiniLm,
    #[serde(rename = "bge-small-en-v1.5")]
    BgeSmall,
    #[serde(rename = "bge-base-en-v1.5")]
    BgeBase,
}

struct ModelInfo {
    key: &'static str,
    name: &'static str,
    dimensions: usize,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [Self::MiniLm, Self::BgeSmall, Self::BgeBase];

    fn info(&self) -> ModelInfo {
        match self {
            Self::MiniLm => ModelInfo {
                key: "all-minilm-l6-v2",
                name: "sentence-transformers/all-MiniLM-L6-v2",
                dimensions: 384,
            },
            Self::BgeSmall => ModelInfo {
                key: "bge-small-en-v1.5",
                name: "BAAI/bge-small-en-v1.5",
                dimensions: 384,
            },
            Self::BgeBase => ModelInfo {
                key: "bge-base-en-v1.5",
                name: "BAAI/bge-base-en-v1.5",
                dimensions: 768,
            },
        }
    }

    fn backend_model(&self) -> EmbeddingModel {
        match self {
            Self::MiniLm => EmbeddingModel::AllMiniLML6V2,
            Self::BgeSmall => EmbeddingModel::BGESmallENV15,
            Self::BgeBase => EmbeddingModel::BGEBaseENV15,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.info().dimensions
    }

    /// Hugging Face identifier
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Short key used in config files
    pub fn key(&self) -> &'static str {
        self.info().key
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.key() == wanted || m.name().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("Unknown embedding model: {}", value))
    }
}

/// Local ONNX embedder backed by fastembed
///
/// The model is fetched into the fastembed cache the first time it loads.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_type: ModelType,
}

impl FastEmbedder {
    pub fn with_model(model_type: ModelType) -> Result<Self> {
        info!(
            "Loading {} ({} dims)",
            model_type.name(),
            model_type.dimensions()
        );

        let options =
            InitOptions::new(model_type.backend_model()).with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Embedding backend unavailable: {}", e))?;

        Ok(Self {
            model: Mutex::new(model),
            model_type,
        })
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("Embedding model lock poisoned"))?;
        let vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| anyhow!("Embedding failed: {}", e))?;

        debug!("Embedded {} texts", vectors.len());
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.model_type.dimensions()
    }

    fn model_name(&self) -> &str {
        self.model_type.name()
    }
}
