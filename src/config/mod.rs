use crate::embed::ModelType;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the optional config file inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration for one indexed project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-project data directory, relative to the indexed root
    pub data_dir_name: String,

    /// Embedding model configuration
    pub embedding: EmbeddingConfig,

    /// Indexing configuration
    pub indexing: IndexingConfig,

    /// Search defaults
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model
    pub model: ModelType,

    /// Batch size for embedding
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// File extensions (without dot) that are indexed
    pub extensions: Vec<String>,

    /// Directory names never descended into
    pub ignore_dirs: Vec<String>,

    /// File names never indexed
    pub ignore_files: Vec<String>,

    /// Characters kept by the whole-file fallback chunker
    pub fallback_chunk_chars: usize,

    /// Honour `.gitignore` patterns at the project root
    pub respect_gitignore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_max_results: usize,
    pub default_min_score: f32,
}

impl Config {
    /// Load `<root>/<data_dir>/config.json` if present, defaults otherwise
    pub fn load(root: &Path) -> Result<Self> {
        let defaults = Self::default();
        let path = root.join(&defaults.data_dir_name).join(CONFIG_FILE_NAME);

        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(defaults);
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&raw)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Get the data directory for a project root, creating it if necessary
    pub fn data_dir(&self, root: &Path) -> Result<PathBuf> {
        let dir = root.join(&self.data_dir_name);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Whether a file extension is on the indexing allow-list
    pub fn is_indexable_extension(&self, ext: &str) -> bool {
        self.indexing
            .extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir_name: ".codescope".to_string(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: ModelType::default(),
            batch_size: 32,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        let to_strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            extensions: to_strings(&["py", "js", "ts", "jsx", "tsx", "json", "yaml", "yml", "toml"]),
            ignore_dirs: to_strings(&[
                ".git",
                "__pycache__",
                "node_modules",
                ".venv",
                "venv",
                "env",
                "dist",
                "build",
                ".codescope",
            ]),
            ignore_files: to_strings(&[".gitignore", ".env", ".DS_Store"]),
            fallback_chunk_chars: 1000,
            respect_gitignore: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            default_min_score: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir_name, ".codescope");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.indexing.fallback_chunk_chars, 1000);
        assert!(config.is_indexable_extension("py"));
        assert!(config.is_indexable_extension("TSX"));
        assert!(!config.is_indexable_extension("rs"));
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.search.default_max_results, 10);
    }

    #[test]
    fn test_load_partial_config() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join(".codescope");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(
            data.join(CONFIG_FILE_NAME),
            r#"{"indexing": {"extensions": ["py"], "fallback_chunk_chars": 50}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.indexing.extensions, vec!["py".to_string()]);
        assert_eq!(config.indexing.fallback_chunk_chars, 50);
        // Untouched sections keep their defaults
        assert_eq!(config.embedding.batch_size, 32);
        assert!(config.indexing.respect_gitignore);
    }

    #[test]
    fn test_data_dir_created() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let data_dir = config.data_dir(dir.path()).unwrap();
        assert!(data_dir.is_dir());
        assert!(data_dir.ends_with(".codescope"));
    }
}
