pub mod chunker;
pub mod cli;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod file;
pub mod search;
pub mod symbols;
pub mod vectordb;

// Re-export commonly used types
pub use chunker::{Chunk, ChunkKind, Chunker, ChunkerRegistry};
pub use config::Config;
pub use embed::{Embedder, FastEmbedder, ModelType};
pub use engine::{EmbedderLoader, IndexingStatus, SearchEngine, UpdateOutcome};
pub use error::{EngineError, Result};
pub use file::{FileInfo, FileWalker, Language};
pub use search::{SearchMode, SearchRequest, SearchResult};
pub use symbols::{find_symbol_bounds, ReadRequest, SymbolContent};
pub use vectordb::{StoreStats, VectorStore};
