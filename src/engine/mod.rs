//! Search engine orchestrator
//!
//! Owns the embedding backend handle, walks the project tree, drives full
//! and incremental indexing and dispatches queries by mode. Every index
//! mutation runs behind one per-engine lock.

use crate::chunker::{Chunk, ChunkerRegistry};
use crate::config::Config;
use crate::embed::{BatchEmbedder, Embedder, FastEmbedder};
use crate::error::{EngineError, Result};
use crate::file::{is_binary_content, relative_path, FileWalker, PathFilter};
use crate::search::{EnhancedSearchManager, FileSymbols, SearchMode, SearchRequest, SearchResult};
use crate::symbols::{ReadRequest, SymbolContent, SymbolReader};
use crate::vectordb::{CompactReport, StoreStats, VectorStore};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Builds the embedding backend; called once by [`SearchEngine::initialize`]
pub type EmbedderLoader = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Embedder>> + Send + Sync>;

/// Lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Uninitialized,
    /// Loading the embedding backend
    Initializing,
    Ready,
}

impl IndexingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for IndexingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a full or incremental codebase pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub forced: bool,
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    pub files_removed: usize,
    pub chunks_removed: usize,
    pub duration_ms: u128,
}

/// Outcome of a single-file update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// The file is gone from disk; its chunks were dropped
    Removed { chunks_removed: usize },
    /// Stored SHA1 matches the file
    Unchanged,
    Updated { chunks: usize, file_hash: String },
}

/// Outcome of a batch update
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchUpdateReport {
    pub updated_files: usize,
    pub skipped_files: usize,
    pub removed_files: usize,
    pub failed_files: Vec<String>,
    pub total_chunks: usize,
}

/// Outcome of reconciling the index against the working tree
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed_files: Vec<String>,
    pub removed_chunks: usize,
    pub existing_files: usize,
}

/// Engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub initialized: bool,
    pub status: IndexingStatus,
    pub working_directory: String,
    pub model: String,
    pub chunkers: usize,
    pub supported_search_modes: Vec<SearchMode>,
}

/// One tracked file in the status listing
#[derive(Debug, Clone, Serialize)]
pub struct IndexedFileSummary {
    pub file: String,
    /// First 8 hex chars of the stored SHA1
    pub hash: String,
    pub chunks: usize,
}

/// Detailed indexing status
#[derive(Debug, Clone, Serialize)]
pub struct IndexingStatusReport {
    pub stats: EngineStats,
    pub indexed_files: usize,
    pub indexed_file_details: Vec<IndexedFileSummary>,
}

const STATUS_FILE_LIMIT: usize = 10;
const PROGRESS_EVERY: usize = 10;

struct EngineState {
    status: IndexingStatus,
    embedder: Option<Arc<BatchEmbedder>>,
}

/// Chunks produced for one file, waiting to be embedded
struct PendingFile {
    path: String,
    chunks: Vec<Chunk>,
}

/// Multi-mode code search engine over one project root
pub struct SearchEngine {
    root: PathBuf,
    config: Config,
    filter: Arc<PathFilter>,
    registry: ChunkerRegistry,
    store: Arc<VectorStore>,
    search: Arc<EnhancedSearchManager>,
    loader: EmbedderLoader,
    model_name: String,
    state: RwLock<EngineState>,
    index_lock: Mutex<()>,
}

impl SearchEngine {
    /// Engine backed by the configured fastembed model
    pub fn new(root: impl AsRef<Path>, config: Config) -> Result<Self> {
        let model = config.embedding.model;
        let loader: EmbedderLoader = Arc::new(move || -> anyhow::Result<Arc<dyn Embedder>> {
            Ok(Arc::new(FastEmbedder::with_model(model)?))
        });
        let model_name = model.name().to_string();
        Self::build(root.as_ref(), config, loader, model_name)
    }

    /// Engine with a caller-supplied embedding backend
    pub fn with_loader(root: impl AsRef<Path>, config: Config, loader: EmbedderLoader) -> Result<Self> {
        let model_name = config.embedding.model.name().to_string();
        Self::build(root.as_ref(), config, loader, model_name)
    }

    fn build(root: &Path, config: Config, loader: EmbedderLoader, model_name: String) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|_| EngineError::FileNotFound(root.display().to_string()))?;
        let data_dir = config.data_dir(&root)?;

        let filter = Arc::new(PathFilter::new(&root, &config));
        let registry = ChunkerRegistry::new(config.indexing.fallback_chunk_chars)
            .map_err(|e| EngineError::Internal(format!("Failed to build chunkers: {}", e)))?;
        let store = Arc::new(VectorStore::open(
            &root,
            &data_dir,
            config.embedding.model.dimensions(),
        )?);
        let search = Arc::new(EnhancedSearchManager::new(&root, Arc::clone(&filter))?);

        info!("Search engine created for {}", root.display());

        Ok(Self {
            root,
            config,
            filter,
            registry,
            store,
            search,
            loader,
            model_name,
            state: RwLock::new(EngineState {
                status: IndexingStatus::Uninitialized,
                embedder: None,
            }),
            index_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn status(&self) -> IndexingStatus {
        self.state.read().map(|s| s.status).unwrap_or(IndexingStatus::Uninitialized)
    }

    fn set_state(&self, status: IndexingStatus, embedder: Option<Arc<BatchEmbedder>>) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| EngineError::Internal("Engine state lock poisoned".to_string()))?;
        state.status = status;
        state.embedder = embedder;
        Ok(())
    }

    fn embedder(&self) -> Result<Arc<BatchEmbedder>> {
        let state = self
            .state
            .read()
            .map_err(|_| EngineError::Internal("Engine state lock poisoned".to_string()))?;
        match (&state.status, &state.embedder) {
            (IndexingStatus::Ready, Some(embedder)) => Ok(Arc::clone(embedder)),
            _ => Err(EngineError::NotReady),
        }
    }

    /// Load the embedding backend and index the project if nothing is stored yet
    ///
    /// Idempotent: a ready engine returns immediately.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.index_lock.lock().await;

        if self.status() == IndexingStatus::Ready {
            return Ok(());
        }

        self.set_state(IndexingStatus::Initializing, None)?;
        info!("Loading embedding backend: {}", self.model_name);

        let loader = Arc::clone(&self.loader);
        let loaded = run_blocking(move || {
            (*loader)().map_err(|e| EngineError::BackendUnavailable(e.to_string()))
        })
        .await;

        let backend = match loaded {
            Ok(backend) => backend,
            Err(err) => {
                self.set_state(IndexingStatus::Uninitialized, None)?;
                return Err(err);
            }
        };

        if backend.dimensions() != self.store.dimensions() {
            self.set_state(IndexingStatus::Uninitialized, None)?;
            return Err(EngineError::DimensionMismatch {
                expected: self.store.dimensions(),
                actual: backend.dimensions(),
            });
        }

        let embedder = Arc::new(BatchEmbedder::with_batch_size(
            backend,
            self.config.embedding.batch_size,
        ));
        self.set_state(IndexingStatus::Ready, Some(embedder))?;

        let store = Arc::clone(&self.store);
        if run_blocking(move || store.is_empty()).await? {
            info!("No existing index, running first full index");
            self.index_locked(false).await?;
        }

        info!("Search engine initialized");
        Ok(())
    }

    /// Index the whole project
    ///
    /// Without `force_reindex` only changed files are re-embedded and files
    /// gone from disk are dropped; with it the store is cleared first.
    pub async fn index_codebase(&self, force_reindex: bool) -> Result<IndexReport> {
        self.embedder()?;
        let _guard = self.index_lock.lock().await;
        self.index_locked(force_reindex).await
    }

    async fn index_locked(&self, force: bool) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport {
            forced: force,
            ..Default::default()
        };

        info!("Starting codebase indexing: {}", self.root.display());

        if force {
            let store = Arc::clone(&self.store);
            run_blocking(move || store.clear()).await?;
        }

        let walker = FileWalker::new(&self.root, Arc::clone(&self.filter), &self.config);
        let (files, _) = run_blocking(move || walker.walk()).await?;
        report.files_seen = files.len();

        let changed: HashSet<String> = if force {
            files.iter().map(|f| f.relative.clone()).collect()
        } else {
            let store = Arc::clone(&self.store);
            let relatives: Vec<String> = files.iter().map(|f| f.relative.clone()).collect();
            let (summary, changed) = run_blocking(move || {
                let existing: HashSet<String> = relatives.iter().cloned().collect();
                let summary = store.cleanup_deleted_files(&existing)?;
                let changed = store.get_files_needing_update(&relatives)?;
                Ok((summary, changed))
            })
            .await?;
            report.files_removed = summary.files_removed.len();
            report.chunks_removed = summary.chunks_removed;
            changed.into_iter().collect()
        };

        let mut pending = Vec::new();
        let mut chunk_total = 0;
        let mut processed = 0;

        for file in &files {
            if !changed.contains(&file.relative) {
                report.files_unchanged += 1;
                continue;
            }

            match self.chunk_path(&file.relative, &file.path).await {
                Ok(chunks) => {
                    chunk_total += chunks.len();
                    pending.push(PendingFile {
                        path: file.relative.clone(),
                        chunks,
                    });
                    processed += 1;
                    if processed % PROGRESS_EVERY == 0 {
                        info!("Processed {} files, {} chunks", processed, chunk_total);
                    }
                }
                Err(err) => {
                    warn!("Error processing {}: {}", file.relative, err);
                    report.files_failed += 1;
                }
            }
        }

        if pending.is_empty() {
            info!("No chunks to index");
        } else {
            if !force {
                self.remove_pending(&pending).await?;
            }
            report.files_indexed = pending.len();
            report.chunks_indexed = self.embed_and_store(pending).await?;
        }

        report.duration_ms = start.elapsed().as_millis();
        info!(
            "Indexing complete: {} files indexed, {} unchanged, {} failed, {} chunks in {} ms",
            report.files_indexed,
            report.files_unchanged,
            report.files_failed,
            report.chunks_indexed,
            report.duration_ms
        );
        Ok(report)
    }

    /// Read and chunk one file
    async fn chunk_path(&self, relative: &str, path: &Path) -> Result<Vec<Chunk>> {
        let raw = tokio::fs::read(path).await?;
        if is_binary_content(&raw) {
            return Err(EngineError::BinaryFile(relative.to_string()));
        }
        Ok(self.registry.chunk_file(relative, &raw).chunks)
    }

    /// Drop the stored chunks of files about to be re-embedded
    async fn remove_pending(&self, pending: &[PendingFile]) -> Result<usize> {
        let store = Arc::clone(&self.store);
        let paths: Vec<String> = pending.iter().map(|f| f.path.clone()).collect();
        run_blocking(move || {
            let mut removed = 0;
            for path in &paths {
                let count = store.remove_file_chunks(path)?;
                if count > 0 {
                    debug!("Removed {} chunks for {}", count, path);
                }
                removed += count;
            }
            Ok(removed)
        })
        .await
    }

    /// Embed all pending chunks in one pass and commit them to the store
    async fn embed_and_store(&self, pending: Vec<PendingFile>) -> Result<usize> {
        let embedder = self.embedder()?;
        let store = Arc::clone(&self.store);
        let chunks: Vec<Chunk> = pending.into_iter().flat_map(|f| f.chunks).collect();

        info!("Generating embeddings for {} chunks", chunks.len());
        run_blocking(move || {
            let (embeddings, stats) = embedder.embed_chunks(&chunks)?;
            debug!("Embedding used {} batches", stats.batches);
            store.add_chunks(&chunks, &embeddings)
        })
        .await
    }

    /// Resolve a caller path to (absolute, root-relative)
    fn resolve(&self, path: &str) -> Result<(PathBuf, String)> {
        let abs = SymbolReader::new(&self.root, self.search.matcher()).validate_path(path)?;
        let relative = relative_path(&self.root, &abs);
        Ok((abs, relative))
    }

    /// Re-index one file if its content changed, or drop it if deleted
    pub async fn update_file(&self, path: &str) -> Result<UpdateOutcome> {
        self.embedder()?;
        let (abs, relative) = self.resolve(path)?;
        let _guard = self.index_lock.lock().await;

        if !abs.exists() {
            let store = Arc::clone(&self.store);
            let key = relative.clone();
            let chunks_removed = run_blocking(move || store.remove_file_chunks(&key)).await?;
            info!("Removed deleted file from index: {}", relative);
            return Ok(UpdateOutcome::Removed { chunks_removed });
        }

        let store = Arc::clone(&self.store);
        let key = relative.clone();
        if !run_blocking(move || store.has_file_changed(&key)).await? {
            info!("File unchanged (SHA1 match): {}", relative);
            return Ok(UpdateOutcome::Unchanged);
        }

        let chunks = self.chunk_path(&relative, &abs).await?;
        let file_hash = chunks
            .first()
            .map(|c| c.file_hash.clone())
            .unwrap_or_default();

        let pending = vec![PendingFile {
            path: relative.clone(),
            chunks,
        }];
        self.remove_pending(&pending).await?;
        let stored = self.embed_and_store(pending).await?;

        info!(
            "Updated {} chunks for {} (SHA1: {})",
            stored,
            relative,
            hash_prefix(&file_hash)
        );
        Ok(UpdateOutcome::Updated {
            chunks: stored,
            file_hash,
        })
    }

    /// Update many files, embedding only the ones whose SHA1 changed
    pub async fn batch_update_files(&self, paths: &[String]) -> Result<BatchUpdateReport> {
        self.embedder()?;
        let _guard = self.index_lock.lock().await;

        let mut report = BatchUpdateReport::default();
        let mut present = Vec::new();
        let mut deleted = Vec::new();

        for path in paths {
            let (abs, relative) = match self.resolve(path) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!("Skipping {}: {}", path, err);
                    report.failed_files.push(path.clone());
                    continue;
                }
            };
            if abs.exists() {
                present.push((abs, relative));
            } else {
                deleted.push(relative);
            }
        }
        report.removed_files = deleted.len();

        let store = Arc::clone(&self.store);
        let relatives: Vec<String> = present.iter().map(|(_, r)| r.clone()).collect();
        let changed: HashSet<String> = run_blocking(move || {
            for path in &deleted {
                store.remove_file_chunks(path)?;
            }
            store.get_files_needing_update(&relatives)
        })
        .await?
        .into_iter()
        .collect();
        report.skipped_files = present.len() - changed.len();

        if changed.is_empty() {
            info!("All {} files up to date (SHA1 unchanged)", present.len());
            return Ok(report);
        }

        info!(
            "Updating {} changed files out of {} total",
            changed.len(),
            paths.len()
        );

        let mut pending = Vec::new();
        for (abs, relative) in present.into_iter().filter(|(_, r)| changed.contains(r)) {
            match self.chunk_path(&relative, &abs).await {
                Ok(chunks) => pending.push(PendingFile {
                    path: relative,
                    chunks,
                }),
                Err(err) => {
                    warn!("Error updating {}: {}", relative, err);
                    report.failed_files.push(relative);
                }
            }
        }

        report.updated_files = pending.len();
        if !pending.is_empty() {
            self.remove_pending(&pending).await?;
            report.total_chunks = self.embed_and_store(pending).await?;
        }

        info!(
            "Updated {} files with {} chunks",
            report.updated_files, report.total_chunks
        );
        Ok(report)
    }

    /// Remove chunks of files deleted outside the indexing pipeline
    pub async fn cleanup_index(&self) -> Result<CleanupReport> {
        let _guard = self.index_lock.lock().await;

        let existing: HashSet<String> =
            FileWalker::new(&self.root, Arc::clone(&self.filter), &self.config)
                .walk_relative()?
                .into_iter()
                .collect();

        let store = Arc::clone(&self.store);
        let existing_files = existing.len();
        let summary = run_blocking(move || store.cleanup_deleted_files(&existing)).await?;

        info!(
            "Cleaned up {} chunks from {} deleted files",
            summary.chunks_removed,
            summary.files_removed.len()
        );
        Ok(CleanupReport {
            removed_files: summary.files_removed,
            removed_chunks: summary.chunks_removed,
            existing_files,
        })
    }

    /// Drop orphaned vectors by rebuilding the index from live chunks
    pub async fn compact_index(&self) -> Result<CompactReport> {
        let _guard = self.index_lock.lock().await;
        let store = Arc::clone(&self.store);
        run_blocking(move || store.compact()).await
    }

    /// Serve a request in any mode
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        request.validate()?;

        match request.mode {
            SearchMode::Semantic => self.semantic_search(request).await,
            _ => {
                let search = Arc::clone(&self.search);
                let store = Arc::clone(&self.store);
                let request = request.clone();
                run_blocking(move || search.search(&store, &request)).await
            }
        }
    }

    async fn semantic_search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let embedder = self.embedder()?;
        let store = Arc::clone(&self.store);
        let request = request.clone();

        let hits = run_blocking(move || {
            let query = embedder.embed_query(&request.query)?;
            store.search(&query, request.max_results, request.file_pattern.as_deref())
        })
        .await?;

        Ok(hits
            .iter()
            .map(|hit| SearchResult::from_chunk(&hit.chunk, hit.score))
            .collect())
    }

    /// Live symbol table of one file
    pub async fn list_symbols_in_file(&self, path: &str) -> Result<FileSymbols> {
        let search = Arc::clone(&self.search);
        let path = path.to_string();
        run_blocking(move || search.list_symbols_in_file(&path)).await
    }

    /// Read a symbol, a line range or a whole file
    pub async fn read_symbol_content(&self, request: &ReadRequest) -> Result<SymbolContent> {
        let search = Arc::clone(&self.search);
        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let request = request.clone();
        run_blocking(move || {
            SymbolReader::new(&root, search.matcher()).read(&request, store.as_ref())
        })
        .await
    }

    pub fn get_stats(&self) -> Result<EngineStats> {
        let status = self.status();
        Ok(EngineStats {
            store: self.store.get_stats()?,
            initialized: status == IndexingStatus::Ready,
            status,
            working_directory: self.root.display().to_string(),
            model: self.model_name.clone(),
            chunkers: self.registry.len(),
            supported_search_modes: SearchMode::ALL.to_vec(),
        })
    }

    /// Stats plus the most recently indexed files
    pub fn get_indexing_status(&self) -> Result<IndexingStatusReport> {
        let files = self.store.get_indexed_files()?;
        Ok(IndexingStatusReport {
            stats: self.get_stats()?,
            indexed_files: files.len(),
            indexed_file_details: files
                .iter()
                .take(STATUS_FILE_LIMIT)
                .map(|f| IndexedFileSummary {
                    file: f.file_path.clone(),
                    hash: hash_prefix(&f.file_hash).to_string(),
                    chunks: f.chunk_count,
                })
                .collect(),
        })
    }
}

fn hash_prefix(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

/// Run blocking work (embedding, LMDB, filesystem scans) off the async runtime
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::Internal(format!("Blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct ConstantEmbedder {
        dims: usize,
    }

    impl Embedder for ConstantEmbedder {
        fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; self.dims]).collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    fn loader(dims: usize) -> EmbedderLoader {
        Arc::new(move || -> anyhow::Result<Arc<dyn Embedder>> {
            Ok(Arc::new(ConstantEmbedder { dims }))
        })
    }

    #[tokio::test]
    async fn test_not_ready_before_initialize() {
        let dir = TempDir::new().unwrap();
        let engine = SearchEngine::with_loader(dir.path(), Config::default(), loader(384)).unwrap();

        assert_eq!(engine.status(), IndexingStatus::Uninitialized);
        assert!(matches!(
            engine.index_codebase(false).await,
            Err(EngineError::NotReady)
        ));
        assert!(matches!(
            engine.search(&SearchRequest::new("x", SearchMode::Semantic)).await,
            Err(EngineError::NotReady)
        ));
        // Non-embedding modes work without a backend
        assert!(engine
            .search(&SearchRequest::new("x", SearchMode::FuzzySymbol))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_backend_leaves_engine_uninitialized() {
        let dir = TempDir::new().unwrap();
        let failing: EmbedderLoader = Arc::new(|| -> anyhow::Result<Arc<dyn Embedder>> {
            Err(anyhow::anyhow!("model download failed"))
        });
        let engine = SearchEngine::with_loader(dir.path(), Config::default(), failing).unwrap();

        assert!(matches!(
            engine.initialize().await,
            Err(EngineError::BackendUnavailable(_))
        ));
        assert_eq!(engine.status(), IndexingStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = SearchEngine::with_loader(dir.path(), Config::default(), loader(8)).unwrap();
        assert!(matches!(
            engine.initialize().await,
            Err(EngineError::DimensionMismatch { expected: 384, actual: 8 })
        ));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
        let engine = SearchEngine::with_loader(dir.path(), Config::default(), loader(384)).unwrap();

        engine.initialize().await.unwrap();
        let first = engine.get_stats().unwrap();
        engine.initialize().await.unwrap();
        let second = engine.get_stats().unwrap();

        assert!(first.initialized);
        assert_eq!(first.store.vector_count, second.store.vector_count);
        assert_eq!(first.store.total_files, 1);
    }

    #[test]
    fn test_hash_prefix() {
        assert_eq!(hash_prefix("0123456789abcdef"), "01234567");
        assert_eq!(hash_prefix("abc"), "abc");
    }
}
