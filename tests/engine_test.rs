use codescope::embed::Embedder;
use codescope::engine::EmbedderLoader;
use codescope::{
    Config, EngineError, IndexingStatus, ReadRequest, SearchEngine, SearchMode, SearchRequest,
    UpdateOutcome,
};
use pretty_assertions::assert_eq;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const DIMS: usize = 384;

/// Bag-of-tokens embedder: each lowercase word bumps one hashed bucket
struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| embed_text(text)).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_name(&self) -> &str {
        "hashing-test"
    }
}

fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIMS as u64) as usize] += 1.0;
    }
    vector
}

fn loader() -> EmbedderLoader {
    Arc::new(|| -> anyhow::Result<Arc<dyn Embedder>> { Ok(Arc::new(HashingEmbedder)) })
}

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(full, content).unwrap();
}

fn two_file_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.py", "def foo():\n    return 1\n");
    write(
        dir.path(),
        "b.py",
        "class Bar:\n    \"\"\"A bar.\"\"\"\n\n    def run(self):\n        pass\n",
    );
    dir
}

async fn ready_engine(dir: &TempDir) -> SearchEngine {
    let engine = SearchEngine::with_loader(dir.path(), Config::default(), loader()).unwrap();
    engine.initialize().await.unwrap();
    engine
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;
    assert_eq!(engine.status(), IndexingStatus::Ready);

    let exact = engine
        .search(&SearchRequest::new("foo", SearchMode::SymbolExact))
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].file_path, "a.py");
    assert_eq!(exact[0].symbol_name.as_deref(), Some("foo"));
    assert_eq!(exact[0].chunk_type, "function");

    let fuzzy = engine
        .search(&SearchRequest::new("Bar", SearchMode::FuzzySymbol).with_min_score(0.5))
        .await
        .unwrap();
    assert_eq!(fuzzy[0].file_path, "b.py");
    assert_eq!(fuzzy[0].symbol_name.as_deref(), Some("Bar"));
    assert_eq!(fuzzy[0].relevance_score, 1.0);

    fs::remove_file(dir.path().join("a.py")).unwrap();
    let cleanup = engine.cleanup_index().await.unwrap();
    assert_eq!(cleanup.removed_files, vec!["a.py".to_string()]);
    assert_eq!(cleanup.removed_chunks, 2);

    assert!(engine
        .search(&SearchRequest::new("foo", SearchMode::SymbolExact))
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        engine.list_symbols_in_file("a.py").await,
        Err(EngineError::FileNotFound(_))
    ));
}

#[tokio::test]
async fn test_semantic_search_prefers_matching_file() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;

    let results = engine
        .search(&SearchRequest::new("foo", SearchMode::Semantic).with_max_results(3))
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].file_path, "a.py");
    assert!(results.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));

    let filtered = engine
        .search(
            &SearchRequest::new("foo", SearchMode::Semantic)
                .with_max_results(5)
                .with_file_pattern("b.py"),
        )
        .await
        .unwrap();
    assert!(filtered.iter().all(|r| r.file_path == "b.py"));
}

#[tokio::test]
async fn test_update_is_idempotent_and_detects_changes() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;
    let hash_before = engine.store().get_file_hash("b.py").unwrap().unwrap();

    assert_eq!(engine.update_file("b.py").await.unwrap(), UpdateOutcome::Unchanged);
    assert_eq!(engine.update_file("b.py").await.unwrap(), UpdateOutcome::Unchanged);

    write(dir.path(), "b.py", "class Bar:\n    def stop(self):\n        pass\n");
    let changed = engine
        .store()
        .get_files_needing_update(&["a.py".to_string(), "b.py".to_string()])
        .unwrap();
    assert_eq!(changed, vec!["b.py".to_string()]);

    match engine.update_file("b.py").await.unwrap() {
        UpdateOutcome::Updated { chunks, file_hash } => {
            assert_eq!(chunks, 3);
            assert_ne!(file_hash, hash_before);
        }
        other => panic!("expected an update, got {:?}", other),
    }

    let names: Vec<String> = engine
        .search(&SearchRequest::new("stop", SearchMode::SymbolExact))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| r.symbol_name)
        .collect();
    assert_eq!(names, vec!["stop".to_string()]);
    assert!(engine
        .search(&SearchRequest::new("run", SearchMode::SymbolExact))
        .await
        .unwrap()
        .is_empty());

    let status = engine.get_indexing_status().unwrap();
    let tracked: usize = status.indexed_file_details.iter().map(|f| f.chunks).sum();
    assert_eq!(tracked, status.stats.store.total_chunks);
    let b = status
        .indexed_file_details
        .iter()
        .find(|f| f.file == "b.py")
        .unwrap();
    assert_eq!(b.chunks, 3);
}

#[tokio::test]
async fn test_deleted_file_leaves_orphaned_vectors_until_compaction() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;
    let before = engine.get_stats().unwrap();

    fs::remove_file(dir.path().join("a.py")).unwrap();
    match engine.update_file("a.py").await.unwrap() {
        UpdateOutcome::Removed { chunks_removed } => assert_eq!(chunks_removed, 2),
        other => panic!("expected removal, got {:?}", other),
    }

    let after = engine.get_stats().unwrap();
    assert_eq!(after.store.vector_count, before.store.vector_count);
    assert_eq!(after.store.orphaned_vectors(), 2);
    assert_eq!(after.store.total_files, 1);

    let semantic = engine
        .search(&SearchRequest::new("foo", SearchMode::Semantic).with_max_results(10))
        .await
        .unwrap();
    assert!(semantic.iter().all(|r| r.file_path != "a.py"));

    let report = engine.compact_index().await.unwrap();
    assert_eq!(report.vectors_before, before.store.vector_count);
    assert_eq!(report.vectors_after, after.store.total_chunks);
    assert_eq!(engine.get_stats().unwrap().store.orphaned_vectors(), 0);

    let fuzzy = engine
        .search(&SearchRequest::new("Bar", SearchMode::FuzzySymbol))
        .await
        .unwrap();
    assert_eq!(fuzzy[0].symbol_name.as_deref(), Some("Bar"));
}

#[tokio::test]
async fn test_batch_update_only_embeds_changed_files() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;

    write(dir.path(), "a.py", "def foo():\n    return 2\n\ndef helper():\n    pass\n");
    write(dir.path(), "c.py", "def fresh():\n    pass\n");

    let report = engine
        .batch_update_files(&["a.py".to_string(), "b.py".to_string(), "c.py".to_string()])
        .await
        .unwrap();

    assert_eq!(report.updated_files, 2);
    assert_eq!(report.skipped_files, 1);
    assert!(report.failed_files.is_empty());
    assert_eq!(report.total_chunks, 3 + 2);

    let again = engine
        .batch_update_files(&["a.py".to_string(), "c.py".to_string()])
        .await
        .unwrap();
    assert_eq!(again.updated_files, 0);
    assert_eq!(again.skipped_files, 2);
}

#[tokio::test]
async fn test_incremental_and_forced_indexing() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;

    let incremental = engine.index_codebase(false).await.unwrap();
    assert_eq!(incremental.files_unchanged, 2);
    assert_eq!(incremental.files_indexed, 0);

    write(dir.path(), "web/app.ts", "export function greet(name: string) {\n  return name;\n}\n");
    let incremental = engine.index_codebase(false).await.unwrap();
    assert_eq!(incremental.files_indexed, 1);
    assert_eq!(incremental.files_unchanged, 2);

    let forced = engine.index_codebase(true).await.unwrap();
    assert!(forced.forced);
    assert_eq!(forced.files_indexed, 3);

    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.store.vector_count, stats.store.total_chunks);
    assert_eq!(stats.store.tracked_files, 3);

    let status = engine.get_indexing_status().unwrap();
    assert_eq!(status.indexed_files, 3);
    assert!(status.indexed_file_details.iter().all(|f| f.hash.len() == 8));
}

#[tokio::test]
async fn test_binary_source_file_counts_as_failed() {
    let dir = two_file_project();
    fs::write(dir.path().join("blob.py"), [0u8, 159, 146, 150, 0, 1]).unwrap();
    let engine = ready_engine(&dir).await;

    let forced = engine.index_codebase(true).await.unwrap();
    assert_eq!(forced.files_seen, 3);
    assert_eq!(forced.files_failed, 1);
    assert_eq!(forced.files_indexed, 2);

    let incremental = engine.index_codebase(false).await.unwrap();
    assert_eq!(incremental.files_unchanged, 2);
    assert_eq!(incremental.files_failed, 1);
    assert_eq!(incremental.files_indexed, 0);

    let exact = engine
        .search(&SearchRequest::new("foo", SearchMode::SymbolExact))
        .await
        .unwrap();
    assert_eq!(exact[0].file_path, "a.py");
    assert_eq!(engine.get_stats().unwrap().store.tracked_files, 2);
}

#[tokio::test]
async fn test_read_symbol_content_modes() {
    let dir = two_file_project();
    let engine = ready_engine(&dir).await;

    let symbol = engine
        .read_symbol_content(&ReadRequest::symbol("b.py", "Bar"))
        .await
        .unwrap();
    assert_eq!(symbol.mode, "symbol_db_class");
    assert_eq!(symbol.line_range.start, 1);
    assert_eq!(symbol.line_range.end, 5);
    assert!(symbol.content.contains("class Bar:"));

    let range = engine
        .read_symbol_content(&ReadRequest::range("a.py", 2, 2))
        .await
        .unwrap();
    assert_eq!(range.mode, "line_range");
    assert!(range.content.contains("return 1"));

    let conflicting = ReadRequest {
        start_line: Some(1),
        end_line: Some(2),
        ..ReadRequest::symbol("a.py", "foo")
    };
    assert!(matches!(
        engine.read_symbol_content(&conflicting).await,
        Err(EngineError::InvalidQuery(_))
    ));
    assert!(matches!(
        engine
            .read_symbol_content(&ReadRequest::whole_file("../escape.py"))
            .await,
        Err(EngineError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_text_search_over_working_tree() {
    let dir = two_file_project();
    write(dir.path(), "node_modules/dep/index.js", "def foo(): vendored\n");
    let engine = SearchEngine::with_loader(dir.path(), Config::default(), loader()).unwrap();

    let results = engine
        .search(&SearchRequest::new("def ", SearchMode::Text).with_file_pattern("*.py"))
        .await
        .unwrap();

    let hits: Vec<(String, usize)> = results
        .iter()
        .map(|r| (r.file_path.clone(), r.line_start))
        .collect();
    assert_eq!(hits, vec![("a.py".to_string(), 1), ("b.py".to_string(), 4)]);
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let dir = two_file_project();
    let chunks = {
        let engine = ready_engine(&dir).await;
        engine.get_stats().unwrap().store.total_chunks
    };

    let engine = ready_engine(&dir).await;
    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.store.total_chunks, chunks);
    assert_eq!(stats.store.vector_count, chunks);
}
