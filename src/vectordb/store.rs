use super::index::FlatIndex;
use crate::chunker::{compute_file_hash, Chunk};
use crate::error::{EngineError, Result};
use crate::symbols::SymbolIndex;
use chrono::{DateTime, Utc};
use heed::byteorder::BigEndian;
use heed::types::*;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

const METADATA_DIR: &str = "metadata";
const INDEX_FILE: &str = "vectors.idx";
/// LMDB's default maximum key size
const MAX_KEY_BYTES: usize = 511;

/// Chunk row stored in the metadata database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    /// Row of this chunk's embedding in the vector index
    pub embedding_row: Option<u32>,
}

/// Per-file change-detection record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHashRecord {
    pub file_path: String,
    pub file_hash: String,
    pub chunk_ids: Vec<String>,
    pub last_indexed: DateTime<Utc>,
}

/// A chunk resolved from a vector hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Summary of a tracked file
#[derive(Debug, Clone, Serialize)]
pub struct IndexedFile {
    pub file_path: String,
    pub file_hash: String,
    pub chunk_count: usize,
    pub last_indexed: DateTime<Utc>,
}

/// Outcome of removing files that no longer exist on disk
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupSummary {
    pub files_removed: Vec<String>,
    pub chunks_removed: usize,
}

/// Statistics about the vector store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    /// Distinct file paths among stored chunks
    pub total_files: usize,
    /// Files with a change-detection record
    pub tracked_files: usize,
    /// Rows in the vector index, including orphaned ones
    pub vector_count: usize,
    /// Rows still referenced by a chunk
    pub live_vectors: usize,
    pub dimensions: usize,
}

/// Key of a file record; paths too long for LMDB are keyed by their SHA-256
fn file_key(path: &str) -> Cow<'_, str> {
    if path.len() <= MAX_KEY_BYTES {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("sha256:{:x}", Sha256::digest(path.as_bytes())))
    }
}

impl StoreStats {
    pub fn orphaned_vectors(&self) -> usize {
        self.vector_count.saturating_sub(self.live_vectors)
    }
}

/// Row counts before and after a compaction
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CompactReport {
    pub vectors_before: usize,
    pub vectors_after: usize,
}

/// Hybrid store: append-only embedding index plus LMDB metadata
///
/// Layout under the data directory:
/// - `metadata/`  LMDB environment with `chunks`, `rows` and `files` databases
/// - `vectors.idx` the flat embedding index
///
/// Metadata is always committed before the index is persisted, so a crash
/// can leave unreferenced index rows but never a chunk pointing at a missing row.
pub struct VectorStore {
    root: PathBuf,
    env: Env,
    chunks: Database<Str, SerdeBincode<ChunkRecord>>,
    rows: Database<U32<BigEndian>, Str>,
    files: Database<Str, SerdeBincode<FileHashRecord>>,
    index: RwLock<FlatIndex>,
    dimensions: usize,
}

impl VectorStore {
    /// Open or create the store in `data_dir`
    ///
    /// `root` is the indexed project root; file paths in the store are
    /// relative to it.
    pub fn open(root: &Path, data_dir: &Path, dimensions: usize) -> Result<Self> {
        info!("Opening vector store at: {}", data_dir.display());

        let db_path = data_dir.join(METADATA_DIR);
        std::fs::create_dir_all(&db_path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(10 * 1024 * 1024 * 1024) // 10GB max
                .max_dbs(10)
                .open(&db_path)?
        };

        let mut wtxn = env.write_txn()?;
        let chunks: Database<Str, SerdeBincode<ChunkRecord>> =
            env.create_database(&mut wtxn, Some("chunks"))?;
        let rows: Database<U32<BigEndian>, Str> = env.create_database(&mut wtxn, Some("rows"))?;
        let files: Database<Str, SerdeBincode<FileHashRecord>> =
            env.create_database(&mut wtxn, Some("files"))?;
        let chunk_count = chunks.len(&wtxn)?;
        wtxn.commit()?;

        let index = FlatIndex::open(&data_dir.join(INDEX_FILE), dimensions)?;

        info!(
            "Vector store opened ({} chunks, {} vectors)",
            chunk_count,
            index.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            env,
            chunks,
            rows,
            files,
            index: RwLock::new(index),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, FlatIndex>> {
        self.index
            .read()
            .map_err(|_| EngineError::Internal("Vector index lock poisoned".to_string()))
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, FlatIndex>> {
        self.index
            .write()
            .map_err(|_| EngineError::Internal("Vector index lock poisoned".to_string()))
    }

    /// Store chunks with their embeddings (paired by position)
    ///
    /// Re-adding an existing chunk id replaces its record; the old vector
    /// row becomes orphaned. A file whose hash changed has its previous
    /// chunks replaced; otherwise new chunk ids are merged into its record.
    pub fn add_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(EngineError::Internal(format!(
                "Got {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut index = self.write_index()?;
        let rows = index.add(embeddings)?;

        let mut wtxn = self.env.write_txn()?;
        let mut per_file: BTreeMap<&str, (&str, Vec<&str>)> = BTreeMap::new();

        for (chunk, &row) in chunks.iter().zip(rows.iter()) {
            if let Some(previous) = self.chunks.get(&wtxn, &chunk.chunk_id)? {
                if let Some(old_row) = previous.embedding_row {
                    self.unlink_row(&mut wtxn, old_row, &chunk.chunk_id)?;
                }
            }

            let record = ChunkRecord {
                chunk: chunk.clone(),
                embedding_row: Some(row),
            };
            self.chunks.put(&mut wtxn, &chunk.chunk_id, &record)?;
            self.rows.put(&mut wtxn, &row, &chunk.chunk_id)?;

            per_file
                .entry(chunk.file_path.as_str())
                .or_insert_with(|| (chunk.file_hash.as_str(), Vec::new()))
                .1
                .push(chunk.chunk_id.as_str());
        }

        let now = Utc::now();
        for (path, (file_hash, ids)) in per_file {
            let key = file_key(path);
            let mut chunk_ids = Vec::with_capacity(ids.len());

            if let Some(previous) = self.files.get(&wtxn, &key)? {
                if previous.file_hash == file_hash {
                    chunk_ids = previous.chunk_ids;
                } else {
                    for stale in previous.chunk_ids.iter().filter(|id| !ids.contains(&id.as_str())) {
                        self.remove_chunk_in(&mut wtxn, stale)?;
                    }
                }
            }
            for id in ids {
                if !chunk_ids.iter().any(|existing| existing == id) {
                    chunk_ids.push(id.to_string());
                }
            }

            let record = FileHashRecord {
                file_path: path.to_string(),
                file_hash: file_hash.to_string(),
                chunk_ids,
                last_indexed: now,
            };
            self.files.put(&mut wtxn, &key, &record)?;
        }

        wtxn.commit()?;
        index.persist()?;

        debug!("Stored {} chunks (index now {} rows)", chunks.len(), index.len());
        Ok(chunks.len())
    }

    /// Delete the row mapping only if it still belongs to `chunk_id`
    fn unlink_row(&self, wtxn: &mut RwTxn, row: u32, chunk_id: &str) -> Result<()> {
        let owned = self.rows.get(wtxn, &row)? == Some(chunk_id);
        if owned {
            self.rows.delete(wtxn, &row)?;
        }
        Ok(())
    }

    /// Nearest chunks to `query`, optionally restricted to paths containing `file_pattern`
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        file_pattern: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let index = self.read_index()?;
        let hits = index.search(query, top_k.saturating_mul(2))?;

        let rtxn = self.env.read_txn()?;
        let mut results = Vec::with_capacity(top_k);

        for (row, score) in hits {
            let Some(chunk_id) = self.rows.get(&rtxn, &row)? else {
                continue;
            };
            let Some(record) = self.chunks.get(&rtxn, chunk_id)? else {
                continue;
            };
            if record.embedding_row != Some(row) {
                continue;
            }
            if let Some(pattern) = file_pattern {
                if !record.chunk.file_path.contains(pattern) {
                    continue;
                }
            }

            results.push(ScoredChunk {
                chunk: record.chunk,
                score,
            });
            if results.len() >= top_k {
                break;
            }
        }

        Ok(results)
    }

    /// Remove every chunk and the change record of a file
    ///
    /// Vector rows are left in place as orphans. Returns the number of
    /// chunks removed.
    pub fn remove_file_chunks(&self, file_path: &str) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.remove_file_in(&mut wtxn, file_path)?;
        wtxn.commit()?;

        if removed > 0 {
            debug!("Removed {} chunks for {}", removed, file_path);
        }
        Ok(removed)
    }

    /// Every stored chunk is listed in its file's record, so removal only
    /// follows that list.
    fn remove_file_in(&self, wtxn: &mut RwTxn, file_path: &str) -> Result<usize> {
        let key = file_key(file_path);
        let Some(record) = self.files.get(wtxn, &key)? else {
            return Ok(0);
        };

        let mut removed = 0;
        for chunk_id in &record.chunk_ids {
            if self.remove_chunk_in(wtxn, chunk_id)? {
                removed += 1;
            }
        }

        self.files.delete(wtxn, &key)?;
        Ok(removed)
    }

    fn remove_chunk_in(&self, wtxn: &mut RwTxn, chunk_id: &str) -> Result<bool> {
        let Some(record) = self.chunks.get(wtxn, chunk_id)? else {
            return Ok(false);
        };
        if let Some(row) = record.embedding_row {
            self.unlink_row(wtxn, row, chunk_id)?;
        }
        self.chunks.delete(wtxn, chunk_id)?;
        Ok(true)
    }

    /// Stored SHA1 of a file, if it has been indexed
    pub fn get_file_hash(&self, file_path: &str) -> Result<Option<String>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.files.get(&rtxn, &file_key(file_path))?.map(|r| r.file_hash))
    }

    /// Whether the file's current bytes differ from the indexed hash
    ///
    /// Unknown files and unreadable files count as changed.
    pub fn has_file_changed(&self, file_path: &str) -> Result<bool> {
        let Some(stored) = self.get_file_hash(file_path)? else {
            return Ok(true);
        };

        match std::fs::read(self.root.join(file_path)) {
            Ok(bytes) => Ok(compute_file_hash(&bytes) != stored),
            Err(_) => Ok(true),
        }
    }

    /// Subset of `paths` whose content changed since indexing
    pub fn get_files_needing_update(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        for path in paths {
            if self.has_file_changed(path)? {
                changed.push(path.clone());
            }
        }
        Ok(changed)
    }

    /// Tracked files, most recently indexed first
    pub fn get_indexed_files(&self) -> Result<Vec<IndexedFile>> {
        let rtxn = self.env.read_txn()?;
        let mut files = Vec::new();
        for result in self.files.iter(&rtxn)? {
            let (_, record) = result?;
            files.push(IndexedFile {
                file_path: record.file_path,
                file_hash: record.file_hash,
                chunk_count: record.chunk_ids.len(),
                last_indexed: record.last_indexed,
            });
        }
        files.sort_by(|a, b| {
            b.last_indexed
                .cmp(&a.last_indexed)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        Ok(files)
    }

    /// Drop every tracked file that is not in `existing`
    pub fn cleanup_deleted_files(&self, existing: &HashSet<String>) -> Result<CleanupSummary> {
        let mut stale: HashSet<String> = HashSet::new();
        {
            let rtxn = self.env.read_txn()?;
            for result in self.files.iter(&rtxn)? {
                let (_, record) = result?;
                if !existing.contains(&record.file_path) {
                    stale.insert(record.file_path);
                }
            }
        }

        let mut summary = CleanupSummary::default();
        if stale.is_empty() {
            return Ok(summary);
        }

        let mut stale: Vec<String> = stale.into_iter().collect();
        stale.sort();

        let mut wtxn = self.env.write_txn()?;
        for path in stale {
            summary.chunks_removed += self.remove_file_in(&mut wtxn, &path)?;
            summary.files_removed.push(path);
        }
        wtxn.commit()?;

        info!(
            "Cleaned up {} deleted files ({} chunks)",
            summary.files_removed.len(),
            summary.chunks_removed
        );
        Ok(summary)
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let rtxn = self.env.read_txn()?;
        Ok(self.chunks.len(&rtxn)? as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.chunk_count()? == 0)
    }

    /// All chunks that name a declaration (function, class, interface)
    pub fn symbol_chunks(&self) -> Result<Vec<Chunk>> {
        self.collect_chunks(|chunk| chunk.kind.is_symbol() && chunk.symbol_name.is_some())
    }

    fn collect_chunks<F: Fn(&Chunk) -> bool>(&self, keep: F) -> Result<Vec<Chunk>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for result in self.chunks.iter(&rtxn)? {
            let (_, record) = result?;
            if keep(&record.chunk) {
                out.push(record.chunk);
            }
        }
        Ok(out)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let index = self.read_index()?;
        let rtxn = self.env.read_txn()?;

        let total_chunks = self.chunks.len(&rtxn)? as usize;
        let mut unique_files = HashSet::new();
        for result in self.chunks.iter(&rtxn)? {
            let (_, record) = result?;
            unique_files.insert(record.chunk.file_path);
        }

        Ok(StoreStats {
            total_chunks,
            total_files: unique_files.len(),
            tracked_files: self.files.len(&rtxn)? as usize,
            vector_count: index.len(),
            live_vectors: self.live_rows(&rtxn)?.len(),
            dimensions: self.dimensions,
        })
    }

    /// Rows referenced by a chunk record, with the owning chunk id
    fn live_rows(&self, rtxn: &RoTxn) -> Result<Vec<(u32, String)>> {
        let mut live = Vec::new();
        for result in self.rows.iter(rtxn)? {
            let (row, chunk_id) = result?;
            if let Some(record) = self.chunks.get(rtxn, chunk_id)? {
                if record.embedding_row == Some(row) {
                    live.push((row, chunk_id.to_string()));
                }
            }
        }
        Ok(live)
    }

    /// Remove everything: chunks, file records and vectors
    pub fn clear(&self) -> Result<()> {
        info!("Clearing vector store...");

        let mut index = self.write_index()?;
        let mut wtxn = self.env.write_txn()?;
        self.chunks.clear(&mut wtxn)?;
        self.rows.clear(&mut wtxn)?;
        self.files.clear(&mut wtxn)?;
        wtxn.commit()?;

        index.clear();
        index.persist()?;

        info!("Vector store cleared");
        Ok(())
    }

    /// Rebuild the vector index from live rows only, renumbering chunks
    ///
    /// Metadata is rewritten first; the in-memory index is only rebuilt once
    /// that commit succeeds.
    pub fn compact(&self) -> Result<CompactReport> {
        let mut index = self.write_index()?;
        let vectors_before = index.len();

        let live: Vec<(u32, String)> = {
            let rtxn = self.env.read_txn()?;
            self.live_rows(&rtxn)?
                .into_iter()
                .filter(|(row, _)| index.vector(*row).is_some())
                .collect()
        };

        let mut wtxn = self.env.write_txn()?;
        self.rows.clear(&mut wtxn)?;
        for (new_row, (_, chunk_id)) in live.iter().enumerate() {
            let new_row = new_row as u32;
            if let Some(mut record) = self.chunks.get(&wtxn, chunk_id)? {
                record.embedding_row = Some(new_row);
                self.chunks.put(&mut wtxn, chunk_id, &record)?;
                self.rows.put(&mut wtxn, &new_row, chunk_id)?;
            }
        }
        wtxn.commit()?;

        let keep: Vec<u32> = live.iter().map(|(row, _)| *row).collect();
        index.rebuild(&keep);
        index.persist()?;

        let report = CompactReport {
            vectors_before,
            vectors_after: index.len(),
        };
        info!(
            "Compacted vector index: {} -> {} rows",
            report.vectors_before, report.vectors_after
        );
        Ok(report)
    }
}

impl SymbolIndex for VectorStore {
    fn find_symbol(&self, symbol: &str, file_path: &str) -> Result<Vec<Chunk>> {
        let rtxn = self.env.read_txn()?;
        let Some(file) = self.files.get(&rtxn, &file_key(file_path))? else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for chunk_id in &file.chunk_ids {
            if let Some(record) = self.chunks.get(&rtxn, chunk_id)? {
                if record.chunk.symbol_name.as_deref() == Some(symbol) {
                    found.push(record.chunk);
                }
            }
        }
        found.sort_by_key(|c| c.line_start);
        Ok(found)
    }
}
