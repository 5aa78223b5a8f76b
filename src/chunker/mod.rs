use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

mod fallback;
mod javascript;
mod parser;
mod python;

pub use fallback::FallbackChunker;
pub use javascript::JsChunker;
pub use parser::CodeParser;
pub use python::PythonChunker;

/// Synthetic symbol name carried by file overview chunks
pub const FILE_OVERVIEW_SYMBOL: &str = "file_overview";

/// Represents a chunk of code with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from (file_path, symbol_name, line_start)
    pub chunk_id: String,

    /// File path relative to the indexed root
    pub file_path: String,

    pub kind: ChunkKind,

    pub symbol_name: Option<String>,

    /// Starting line number (1-indexed, inclusive)
    pub line_start: usize,

    /// Ending line number (1-indexed, inclusive)
    pub line_end: usize,

    /// Extracted source text, or a serialized summary for overview/class chunks
    pub content: String,

    /// Function/class signature (if applicable)
    pub signature: Option<String>,

    /// Extracted docstring/documentation comment
    pub docstring: Option<String>,

    /// SHA1 of the whole source file this chunk came from
    pub file_hash: String,
}

impl Chunk {
    /// Create a chunk; the id is derived from path, symbol and start line
    pub fn new(
        file_path: &str,
        kind: ChunkKind,
        symbol_name: Option<String>,
        line_start: usize,
        line_end: usize,
        content: String,
    ) -> Self {
        let chunk_id = generate_chunk_id(file_path, symbol_name.as_deref(), line_start);
        Self {
            chunk_id,
            file_path: file_path.to_string(),
            kind,
            symbol_name,
            line_start,
            line_end: line_end.max(line_start),
            content,
            signature: None,
            docstring: None,
            file_hash: String::new(),
        }
    }

    pub fn with_signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_docstring(mut self, docstring: Option<String>) -> Self {
        self.docstring = docstring;
        self
    }

    /// Error chunk standing in for a file that could not be parsed
    pub fn error(file_path: &str, symbol: &str, message: String) -> Self {
        Self::new(file_path, ChunkKind::Error, Some(symbol.to_string()), 1, 1, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    FileOverview,
    Function,
    Class,
    Interface,
    Error,
    File,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileOverview => "file_overview",
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Error => "error",
            Self::File => "file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file_overview" => Some(Self::FileOverview),
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "error" => Some(Self::Error),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    /// Kinds that represent a named declaration
    pub fn is_symbol(&self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Interface)
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for chunking strategies
pub trait Chunker: Send + Sync {
    /// Short name used in logs and stats
    fn name(&self) -> &'static str;

    /// Extensions (without dot) this chunker is registered for
    fn extensions(&self) -> &[&'static str];

    /// Chunk a file into semantic pieces
    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>>;
}

/// Deterministic chunk id: SHA-256 of `path:symbol:line`, truncated to 32 hex chars
pub fn generate_chunk_id(file_path: &str, symbol_name: Option<&str>, line_start: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", file_path, symbol_name.unwrap_or(""), line_start).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

/// SHA1 of raw file bytes, hex encoded
pub fn compute_file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Lines `start..=end` (1-indexed) of `content`
pub(crate) fn extract_lines(content: &str, start: usize, end: usize) -> String {
    content
        .split('\n')
        .skip(start.saturating_sub(1))
        .take((end + 1).saturating_sub(start.max(1)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number of lines as counted by splitting on `\n`
pub(crate) fn total_lines(content: &str) -> usize {
    content.split('\n').count()
}

/// Chunks produced for one file in one pass
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    pub file_hash: String,
    pub chunks: Vec<Chunk>,
}

/// Maps file extensions to chunkers, with an explicit whole-file fallback
pub struct ChunkerRegistry {
    by_extension: HashMap<String, Arc<dyn Chunker>>,
    fallback: FallbackChunker,
    registered: usize,
}

impl ChunkerRegistry {
    /// Registry with the Python and JS/TS chunkers
    pub fn new(fallback_chars: usize) -> Result<Self> {
        let mut registry = Self {
            by_extension: HashMap::new(),
            fallback: FallbackChunker::new(fallback_chars),
            registered: 0,
        };
        registry.register(Arc::new(PythonChunker::new()));
        registry.register(Arc::new(JsChunker::new()?));
        Ok(registry)
    }

    pub fn register(&mut self, chunker: Arc<dyn Chunker>) {
        for ext in chunker.extensions() {
            self.by_extension.insert(ext.to_string(), Arc::clone(&chunker));
        }
        self.registered += 1;
    }

    /// Number of chunkers including the fallback
    pub fn len(&self) -> usize {
        self.registered + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Select the chunker for a path
    pub fn chunker_for(&self, file_path: &str) -> &dyn Chunker {
        Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_lowercase()))
            .map(|c| c.as_ref())
            .unwrap_or(&self.fallback)
    }

    /// Chunk raw file bytes, stamping every chunk with the file's SHA1
    ///
    /// A chunker failure yields a single error chunk for this file only.
    pub fn chunk_file(&self, file_path: &str, raw: &[u8]) -> ChunkedFile {
        let file_hash = compute_file_hash(raw);
        let content = String::from_utf8_lossy(raw);
        let chunker = self.chunker_for(file_path);

        let mut chunks = match chunker.chunk(file_path, &content) {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!("{} chunker failed on {}: {}", chunker.name(), file_path, err);
                vec![Chunk::error(file_path, "parse_error", format!("Parse error: {}", err))]
            }
        };

        for chunk in &mut chunks {
            chunk.file_hash = file_hash.clone();
        }

        debug!(
            "Chunked {} with {} chunker: {} chunks",
            file_path,
            chunker.name(),
            chunks.len()
        );

        ChunkedFile { file_hash, chunks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = generate_chunk_id("a.py", Some("foo"), 3);
        let b = generate_chunk_id("a.py", Some("foo"), 3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, generate_chunk_id("a.py", Some("foo"), 4));
        assert_ne!(a, generate_chunk_id("b.py", Some("foo"), 3));
    }

    #[test]
    fn test_file_hash_is_sha1() {
        // sha1("abc")
        assert_eq!(
            compute_file_hash(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_extract_lines() {
        let content = "one\ntwo\nthree\nfour";
        assert_eq!(extract_lines(content, 2, 3), "two\nthree");
        assert_eq!(extract_lines(content, 4, 4), "four");
        assert_eq!(total_lines(content), 4);
        assert_eq!(total_lines("x\n"), 2);
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = ChunkerRegistry::new(1000).unwrap();
        assert_eq!(registry.chunker_for("pkg/a.py").name(), "python");
        assert_eq!(registry.chunker_for("web/App.TSX").name(), "javascript");
        assert_eq!(registry.chunker_for("config.yaml").name(), "fallback");
        assert_eq!(registry.chunker_for("Makefile").name(), "fallback");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_stamps_file_hash() {
        let registry = ChunkerRegistry::new(1000).unwrap();
        let raw = b"def foo():\n    return 1\n";
        let chunked = registry.chunk_file("a.py", raw);

        assert_eq!(chunked.file_hash, compute_file_hash(raw));
        assert!(chunked.chunks.len() >= 2);
        assert!(chunked.chunks.iter().all(|c| c.file_hash == chunked.file_hash));
    }

    #[test]
    fn test_rechunking_is_deterministic() {
        let registry = ChunkerRegistry::new(1000).unwrap();
        let raw = b"import os\n\nclass Bar:\n    def go(self):\n        pass\n\ndef foo(a, b):\n    return a + b\n";

        let first = registry.chunk_file("pkg/mod.py", raw);
        let second = registry.chunk_file("pkg/mod.py", raw);

        let ids = |c: &ChunkedFile| c.chunks.iter().map(|c| c.chunk_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.file_hash, second.file_hash);
    }

    #[test]
    fn test_chunk_kind_roundtrip_names() {
        for kind in [
            ChunkKind::FileOverview,
            ChunkKind::Function,
            ChunkKind::Class,
            ChunkKind::Interface,
            ChunkKind::Error,
            ChunkKind::File,
        ] {
            assert_eq!(ChunkKind::parse(kind.as_str()), Some(kind));
        }
        assert!(ChunkKind::Interface.is_symbol());
        assert!(!ChunkKind::FileOverview.is_symbol());
    }
}
