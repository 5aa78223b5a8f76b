//! Non-embedding search: symbol lookup over indexed chunks, text/regex
//! scanning of the working tree and live symbol listing for one file

mod text;

pub use text::TextSearcher;

use crate::chunker::{compute_file_hash, total_lines, Chunk};
use crate::config::SearchConfig;
use crate::error::{EngineError, Result};
use crate::file::{is_binary_content, Language, PathFilter};
use crate::symbols::{SymbolMatch, SymbolMatcher, SymbolReader};
use crate::vectordb::VectorStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Query mode of a search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Embedding similarity over indexed chunks
    #[default]
    Semantic,
    /// Ranked approximate match on symbol names
    FuzzySymbol,
    /// Literal or regex scan of files on disk
    Text,
    /// Case-insensitive equality on symbol names
    SymbolExact,
}

impl SearchMode {
    pub const ALL: [SearchMode; 4] = [
        SearchMode::Semantic,
        SearchMode::FuzzySymbol,
        SearchMode::Text,
        SearchMode::SymbolExact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::FuzzySymbol => "fuzzy_symbol",
            Self::Text => "text",
            Self::SymbolExact => "symbol_exact",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| EngineError::InvalidQuery(format!("Unknown search mode: {}", s)))
    }
}

/// Parameters of one search call, shared by every mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Path substring (semantic/symbol modes) or file-name glob (text mode)
    #[serde(default)]
    pub file_pattern: Option<String>,
    /// Restrict symbol modes to one chunk type (`function`, `class`, ...)
    #[serde(default)]
    pub symbol_type: Option<String>,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub fuzzy: bool,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_max_results() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_min_score() -> f32 {
    0.5
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            max_results: default_max_results(),
            file_pattern: None,
            symbol_type: None,
            use_regex: false,
            case_sensitive: false,
            fuzzy: true,
            min_score: default_min_score(),
        }
    }

    /// Request seeded from a project's configured search defaults
    pub fn from_config(query: impl Into<String>, mode: SearchMode, defaults: &SearchConfig) -> Self {
        Self::new(query, mode)
            .with_max_results(defaults.default_max_results)
            .with_min_score(defaults.default_min_score)
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = Some(pattern.into());
        self
    }

    pub fn with_symbol_type(mut self, symbol_type: impl Into<String>) -> Self {
        self.symbol_type = Some(symbol_type.into());
        self
    }

    pub fn with_regex(mut self, use_regex: bool) -> Self {
        self.use_regex = use_regex;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Reject requests that cannot be served before touching any index
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(EngineError::InvalidQuery("Query must not be empty".to_string()));
        }
        if self.max_results == 0 {
            return Err(EngineError::InvalidQuery(
                "max_results must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(EngineError::InvalidQuery(format!(
                "min_score must be within 0.0..=1.0, got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}

/// Uniform result shape returned by every search mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub relevance_score: f32,
    pub chunk_type: String,
    /// Matched line for text results
    pub snippet: Option<String>,
}

impl SearchResult {
    pub fn from_chunk(chunk: &Chunk, relevance_score: f32) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            file_path: chunk.file_path.clone(),
            symbol_name: chunk.symbol_name.clone(),
            line_start: chunk.line_start,
            line_end: chunk.line_end,
            signature: chunk.signature.clone(),
            docstring: chunk.docstring.clone(),
            relevance_score,
            chunk_type: chunk.kind.as_str().to_string(),
            snippet: None,
        }
    }
}

/// Live symbol table of one file
#[derive(Debug, Clone, Serialize)]
pub struct FileSymbols {
    pub file: String,
    pub file_hash: String,
    pub symbols: Vec<SymbolMatch>,
    pub total_lines: usize,
    pub file_size: usize,
}

/// Rank of `symbol` against `query`
///
/// Case-insensitive: 1.0 equal, 0.9 prefix, 0.7 substring, 0.5 when the
/// query's characters appear in order, 0.0 otherwise.
pub fn fuzzy_match_score(query: &str, symbol: &str) -> f32 {
    let query = query.to_lowercase();
    let symbol = symbol.to_lowercase();

    if query == symbol {
        return 1.0;
    }
    if symbol.starts_with(&query) {
        return 0.9;
    }
    if symbol.contains(&query) {
        return 0.7;
    }

    let mut wanted = query.chars().peekable();
    for c in symbol.chars() {
        if wanted.peek() == Some(&c) {
            wanted.next();
        }
    }
    if wanted.peek().is_none() {
        return 0.5;
    }

    0.0
}

/// Score and order symbol chunks for a symbol-mode request
///
/// `fuzzy = false` keeps only case-insensitive exact matches at score 1.0.
pub fn rank_symbols(candidates: Vec<Chunk>, request: &SearchRequest, fuzzy: bool) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = candidates
        .iter()
        .filter(|chunk| chunk.kind.is_symbol())
        .filter(|chunk| match &request.symbol_type {
            Some(kind) => chunk.kind.as_str() == kind,
            None => true,
        })
        .filter(|chunk| match &request.file_pattern {
            Some(pattern) => chunk.file_path.contains(pattern.as_str()),
            None => true,
        })
        .filter_map(|chunk| {
            let name = chunk.symbol_name.as_deref()?;
            let score = if fuzzy {
                let score = fuzzy_match_score(&request.query, name);
                if score <= 0.0 || score < request.min_score {
                    return None;
                }
                score
            } else {
                if request.query.to_lowercase() != name.to_lowercase() {
                    return None;
                }
                1.0
            };
            Some(SearchResult::from_chunk(chunk, score))
        })
        .collect();

    results.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.line_start.cmp(&b.line_start))
    });
    results.truncate(request.max_results);
    results
}

/// Symbol, text and listing queries that need no embeddings
pub struct EnhancedSearchManager {
    root: PathBuf,
    matcher: SymbolMatcher,
    text: TextSearcher,
}

impl EnhancedSearchManager {
    pub fn new(root: impl Into<PathBuf>, filter: Arc<PathFilter>) -> Result<Self> {
        let root = root.into();
        Ok(Self {
            text: TextSearcher::new(root.clone(), filter),
            matcher: SymbolMatcher::new()?,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn matcher(&self) -> &SymbolMatcher {
        &self.matcher
    }

    /// Serve a fuzzy_symbol, symbol_exact or text request
    pub fn search(&self, store: &VectorStore, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        match request.mode {
            SearchMode::FuzzySymbol => self.search_symbols(store, request, request.fuzzy),
            SearchMode::SymbolExact => self.search_symbols(store, request, false),
            SearchMode::Text => self.text.search(request),
            SearchMode::Semantic => Err(EngineError::Internal(
                "Semantic requests are served by the engine".to_string(),
            )),
        }
    }

    pub fn search_symbols(
        &self,
        store: &VectorStore,
        request: &SearchRequest,
        fuzzy: bool,
    ) -> Result<Vec<SearchResult>> {
        let candidates = store.symbol_chunks()?;
        debug!(
            "Ranking {} symbol chunks for '{}' (fuzzy: {})",
            candidates.len(),
            request.query,
            fuzzy
        );
        Ok(rank_symbols(candidates, request, fuzzy))
    }

    /// Re-derive the symbols of one file from its current content
    pub fn list_symbols_in_file(&self, file_path: &str) -> Result<FileSymbols> {
        let full_path = SymbolReader::new(&self.root, &self.matcher).validate_path(file_path)?;
        if !full_path.is_file() {
            return Err(EngineError::FileNotFound(file_path.to_string()));
        }

        let raw = std::fs::read(&full_path)?;
        if is_binary_content(&raw) {
            return Err(EngineError::BinaryFile(file_path.to_string()));
        }
        let content = String::from_utf8_lossy(&raw);

        let symbols = self
            .matcher
            .extract_symbols(&content, Language::from_path(&full_path));

        Ok(FileSymbols {
            file: file_path.to_string(),
            file_hash: compute_file_hash(&raw),
            symbols,
            total_lines: total_lines(&content),
            file_size: raw.len(),
        })
    }
}
