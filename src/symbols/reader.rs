use super::bounds::find_symbol_bounds;
use super::matcher::{SymbolKind, SymbolMatcher};
use crate::chunker::{Chunk, ChunkKind};
use crate::error::{EngineError, Result};
use crate::file::{is_binary_file, relative_path, Language};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Indexed symbol lookup consulted before falling back to line patterns
pub trait SymbolIndex {
    /// Indexed declarations named `symbol` in `file_path`, ordered by line
    fn find_symbol(&self, symbol: &str, file_path: &str) -> Result<Vec<Chunk>>;
}

/// Parameters of a code read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadRequest {
    pub path: String,
    pub symbol_name: Option<String>,
    /// 1-based occurrence of `symbol_name` within the file
    pub occurrence: usize,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub with_line_numbers: bool,
}

impl Default for ReadRequest {
    fn default() -> Self {
        Self {
            path: String::new(),
            symbol_name: None,
            occurrence: 1,
            start_line: None,
            end_line: None,
            with_line_numbers: true,
        }
    }
}

impl ReadRequest {
    pub fn whole_file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn symbol(path: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            symbol_name: Some(symbol.into()),
            ..Self::default()
        }
    }

    pub fn range(path: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            path: path.into(),
            start_line: Some(start_line),
            end_line: Some(end_line),
            ..Self::default()
        }
    }

    /// Reject conflicting or malformed parameters before touching the disk
    pub fn validate(&self) -> Result<()> {
        if self.occurrence < 1 {
            return Err(EngineError::InvalidQuery(format!(
                "Invalid occurrence: {} (must be >= 1)",
                self.occurrence
            )));
        }

        let has_range = self.start_line.is_some() || self.end_line.is_some();
        if self.symbol_name.is_some() && has_range {
            return Err(EngineError::InvalidQuery(
                "symbol_name cannot be combined with start_line/end_line".to_string(),
            ));
        }
        if self.start_line.is_some() != self.end_line.is_some() {
            return Err(EngineError::InvalidQuery(
                "start_line and end_line must be given together".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the returned lines were selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    LineRange,
    SymbolDb(ChunkKind),
    SymbolPattern(SymbolKind),
    WholeFile,
}

impl ReadMode {
    pub fn label(&self) -> String {
        match self {
            Self::LineRange => "line_range".to_string(),
            Self::SymbolDb(kind) => format!("symbol_db_{}", kind),
            Self::SymbolPattern(kind) => format!("symbol_pattern_{}", kind),
            Self::WholeFile => "whole_file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
    pub total_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub total_file_lines: usize,
    pub file_size: u64,
}

/// Result of a successful read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolContent {
    pub file_path: String,
    pub content: String,
    pub mode: String,
    pub line_range: LineSpan,
    pub file_stats: FileStats,
}

/// Reads whole files, line ranges or single symbols under a root
pub struct SymbolReader<'a> {
    root: &'a Path,
    matcher: &'a SymbolMatcher,
}

impl<'a> SymbolReader<'a> {
    pub fn new(root: &'a Path, matcher: &'a SymbolMatcher) -> Self {
        Self { root, matcher }
    }

    /// Resolve `path` against the root, refusing anything that escapes it
    pub fn validate_path(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let normalized = normalize(&joined);
        if !normalized.starts_with(self.root) {
            return Err(EngineError::AccessDenied(path.to_string()));
        }

        // Symlinks may still point outside the root
        if let (Ok(real), Ok(real_root)) = (normalized.canonicalize(), self.root.canonicalize()) {
            if !real.starts_with(&real_root) {
                return Err(EngineError::AccessDenied(path.to_string()));
            }
        }

        Ok(normalized)
    }

    pub fn read(&self, request: &ReadRequest, index: &dyn SymbolIndex) -> Result<SymbolContent> {
        request.validate()?;

        let abs_path = self.validate_path(&request.path)?;
        if !abs_path.is_file() {
            return Err(EngineError::FileNotFound(request.path.clone()));
        }
        if is_binary_file(&abs_path) {
            return Err(EngineError::BinaryFile(request.path.clone()));
        }

        let raw = std::fs::read(&abs_path)?;
        let file_size = raw.len() as u64;
        let text = String::from_utf8_lossy(&raw);
        let lines: Vec<&str> = text.lines().collect();
        let language = Language::from_path(&abs_path);

        let (start, end, mode) = match (&request.symbol_name, request.start_line, request.end_line) {
            (_, Some(start_line), Some(end_line)) => {
                if start_line < 1 || end_line > lines.len() || start_line > end_line {
                    return Err(EngineError::InvalidQuery(format!(
                        "Invalid line range: {}-{} (file has {} lines)",
                        start_line,
                        end_line,
                        lines.len()
                    )));
                }
                (start_line - 1, end_line, ReadMode::LineRange)
            }
            (Some(symbol), _, _) => {
                let relative = relative_path(self.root, &abs_path);
                let (start_idx, mode) =
                    self.locate_symbol(symbol, &relative, request, &lines, language, index)?;
                let (start, end) = find_symbol_bounds(&lines, start_idx, language);
                (start, (end + 1).min(lines.len()), mode)
            }
            _ => (0, lines.len(), ReadMode::WholeFile),
        };

        let selected = &lines[start.min(end)..end];
        let offset = start + 1;
        let content = format_lines(selected, offset, request.with_line_numbers);

        debug!(
            "Read {} lines of {} ({})",
            selected.len(),
            request.path,
            mode.label()
        );

        Ok(SymbolContent {
            file_path: request.path.clone(),
            content,
            mode: mode.label(),
            line_range: LineSpan {
                start: offset,
                end: offset + selected.len() - 1,
                total_lines: selected.len(),
            },
            file_stats: FileStats {
                total_file_lines: lines.len(),
                file_size,
            },
        })
    }

    fn locate_symbol(
        &self,
        symbol: &str,
        relative: &str,
        request: &ReadRequest,
        lines: &[&str],
        language: Language,
        index: &dyn SymbolIndex,
    ) -> Result<(usize, ReadMode)> {
        let indexed: Vec<Chunk> = index
            .find_symbol(symbol, relative)?
            .into_iter()
            .filter(|c| c.kind.is_symbol())
            .collect();

        if !indexed.is_empty() {
            let target = pick_occurrence(&indexed, request.occurrence)?;
            return Ok((target.line_start - 1, ReadMode::SymbolDb(target.kind)));
        }

        let found = self.matcher.find_symbol(lines, symbol, language);
        if found.is_empty() {
            return Err(EngineError::SymbolNotFound {
                symbol: symbol.to_string(),
                file: request.path.clone(),
            });
        }
        let (idx, kind) = *pick_occurrence(&found, request.occurrence)?;
        Ok((idx, ReadMode::SymbolPattern(kind)))
    }
}

fn pick_occurrence<T>(matches: &[T], occurrence: usize) -> Result<&T> {
    occurrence
        .checked_sub(1)
        .and_then(|i| matches.get(i))
        .ok_or_else(|| {
            EngineError::InvalidQuery(format!(
                "Invalid occurrence: {} (found {} matches)",
                occurrence,
                matches.len()
            ))
        })
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join lines, optionally prefixed with right-aligned `N | ` numbers
pub fn format_lines(lines: &[&str], first_line: usize, with_numbers: bool) -> String {
    if !with_numbers {
        return lines.join("\n");
    }

    let last = first_line + lines.len().saturating_sub(1);
    let width = last.to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$} | {}", first_line + i, line, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}
