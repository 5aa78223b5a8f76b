use super::{SearchRequest, SearchResult};
use crate::error::{EngineError, Result};
use crate::file::{is_binary_content, FileWalker, PathFilter};
use globset::{Glob, GlobMatcher};
use regex::{Regex, RegexBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Line matcher for one text request
enum LineMatcher {
    Regex(Regex),
    Literal { needle: String, case_sensitive: bool },
}

impl LineMatcher {
    fn new(request: &SearchRequest) -> Result<Self> {
        if request.use_regex {
            let regex = RegexBuilder::new(&request.query)
                .case_insensitive(!request.case_sensitive)
                .build()
                .map_err(|e| EngineError::InvalidQuery(format!("Invalid regex: {}", e)))?;
            return Ok(Self::Regex(regex));
        }

        let needle = if request.case_sensitive {
            request.query.clone()
        } else {
            request.query.to_lowercase()
        };
        Ok(Self::Literal {
            needle,
            case_sensitive: request.case_sensitive,
        })
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(line),
            Self::Literal {
                needle,
                case_sensitive: true,
            } => line.contains(needle.as_str()),
            Self::Literal { needle, .. } => line.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// File selector for the request's glob
///
/// Patterns without `/` match the file name, others the relative path.
struct FileGlob {
    matcher: GlobMatcher,
    whole_path: bool,
}

impl FileGlob {
    fn new(pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern)
            .map_err(|e| EngineError::InvalidQuery(format!("Invalid file pattern: {}", e)))?;
        Ok(Self {
            matcher: glob.compile_matcher(),
            whole_path: pattern.contains('/'),
        })
    }

    fn is_match(&self, relative: &str) -> bool {
        if self.whole_path {
            return self.matcher.is_match(relative);
        }
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.matcher.is_match(name)
    }
}

/// Literal or regex scan over the working tree
pub struct TextSearcher {
    root: PathBuf,
    filter: Arc<PathFilter>,
}

impl TextSearcher {
    pub fn new(root: impl Into<PathBuf>, filter: Arc<PathFilter>) -> Self {
        Self {
            root: root.into(),
            filter,
        }
    }

    /// Matching lines in path order, stopping at `max_results`
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let matcher = LineMatcher::new(request)?;
        let glob = request.file_pattern.as_deref().map(FileGlob::new).transpose()?;

        let (files, _) = FileWalker::unrestricted(&self.root, Arc::clone(&self.filter)).walk()?;
        let mut results = Vec::new();
        let mut scanned = 0usize;

        for file in files {
            if let Some(glob) = &glob {
                if !glob.is_match(&file.relative) {
                    continue;
                }
            }

            let raw = match std::fs::read(&file.path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("Skipping {}: {}", file.relative, err);
                    continue;
                }
            };
            if is_binary_content(&raw) {
                continue;
            }
            scanned += 1;

            let content = String::from_utf8_lossy(&raw);
            for (idx, line) in content.lines().enumerate() {
                if !matcher.is_match(line) {
                    continue;
                }

                let line_no = idx + 1;
                results.push(SearchResult {
                    chunk_id: format!("text:{}:{}", file.relative, line_no),
                    file_path: file.relative.clone(),
                    symbol_name: None,
                    line_start: line_no,
                    line_end: line_no,
                    signature: None,
                    docstring: None,
                    relevance_score: 1.0,
                    chunk_type: "text_match".to_string(),
                    snippet: Some(line.trim().to_string()),
                });

                if results.len() >= request.max_results {
                    debug!("Text search hit the limit after {} files", scanned);
                    return Ok(results);
                }
            }
        }

        debug!("Text search scanned {} files, {} matches", scanned, results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::search::SearchMode;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "import os\nTODO: fix\nprint('todo')\n").unwrap();
        std::fs::create_dir_all(dir.path().join("web")).unwrap();
        std::fs::write(dir.path().join("web/app.js"), "// TODO later\nconst x = 1;\n").unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        std::fs::write(dir.path().join("node_modules/dep/index.js"), "// TODO vendored\n").unwrap();
        std::fs::write(dir.path().join("blob.bin"), [b'T', b'O', b'D', b'O', 0, 1, 2]).unwrap();
        dir
    }

    fn searcher(dir: &TempDir) -> TextSearcher {
        let filter = Arc::new(PathFilter::new(dir.path(), &Config::default()));
        TextSearcher::new(dir.path(), filter)
    }

    #[test]
    fn test_case_insensitive_literal() {
        let dir = project();
        let results = searcher(&dir)
            .search(&SearchRequest::new("todo", SearchMode::Text))
            .unwrap();

        let hits: Vec<_> = results
            .iter()
            .map(|r| (r.file_path.as_str(), r.line_start))
            .collect();
        assert_eq!(hits, vec![("a.py", 2), ("a.py", 3), ("web/app.js", 1)]);
        assert!(results.iter().all(|r| r.chunk_type == "text_match"));
        assert_eq!(results[0].snippet.as_deref(), Some("TODO: fix"));
    }

    #[test]
    fn test_case_sensitive_and_glob() {
        let dir = project();
        let request = SearchRequest::new("TODO", SearchMode::Text)
            .with_case_sensitive(true)
            .with_file_pattern("*.py");
        let results = searcher(&dir).search(&request).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line_start, 2);
    }

    #[test]
    fn test_regex_and_limit() {
        let dir = project();
        let request = SearchRequest::new(r"^(import|const)\s", SearchMode::Text)
            .with_regex(true)
            .with_max_results(1);
        let results = searcher(&dir).search(&request).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "a.py");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let dir = project();
        let request = SearchRequest::new("(unclosed", SearchMode::Text).with_regex(true);
        assert!(matches!(
            searcher(&dir).search(&request),
            Err(EngineError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_path_glob() {
        let dir = project();
        let request = SearchRequest::new("todo", SearchMode::Text).with_file_pattern("web/*.js");
        let results = searcher(&dir).search(&request).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "web/app.js");
    }
}
