use crate::config::Config;
use crate::error::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod binary;
mod language;

pub use binary::{is_binary_content, is_binary_file};
pub use language::{is_react_source, Language, LanguageFamily};

/// Information about a discovered file
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the walked root, `/`-separated
    pub relative: String,
    pub language: Language,
    pub size: u64,
}

/// Statistics about walked files
#[derive(Debug, Default, Clone)]
pub struct WalkStats {
    pub total_files: usize,
    pub indexable_files: usize,
    pub skipped_extension: usize,
    pub files_by_language: HashMap<Language, usize>,
    pub total_size_bytes: u64,
}

impl WalkStats {
    pub fn add_file(&mut self, file: &FileInfo) {
        self.indexable_files += 1;
        self.total_size_bytes += file.size;
        *self.files_by_language.entry(file.language).or_insert(0) += 1;
    }

    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Exclusion rules shared by indexing and text search
///
/// Built once per project: the root `.gitignore` is read at construction
/// and cached for the lifetime of the filter.
pub struct PathFilter {
    ignore_dirs: HashSet<String>,
    ignore_files: HashSet<String>,
    gitignore: Option<Gitignore>,
}

impl PathFilter {
    pub fn new(root: &Path, config: &Config) -> Self {
        let gitignore = if config.indexing.respect_gitignore {
            load_gitignore(root)
        } else {
            None
        };

        let mut ignore_dirs: HashSet<String> =
            config.indexing.ignore_dirs.iter().cloned().collect();
        ignore_dirs.insert(config.data_dir_name.clone());

        Self {
            ignore_dirs,
            ignore_files: config.indexing.ignore_files.iter().cloned().collect(),
            gitignore,
        }
    }

    /// Check whether a path (file or directory) is excluded
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        if is_dir && self.ignore_dirs.contains(name) {
            return true;
        }
        if !is_dir && self.ignore_files.contains(name) {
            return true;
        }

        match &self.gitignore {
            Some(gitignore) => gitignore.matched(path, is_dir).is_ignore(),
            None => false,
        }
    }
}

fn load_gitignore(root: &Path) -> Option<Gitignore> {
    let path = root.join(".gitignore");
    if !path.is_file() {
        return None;
    }

    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(&path) {
        warn!("Partially invalid .gitignore at {}: {}", path.display(), err);
    }
    match builder.build() {
        Ok(gitignore) => {
            debug!("Loaded {} .gitignore patterns", gitignore.num_ignores());
            Some(gitignore)
        }
        Err(err) => {
            warn!("Ignoring unreadable .gitignore: {}", err);
            None
        }
    }
}

/// File walker applying the project's exclusion rules
pub struct FileWalker {
    root: PathBuf,
    filter: Arc<PathFilter>,
    /// Extension allow-list source; `None` admits every file
    config: Option<Config>,
}

impl FileWalker {
    /// Walker restricted to the configured extension allow-list
    pub fn new(root: impl Into<PathBuf>, filter: Arc<PathFilter>, config: &Config) -> Self {
        Self {
            root: root.into(),
            filter,
            config: Some(config.clone()),
        }
    }

    /// Walker over every non-excluded file regardless of extension
    pub fn unrestricted(root: impl Into<PathBuf>, filter: Arc<PathFilter>) -> Self {
        Self {
            root: root.into(),
            filter,
            config: None,
        }
    }

    /// Walk files, returning detailed file information sorted by relative path
    pub fn walk(&self) -> Result<(Vec<FileInfo>, WalkStats)> {
        let mut files = Vec::new();
        let mut stats = WalkStats::default();

        debug!("Starting file walk in: {}", self.root.display());

        let filter = Arc::clone(&self.filter);
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                // The root itself is never filtered
                if entry.depth() == 0 {
                    return true;
                }
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                !filter.is_excluded(entry.path(), is_dir)
            });

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Error walking file: {}", err);
                    continue;
                }
            };

            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            stats.total_files += 1;

            let path = entry.path();
            if !self.extension_allowed(path) {
                stats.skipped_extension += 1;
                continue;
            }

            let file_info = FileInfo {
                path: path.to_path_buf(),
                relative: relative_path(&self.root, path),
                language: Language::from_path(path),
                size: entry.metadata().map(|m| m.len()).unwrap_or(0),
            };

            stats.add_file(&file_info);
            files.push(file_info);
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));

        info!(
            "File discovery complete: {} indexable of {} files ({:.2} MB)",
            stats.indexable_files,
            stats.total_files,
            stats.total_size_mb()
        );

        Ok((files, stats))
    }

    /// Walk files, returning just the relative paths
    pub fn walk_relative(&self) -> Result<Vec<String>> {
        let (files, _) = self.walk()?;
        Ok(files.into_iter().map(|f| f.relative).collect())
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        match &self.config {
            None => true,
            Some(config) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| config.is_indexable_extension(e))
                .unwrap_or(false),
        }
    }
}

/// Render `path` relative to `root` with `/` separators
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
