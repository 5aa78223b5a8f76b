use crate::file::Language;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of a symbol found by line patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Enum,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Enum => "enum",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symbol declaration found on one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: SymbolKind,
    /// 1-indexed line number
    pub line: usize,
    /// Declaration line, trimmed
    pub signature: Option<String>,
}

/// Line-anchored declaration patterns per language
///
/// Works on any file without parsing, so it serves live symbol listings and
/// symbol reads for files that are not (yet) indexed.
pub struct SymbolMatcher {
    python: Vec<(Regex, SymbolKind)>,
    javascript: Vec<(Regex, SymbolKind)>,
    typescript: Vec<(Regex, SymbolKind)>,
}

fn compile(patterns: &[(&str, SymbolKind)]) -> Result<Vec<(Regex, SymbolKind)>, regex::Error> {
    patterns
        .iter()
        .map(|(src, kind)| Ok((Regex::new(src)?, *kind)))
        .collect()
}

impl SymbolMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        use SymbolKind::*;

        let python = compile(&[
            (r"^\s*def\s+([a-zA-Z_]\w*)\s*\(", Function),
            (r"^\s*class\s+([a-zA-Z_]\w*)\s*(:|\(|$)", Class),
            (r"^\s*async\s+def\s+([a-zA-Z_]\w*)\s*\(", Function),
        ])?;

        let javascript = compile(&[
            (r"^\s*(?:export\s+)?(?:async\s+)?function\s+([a-zA-Z_]\w*)\s*\(", Function),
            (r"^\s*(?:export\s+)?(?:const|let|var)\s+([a-zA-Z_]\w*)\s*=\s*\(", Function),
            (r"^\s*(?:export\s+)?class\s+([a-zA-Z_]\w*)\s*(?:\{|extends|$)", Class),
            (r"^\s*(?:export\s+)?(?:const|let|var)\s+([a-zA-Z_]\w*)\s*=\s*[^=]*=>", Function),
            (r"^\s*([a-zA-Z_]\w*)\s*:\s*function\s*\(", Function),
        ])?;

        let typescript = compile(&[
            (r"^\s*(?:export\s+)?(?:async\s+)?function\s+([a-zA-Z_]\w*)\s*[<(]", Function),
            (r"^\s*(?:export\s+)?(?:const|let|var)\s+([a-zA-Z_]\w*)\s*(?::[^=]*)?=\s*[^=]*=>", Function),
            (r"^\s*(?:export\s+)?(?:abstract\s+)?class\s+([a-zA-Z_]\w*)\s*(?:\{|extends|implements|<|$)", Class),
            (r"^\s*(?:export\s+)?interface\s+([a-zA-Z_]\w*)\s*(?:\{|extends|<)", Interface),
            (r"^\s*(?:export\s+)?type\s+([a-zA-Z_]\w*)\s*(?:<[^=]*>)?\s*=", Type),
            (r"^\s*(?:export\s+)?(?:const\s+)?enum\s+([a-zA-Z_]\w*)\s*\{", Enum),
        ])?;

        Ok(Self {
            python,
            javascript,
            typescript,
        })
    }

    fn patterns(&self, language: Language) -> &[(Regex, SymbolKind)] {
        match language {
            Language::Python => &self.python,
            Language::JavaScript => &self.javascript,
            Language::TypeScript => &self.typescript,
            _ => &[],
        }
    }

    /// First declaration on a line, if any
    pub fn match_line(&self, line: &str, language: Language) -> Option<(String, SymbolKind)> {
        self.patterns(language).iter().find_map(|(pattern, kind)| {
            pattern
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|name| (name.as_str().to_string(), *kind))
        })
    }

    /// Every declaration in `content`, one per line at most
    pub fn extract_symbols(&self, content: &str, language: Language) -> Vec<SymbolMatch> {
        content
            .split('\n')
            .enumerate()
            .filter_map(|(idx, line)| {
                self.match_line(line, language).map(|(name, kind)| SymbolMatch {
                    name,
                    kind,
                    line: idx + 1,
                    signature: Some(line.trim().to_string()),
                })
            })
            .collect()
    }

    /// 0-based line indices declaring `name`, in file order
    pub fn find_symbol(&self, lines: &[&str], name: &str, language: Language) -> Vec<(usize, SymbolKind)> {
        lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| match self.match_line(line, language) {
                Some((found, kind)) if found == name => Some((idx, kind)),
                _ => None,
            })
            .collect()
    }
}
