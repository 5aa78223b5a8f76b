use super::{extract_lines, Chunk, ChunkKind, Chunker, FILE_OVERVIEW_SYMBOL};
use crate::file::is_react_source;
use crate::symbols::brace_bounds;
use anyhow::Result;
use regex::{Captures, Match, Regex};
use serde_json::json;
use std::path::Path;

/// Call-like tokens inside a class body that are not method names
const NON_METHOD_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "super", "with", "constructor",
];

/// Declaration-pattern chunker for JavaScript and TypeScript
///
/// Declarations are located with regular expressions; each body is
/// delimited by brace depth from the declaration line.
pub struct JsChunker {
    function: Regex,
    arrow: Regex,
    class: Regex,
    interface: Regex,
    import: Regex,
    method: Regex,
}

impl JsChunker {
    pub fn new() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            function: Regex::new(r"(export\s+)?(async\s+)?function\s+(\w+)\s*\([^)]*\)\s*[:{]")?,
            arrow: Regex::new(
                r"(export\s+)?(const|let|var)\s+(\w+)\s*=\s*(async\s+)?\([^)]*\)\s*=>\s*[{]",
            )?,
            class: Regex::new(
                r"(export\s+)?(abstract\s+)?class\s+(\w+)(\s+extends\s+\w+)?(\s+implements\s+[\w,\s]+)?\s*[{]",
            )?,
            interface: Regex::new(r"(export\s+)?interface\s+(\w+)(\s+extends\s+[\w,\s]+)?\s*[{]")?,
            import: Regex::new(
                r#"import\s+(?:[{]([^}]+)[}]|(\w+)|\*\s+as\s+(\w+))\s+from\s+["']([^"']+)["']"#,
            )?,
            method: Regex::new(r"(\w+)\s*\([^)]*\)\s*[:{]")?,
        })
    }
}

/// Source split into lines with their byte offsets
struct SourceLines<'a> {
    content: &'a str,
    lines: Vec<&'a str>,
    offsets: Vec<usize>,
}

impl<'a> SourceLines<'a> {
    fn new(content: &'a str) -> Self {
        let lines: Vec<&str> = content.split('\n').collect();
        let mut offsets = Vec::with_capacity(lines.len());
        let mut offset = 0;
        for line in &lines {
            offsets.push(offset);
            offset += line.len() + 1;
        }
        Self {
            content,
            lines,
            offsets,
        }
    }

    /// 0-based line index and column of a byte offset
    fn position(&self, byte: usize) -> (usize, usize) {
        let line = self.content[..byte].matches('\n').count();
        (line, byte - self.offsets[line])
    }

    /// 0-based inclusive span of a matched declaration
    ///
    /// Matches ending on the body `{` are scanned from that brace, so braces
    /// in the parameter list never close the declaration.
    fn declaration_span(&self, whole: &Match) -> (usize, usize) {
        let (start, _) = self.position(whole.start());
        let scan_from = if whole.as_str().ends_with('{') {
            whole.end() - 1
        } else {
            whole.start()
        };
        let (line, column) = self.position(scan_from);
        let (_, end) = brace_bounds(&self.lines, line, column);
        (start, end)
    }

    fn line_end_byte(&self, line: usize) -> usize {
        self.offsets[line] + self.lines[line].len()
    }

    /// Block comment ending on the line directly above `line`
    fn doc_comment(&self, line: usize) -> Option<String> {
        if line == 0 || !self.lines[line - 1].trim_end().ends_with("*/") {
            return None;
        }

        let mut first = line - 1;
        while !self.lines[first].contains("/*") {
            if first == 0 {
                return None;
            }
            first -= 1;
        }

        let text = self.lines[first..line]
            .iter()
            .map(|l| {
                let l = l.trim();
                let l = l.strip_prefix("/**").or_else(|| l.strip_prefix("/*")).unwrap_or(l);
                let l = l.strip_suffix("*/").unwrap_or(l);
                let l = l.trim();
                l.strip_prefix('*').unwrap_or(l).trim().to_string()
            })
            .collect::<Vec<_>>()
            .join("\n");

        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

fn is_typescript(file_path: &str) -> bool {
    matches!(
        Path::new(file_path).extension().and_then(|e| e.to_str()),
        Some("ts") | Some("tsx")
    )
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str())
}

impl JsChunker {
    fn overview(&self, src: &SourceLines, file_path: &str, typescript: bool) -> Chunk {
        let content = src.content;
        let imports: Vec<&str> = self
            .import
            .captures_iter(content)
            .filter_map(|c| group(&c, 4))
            .collect();
        let functions: Vec<&str> = self
            .function
            .captures_iter(content)
            .chain(self.arrow.captures_iter(content))
            .filter_map(|c| group(&c, 3))
            .collect();
        let classes: Vec<&str> = self
            .class
            .captures_iter(content)
            .filter_map(|c| group(&c, 3))
            .collect();
        let interfaces: Vec<&str> = if typescript {
            self.interface
                .captures_iter(content)
                .filter_map(|c| group(&c, 2))
                .collect()
        } else {
            Vec::new()
        };

        let mut file_type = if typescript { "typescript" } else { "javascript" }.to_string();
        if is_react_source(Path::new(file_path)) {
            file_type.push_str("_react");
        }

        let total_lines = src.lines.len();
        let summary = json!({
            "file_type": file_type,
            "imports": imports,
            "functions": functions,
            "classes": classes,
            "interfaces": interfaces,
            "total_lines": total_lines,
        });

        Chunk::new(
            file_path,
            ChunkKind::FileOverview,
            Some(FILE_OVERVIEW_SYMBOL.to_string()),
            1,
            total_lines,
            serde_json::to_string_pretty(&summary).unwrap_or_default(),
        )
    }

    fn function_chunks(&self, src: &SourceLines, file_path: &str) -> Vec<Chunk> {
        self.function
            .captures_iter(src.content)
            .chain(self.arrow.captures_iter(src.content))
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = group(&caps, 3)?;
                let (start, end) = src.declaration_span(&whole);

                let chunk = Chunk::new(
                    file_path,
                    ChunkKind::Function,
                    Some(name.to_string()),
                    start + 1,
                    end + 1,
                    extract_lines(src.content, start + 1, end + 1),
                )
                .with_signature(Some(src.lines[start].trim().to_string()))
                .with_docstring(src.doc_comment(start));
                Some(chunk)
            })
            .collect()
    }

    fn class_chunks(&self, src: &SourceLines, file_path: &str) -> Vec<Chunk> {
        self.class
            .captures_iter(src.content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = group(&caps, 3)?;
                let (start, end) = src.declaration_span(&whole);

                let body_end = src.line_end_byte(end).max(whole.end());
                let body = &src.content[whole.end()..body_end];
                let methods: Vec<&str> = self
                    .method
                    .captures_iter(body)
                    .filter_map(|c| group(&c, 1))
                    .filter(|m| !NON_METHOD_KEYWORDS.contains(m))
                    .collect();

                let extends = group(&caps, 4)
                    .map(|e| e.trim().trim_start_matches("extends").trim().to_string());

                let summary = json!({
                    "name": name,
                    "methods": methods,
                    "extends": extends,
                });

                let chunk = Chunk::new(
                    file_path,
                    ChunkKind::Class,
                    Some(name.to_string()),
                    start + 1,
                    end + 1,
                    serde_json::to_string_pretty(&summary).unwrap_or_default(),
                )
                .with_signature(Some(src.lines[start].trim().to_string()))
                .with_docstring(src.doc_comment(start));
                Some(chunk)
            })
            .collect()
    }

    fn interface_chunks(&self, src: &SourceLines, file_path: &str) -> Vec<Chunk> {
        self.interface
            .captures_iter(src.content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = group(&caps, 2)?;
                let (start, end) = src.declaration_span(&whole);

                let chunk = Chunk::new(
                    file_path,
                    ChunkKind::Interface,
                    Some(name.to_string()),
                    start + 1,
                    end + 1,
                    extract_lines(src.content, start + 1, end + 1),
                )
                .with_signature(Some(src.lines[start].trim().to_string()))
                .with_docstring(src.doc_comment(start));
                Some(chunk)
            })
            .collect()
    }
}

impl Chunker for JsChunker {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &[&'static str] {
        &["js", "jsx", "ts", "tsx", "mjs", "cjs"]
    }

    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        let src = SourceLines::new(content);
        let typescript = is_typescript(file_path);

        let mut declarations = self.function_chunks(&src, file_path);
        declarations.extend(self.class_chunks(&src, file_path));
        if typescript {
            declarations.extend(self.interface_chunks(&src, file_path));
        }
        declarations.sort_by_key(|c| c.line_start);

        let mut chunks = Vec::with_capacity(declarations.len() + 1);
        chunks.push(self.overview(&src, file_path, typescript));
        chunks.extend(declarations);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(path: &str, source: &str) -> Vec<Chunk> {
        JsChunker::new().unwrap().chunk(path, source).unwrap()
    }

    const SOURCE: &str = r#"import React from 'react';
import { useState } from "react";

/**
 * Adds two numbers.
 */
export function add(a, b) {
  return a + b;
}

const greet = async (name) => {
  const msg = "}";
  return msg;
};

class Widget extends Base {
  render() {
    if (this.ok) {
      return 1;
    }
  }
}
"#;

    #[test]
    fn test_overview() {
        let chunks = chunk("src/app.js", SOURCE);
        let overview = &chunks[0];
        assert_eq!(overview.kind, ChunkKind::FileOverview);

        let summary: serde_json::Value = serde_json::from_str(&overview.content).unwrap();
        assert_eq!(summary["file_type"], "javascript");
        assert_eq!(summary["imports"], json!(["react", "react"]));
        assert_eq!(summary["functions"], json!(["add", "greet"]));
        assert_eq!(summary["classes"], json!(["Widget"]));
        assert_eq!(summary["total_lines"], 23);
    }

    #[test]
    fn test_function_with_doc_comment() {
        let chunks = chunk("src/app.js", SOURCE);
        let add = chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("add"))
            .unwrap();

        assert_eq!((add.line_start, add.line_end), (7, 9));
        assert_eq!(add.signature.as_deref(), Some("export function add(a, b) {"));
        assert_eq!(add.docstring.as_deref(), Some("Adds two numbers."));
    }

    #[test]
    fn test_arrow_function_ignores_string_braces() {
        let chunks = chunk("src/app.js", SOURCE);
        let greet = chunks
            .iter()
            .find(|c| c.symbol_name.as_deref() == Some("greet"))
            .unwrap();

        assert_eq!((greet.line_start, greet.line_end), (11, 14));
        assert!(greet.docstring.is_none());
    }

    #[test]
    fn test_class_summary() {
        let chunks = chunk("src/app.js", SOURCE);
        let class = chunks.iter().find(|c| c.kind == ChunkKind::Class).unwrap();

        assert_eq!((class.line_start, class.line_end), (16, 22));
        let summary: serde_json::Value = serde_json::from_str(&class.content).unwrap();
        assert_eq!(summary["methods"], json!(["render"]));
        assert_eq!(summary["extends"], "Base");
    }

    #[test]
    fn test_declarations_in_line_order() {
        let chunks = chunk("src/app.js", SOURCE);
        let names: Vec<_> = chunks[1..]
            .iter()
            .filter_map(|c| c.symbol_name.as_deref())
            .collect();
        assert_eq!(names, vec!["add", "greet", "Widget"]);
    }

    #[test]
    fn test_interfaces_only_for_typescript() {
        let source = "export interface User extends Base {\n  id: number;\n}\n";

        let ts = chunk("types.tsx", source);
        let iface = ts.iter().find(|c| c.kind == ChunkKind::Interface).unwrap();
        assert_eq!(iface.symbol_name.as_deref(), Some("User"));
        assert_eq!((iface.line_start, iface.line_end), (1, 3));
        let summary: serde_json::Value = serde_json::from_str(&ts[0].content).unwrap();
        assert_eq!(summary["file_type"], "typescript_react");
        assert_eq!(summary["interfaces"], json!(["User"]));

        let js = chunk("types.js", source);
        assert!(js.iter().all(|c| c.kind != ChunkKind::Interface));
    }

    #[test]
    fn test_object_parameters_do_not_end_declaration() {
        let source = r#"function App({ title }) {
  const x = 1;
  return title;
}

const Card = ({ body }) => {
  return body;
};

function init(opts = {}) {
  const a = opts.a;
  return a;
}
"#;
        let chunks = chunk("src/App.jsx", source);
        let spans: Vec<_> = chunks[1..]
            .iter()
            .map(|c| (c.symbol_name.as_deref().unwrap(), c.line_start, c.line_end))
            .collect();
        assert_eq!(spans, vec![("App", 1, 4), ("Card", 6, 8), ("init", 10, 13)]);
        assert!(chunks[1].content.ends_with("return title;\n}"));
    }

    #[test]
    fn test_typed_function_return() {
        let source = "function parse(input: string): number {\n  return 1;\n}\n";
        let chunks = chunk("parse.ts", source);
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[1].line_start, chunks[1].line_end), (1, 3));
    }
}
