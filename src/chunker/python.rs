use super::parser::{walk_tree, CodeParser, ParsedCode};
use super::{extract_lines, total_lines, Chunk, ChunkKind, Chunker, FILE_OVERVIEW_SYMBOL};
use crate::file::Language;
use anyhow::Result;
use serde_json::json;
use tree_sitter::Node;

/// Syntax-tree chunker for Python sources
///
/// Emits a file overview chunk, then one chunk per function or method and
/// one per top-level class. Decorators are part of the declaration span.
pub struct PythonChunker;

impl PythonChunker {
    pub fn new() -> Self {
        Self
    }

    fn overview(&self, parsed: &ParsedCode, file_path: &str) -> Chunk {
        let mut imports = Vec::new();
        let mut functions = Vec::new();
        let mut classes = Vec::new();

        let root = parsed.root_node();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let node = unwrap_decorated(node);
            match node.kind() {
                "import_statement" => {
                    let mut inner = node.walk();
                    for name in node.children_by_field_name("name", &mut inner) {
                        let target = match name.kind() {
                            "aliased_import" => name.child_by_field_name("name").unwrap_or(name),
                            _ => name,
                        };
                        imports.push(parsed.node_text(target).to_string());
                    }
                }
                "import_from_statement" => {
                    if let Some(module) = parsed.field_text(node, "module_name") {
                        let module = module.trim_start_matches('.');
                        if !module.is_empty() {
                            imports.push(module.to_string());
                        }
                    }
                }
                "function_definition" => {
                    if let Some(name) = parsed.field_text(node, "name") {
                        functions.push(name.to_string());
                    }
                }
                "class_definition" => {
                    if let Some(name) = parsed.field_text(node, "name") {
                        classes.push(name.to_string());
                    }
                }
                _ => {}
            }
        }

        let lines = total_lines(parsed.source());
        let summary = json!({
            "file_type": "python",
            "imports": imports,
            "functions": functions,
            "classes": classes,
            "total_lines": lines,
        });

        Chunk::new(
            file_path,
            ChunkKind::FileOverview,
            Some(FILE_OVERVIEW_SYMBOL.to_string()),
            1,
            lines,
            serde_json::to_string_pretty(&summary).unwrap_or_default(),
        )
    }

    fn function_chunk(&self, parsed: &ParsedCode, node: Node, file_path: &str) -> Option<Chunk> {
        let name = parsed.field_text(node, "name")?;
        let (line_start, line_end) = node_span(node);

        let is_async = node.child(0).map(|c| c.kind() == "async").unwrap_or(false);
        let params = parsed
            .field_text(node, "parameters")
            .map(collapse_whitespace)
            .unwrap_or_else(|| "()".to_string());
        let mut signature = format!(
            "{}def {}{}",
            if is_async { "async " } else { "" },
            name,
            params
        );
        if let Some(ret) = parsed.field_text(node, "return_type") {
            signature.push_str(" -> ");
            signature.push_str(&collapse_whitespace(ret));
        }

        let chunk = Chunk::new(
            file_path,
            ChunkKind::Function,
            Some(name.to_string()),
            line_start,
            line_end,
            extract_lines(parsed.source(), line_start, line_end),
        )
        .with_signature(Some(signature))
        .with_docstring(body_docstring(parsed, node));

        Some(chunk)
    }

    fn class_chunk(&self, parsed: &ParsedCode, node: Node, file_path: &str) -> Option<Chunk> {
        let name = parsed.field_text(node, "name")?;
        let (line_start, line_end) = node_span(node);

        let bases: Vec<String> = node
            .child_by_field_name("superclasses")
            .map(|args| {
                let mut cursor = args.walk();
                args.named_children(&mut cursor)
                    .filter(|n| n.kind() != "keyword_argument" && n.kind() != "comment")
                    .map(|n| collapse_whitespace(parsed.node_text(n)))
                    .collect()
            })
            .unwrap_or_default();

        let mut methods = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                let item = unwrap_decorated(item);
                if item.kind() == "function_definition" {
                    if let Some(method) = parsed.field_text(item, "name") {
                        methods.push(method.to_string());
                    }
                }
            }
        }

        let mut signature = format!("class {}", name);
        if !bases.is_empty() {
            signature.push_str(&format!("({})", bases.join(", ")));
        }

        let docstring = body_docstring(parsed, node);
        let summary = json!({
            "name": name,
            "methods": methods,
            "inheritance": bases,
            "docstring": docstring.clone(),
        });

        let chunk = Chunk::new(
            file_path,
            ChunkKind::Class,
            Some(name.to_string()),
            line_start,
            line_end,
            serde_json::to_string_pretty(&summary).unwrap_or_default(),
        )
        .with_signature(Some(signature))
        .with_docstring(docstring);

        Some(chunk)
    }
}

impl Default for PythonChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for PythonChunker {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &["py", "pyw", "pyi"]
    }

    fn chunk(&self, file_path: &str, content: &str) -> Result<Vec<Chunk>> {
        let mut parser = CodeParser::new();
        let parsed = parser.parse(Language::Python, content)?;

        if parsed.has_errors() {
            let line = parsed
                .first_error()
                .map(|n| n.start_position().row + 1)
                .unwrap_or(1);
            return Ok(vec![Chunk::error(
                file_path,
                "syntax_error",
                format!("Syntax error: invalid syntax ({}, line {})", file_path, line),
            )]);
        }

        let mut chunks = vec![self.overview(&parsed, file_path)];

        let mut declarations = Vec::new();
        walk_tree(parsed.root_node(), &mut |node| match node.kind() {
            "function_definition" => declarations.push(node),
            // Nested classes are covered by their enclosing class
            "class_definition" if node.start_position().column == 0 => declarations.push(node),
            _ => {}
        });

        for node in declarations {
            let chunk = match node.kind() {
                "function_definition" => self.function_chunk(&parsed, node, file_path),
                _ => self.class_chunk(&parsed, node, file_path),
            };
            chunks.extend(chunk);
        }

        Ok(chunks)
    }
}

/// The definition inside a `decorated_definition`, or the node itself
fn unwrap_decorated(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

/// 1-indexed inclusive span, widened to cover decorators
fn node_span(node: Node) -> (usize, usize) {
    let start_node = match node.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => parent,
        _ => node,
    };
    let start = start_node.start_position().row + 1;

    let end_pos = node.end_position();
    // A node ending at column 0 finished on the previous line
    let end = if end_pos.column == 0 && end_pos.row > start_node.start_position().row {
        end_pos.row
    } else {
        end_pos.row + 1
    };

    (start, end.max(start))
}

/// Docstring literal opening a function or class body
fn body_docstring(parsed: &ParsedCode, node: Node) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    Some(strip_string_quotes(parsed.node_text(literal)))
}

fn strip_string_quotes(literal: &str) -> String {
    let unprefixed = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if unprefixed.len() >= 2 * quote.len()
            && unprefixed.starts_with(quote)
            && unprefixed.ends_with(quote)
        {
            return unprefixed[quote.len()..unprefixed.len() - quote.len()].to_string();
        }
    }
    unprefixed.to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(source: &str) -> Vec<Chunk> {
        PythonChunker::new().chunk("pkg/mod.py", source).unwrap()
    }

    #[test]
    fn test_overview_first() {
        let source = "import os\nimport numpy as np\nfrom typing import List\n\ndef foo():\n    pass\n\nclass Bar:\n    pass\n";
        let chunks = chunk(source);

        assert_eq!(chunks[0].kind, ChunkKind::FileOverview);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("file_overview"));
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 10);

        let summary: serde_json::Value = serde_json::from_str(&chunks[0].content).unwrap();
        assert_eq!(summary["file_type"], "python");
        assert_eq!(summary["imports"], json!(["os", "numpy", "typing"]));
        assert_eq!(summary["functions"], json!(["foo"]));
        assert_eq!(summary["classes"], json!(["Bar"]));
        assert_eq!(summary["total_lines"], 10);
    }

    #[test]
    fn test_function_chunk() {
        let source = "def add(a: int, b: int) -> int:\n    \"\"\"Add two numbers.\"\"\"\n    return a + b\n";
        let chunks = chunk(source);
        let func = &chunks[1];

        assert_eq!(func.kind, ChunkKind::Function);
        assert_eq!(func.symbol_name.as_deref(), Some("add"));
        assert_eq!((func.line_start, func.line_end), (1, 3));
        assert_eq!(func.signature.as_deref(), Some("def add(a: int, b: int) -> int"));
        assert_eq!(func.docstring.as_deref(), Some("Add two numbers."));
        assert!(func.content.contains("return a + b"));
    }

    #[test]
    fn test_async_and_decorated_function() {
        let source = "@app.get('/')\nasync def handler(req):\n    return req\n";
        let chunks = chunk(source);
        let func = &chunks[1];

        assert_eq!(func.signature.as_deref(), Some("async def handler(req)"));
        assert_eq!((func.line_start, func.line_end), (1, 3));
        assert!(func.content.starts_with("@app.get"));
    }

    #[test]
    fn test_class_and_methods() {
        let source = "class Bar(Base, metaclass=Meta):\n    \"\"\"A bar.\"\"\"\n\n    def go(self):\n        pass\n\n    async def stop(self):\n        pass\n";
        let chunks = chunk(source);

        let class = chunks.iter().find(|c| c.kind == ChunkKind::Class).unwrap();
        assert_eq!(class.signature.as_deref(), Some("class Bar(Base)"));
        assert_eq!((class.line_start, class.line_end), (1, 8));
        let summary: serde_json::Value = serde_json::from_str(&class.content).unwrap();
        assert_eq!(summary["methods"], json!(["go", "stop"]));
        assert_eq!(summary["inheritance"], json!(["Base"]));
        assert_eq!(summary["docstring"], "A bar.");

        let methods: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind == ChunkKind::Function)
            .filter_map(|c| c.symbol_name.as_deref())
            .collect();
        assert_eq!(methods, vec!["go", "stop"]);
    }

    #[test]
    fn test_nested_class_not_chunked() {
        let source = "class Outer:\n    class Inner:\n        pass\n";
        let chunks = chunk(source);
        let classes: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Class).collect();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].symbol_name.as_deref(), Some("Outer"));
    }

    #[test]
    fn test_syntax_error_chunk() {
        let chunks = chunk("def broken(:\n    pass\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Error);
        assert_eq!(chunks[0].symbol_name.as_deref(), Some("syntax_error"));
        assert!(chunks[0].content.starts_with("Syntax error"));
        assert_eq!((chunks[0].line_start, chunks[0].line_end), (1, 1));
    }

    #[test]
    fn test_strip_string_quotes() {
        assert_eq!(strip_string_quotes("\"\"\"doc\"\"\""), "doc");
        assert_eq!(strip_string_quotes("r'raw'"), "raw");
        assert_eq!(strip_string_quotes("\"x\""), "x");
    }
}
