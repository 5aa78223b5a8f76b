use crate::file::Language;
use anyhow::{anyhow, Result};
use tree_sitter::{Language as TsLanguage, Node, Parser, Tree};

/// Compiled-in grammar for a language, if one is bundled
pub fn grammar_for(language: Language) -> Option<TsLanguage> {
    match language {
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        _ => None,
    }
}

/// Wrapper around tree-sitter parser with language support
pub struct CodeParser {
    parser: Parser,
}

impl CodeParser {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Parse source code for a given language
    pub fn parse(&mut self, language: Language, source: &str) -> Result<ParsedCode> {
        let grammar = grammar_for(language)
            .ok_or_else(|| anyhow!("No grammar available for {}", language.name()))?;

        self.parser
            .set_language(&grammar)
            .map_err(|e| anyhow!("Failed to set language: {}", e))?;

        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("Failed to parse source code"))?;

        Ok(ParsedCode {
            tree,
            source: source.to_string(),
        })
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents parsed code with its AST
pub struct ParsedCode {
    tree: Tree,
    source: String,
}

impl ParsedCode {
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Text covered by a node; empty when the range is not valid UTF-8
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Text of a named field child, if present
    pub fn field_text(&self, node: Node, field: &str) -> Option<&str> {
        node.child_by_field_name(field).map(|n| self.node_text(n))
    }

    pub fn has_errors(&self) -> bool {
        self.root_node().has_error()
    }

    /// Find the first node (pre-order) of an error or missing kind
    pub fn first_error(&self) -> Option<Node<'_>> {
        let mut found = None;
        walk_tree(self.root_node(), &mut |node| {
            if found.is_none() && (node.is_error() || node.is_missing()) {
                found = Some(node);
            }
        });
        found
    }
}

/// Walk the entire tree, calling a function for each node
pub fn walk_tree<'t, F>(node: Node<'t>, callback: &mut F)
where
    F: FnMut(Node<'t>),
{
    callback(node);

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_tree(child, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_python_code() {
        let mut parser = CodeParser::new();
        let source = "def hello():\n    print(\"Hello, world!\")\n";

        let parsed = parser.parse(Language::Python, source).unwrap();
        assert!(!parsed.has_errors());
        assert!(parsed.first_error().is_none());
    }

    #[test]
    fn test_walk_tree_is_preorder() {
        let mut parser = CodeParser::new();
        let source = "def foo(): pass\ndef bar(): pass\nclass C:\n    def baz(self): pass\n";

        let parsed = parser.parse(Language::Python, source).unwrap();
        let mut names = Vec::new();
        walk_tree(parsed.root_node(), &mut |node| {
            if node.kind() == "function_definition" {
                names.extend(parsed.field_text(node, "name"));
            }
        });

        assert_eq!(names, vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn test_parse_unsupported_language() {
        let mut parser = CodeParser::new();
        assert!(parser.parse(Language::Yaml, "a: 1").is_err());
    }

    #[test]
    fn test_parse_with_syntax_error() {
        let mut parser = CodeParser::new();
        let parsed = parser.parse(Language::Python, "def incomplete(:\n").unwrap();
        // Parser succeeds but marks the tree as having errors
        assert!(parsed.has_errors());
    }
}
