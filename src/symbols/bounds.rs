use crate::file::{Language, LanguageFamily};

/// Inclusive 0-based line range of the declaration starting at `start_idx`
///
/// Indentation languages follow the body's indentation, brace languages
/// follow brace depth. Anything else spans the single start line. The
/// language alone picks the strategy: functions, classes and interfaces of
/// one language are delimited the same way, so no declaration kind is taken.
pub fn find_symbol_bounds(lines: &[&str], start_idx: usize, language: Language) -> (usize, usize) {
    if lines.is_empty() {
        return (0, 0);
    }
    let start_idx = start_idx.min(lines.len() - 1);

    match language.family() {
        LanguageFamily::Indentation => indentation_bounds(lines, start_idx),
        LanguageFamily::Brace => brace_bounds(lines, start_idx, 0),
        LanguageFamily::Plain => (start_idx, start_idx),
    }
}

fn leading_indent(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn is_decorator(line: &str) -> bool {
    line.trim_start().starts_with('@')
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn indentation_bounds(lines: &[&str], start_idx: usize) -> (usize, usize) {
    let n = lines.len();

    let mut start = start_idx;
    while start > 0 && is_decorator(lines[start - 1]) {
        start -= 1;
    }

    // Called on a decorator line: the baseline belongs to the declaration below
    let mut decl = start_idx;
    while decl < n && is_decorator(lines[decl]) {
        decl += 1;
    }
    if decl == n {
        decl = start_idx;
    }

    let base_indent = leading_indent(lines[decl]);
    let header_end = header_end(lines, decl);

    for (i, line) in lines.iter().enumerate().skip(header_end + 1) {
        if is_blank_or_comment(line) {
            continue;
        }
        if leading_indent(line) <= base_indent {
            return (start, i - 1);
        }
    }

    (start, n - 1)
}

/// Last line of a signature whose brackets span several lines
fn header_end(lines: &[&str], decl: usize) -> usize {
    let mut depth: i32 = 0;
    for (i, line) in lines.iter().enumerate().skip(decl) {
        depth += bracket_delta(line);
        if depth <= 0 {
            return i;
        }
    }
    decl
}

/// Net bracket depth change of one Python line, outside strings and comments
fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '#' => break,
                '\'' | '"' => quote = Some(c),
                '(' | '[' => delta += 1,
                ')' | ']' => delta -= 1,
                _ => {}
            },
        }
    }
    delta
}

/// Brace-depth bounds, scanning from `column` of the start line
pub(crate) fn brace_bounds(lines: &[&str], start_idx: usize, column: usize) -> (usize, usize) {
    let mut scanner = BraceScanner::new();

    for (i, line) in lines.iter().enumerate().skip(start_idx) {
        let text = if i == start_idx {
            line.get(column..).unwrap_or(line)
        } else {
            line
        };
        match scanner.scan_line(text) {
            LineScan::Pending => continue,
            LineScan::Closed | LineScan::Terminated => return (start_idx, i),
        }
    }

    (start_idx, lines.len() - 1)
}

/// Result of feeding one line to a [`BraceScanner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineScan {
    /// Declaration continues on the next line
    Pending,
    /// Depth returned to zero on this line
    Closed,
    /// Declaration ended without ever opening a brace
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    Str(char),
    BlockComment,
}

/// Line-oriented brace counter that ignores braces in strings and comments
///
/// Template literals and block comments carry over line breaks; quoted
/// strings end at the end of their line. Until the body opens, braces
/// inside parentheses (destructured or defaulted parameters) are skipped.
#[derive(Debug)]
pub struct BraceScanner {
    state: ScanState,
    depth: usize,
    parens: usize,
    opened: bool,
}

impl BraceScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Code,
            depth: 0,
            parens: 0,
            opened: false,
        }
    }

    pub fn scan_line(&mut self, line: &str) -> LineScan {
        let mut chars = line.chars().peekable();
        let mut terminated = false;

        while let Some(c) = chars.next() {
            match self.state {
                ScanState::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        self.state = ScanState::Code;
                    }
                }
                ScanState::Str(quote) => {
                    if c == '\\' {
                        chars.next();
                    } else if c == quote {
                        self.state = ScanState::Code;
                    }
                }
                ScanState::Code => match c {
                    '/' if chars.peek() == Some(&'/') => break,
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        self.state = ScanState::BlockComment;
                    }
                    '\'' | '"' | '`' => self.state = ScanState::Str(c),
                    '(' if !self.opened => self.parens += 1,
                    ')' if !self.opened => self.parens = self.parens.saturating_sub(1),
                    '{' | '}' if !self.opened && self.parens > 0 => {}
                    '{' => {
                        self.opened = true;
                        self.depth += 1;
                    }
                    '}' if self.opened && self.depth > 0 => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            return LineScan::Closed;
                        }
                    }
                    ';' if !self.opened && self.parens == 0 => terminated = true,
                    _ => {}
                },
            }
        }

        if let ScanState::Str(quote) = self.state {
            if quote != '`' {
                self.state = ScanState::Code;
            }
        }

        if self.opened {
            LineScan::Pending
        } else if terminated || (self.parens == 0 && line.trim_end().ends_with(')')) {
            LineScan::Terminated
        } else {
            LineScan::Pending
        }
    }
}

impl Default for BraceScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(source: &str) -> Vec<&str> {
        source.lines().collect()
    }

    #[test]
    fn test_python_decorated_function() {
        let src = lines("@decorator\ndef foo(a, b):\n    return a + b\nx = 1\n");
        assert_eq!(find_symbol_bounds(&src, 1, Language::Python), (0, 2));
    }

    #[test]
    fn test_python_started_on_decorator() {
        let src = lines("@decorator\ndef foo(a, b):\n    return a + b\nx = 1\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::Python), (0, 2));
    }

    #[test]
    fn test_python_blank_and_comment_lines_in_body() {
        let src = lines("class A:\n    def f(self):\n\n        # note\n        pass\n\n    def g(self):\n        pass\n");
        assert_eq!(find_symbol_bounds(&src, 1, Language::Python), (1, 5));
        assert_eq!(find_symbol_bounds(&src, 0, Language::Python), (0, 7));
    }

    #[test]
    fn test_python_multiline_signature() {
        let src = lines("def foo(\n    a,\n    b,\n):\n    return a\nfoo(1, 2)\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::Python), (0, 4));
    }

    #[test]
    fn test_brace_function() {
        let src = lines("function foo() {\n  if (x) {\n    return 1;\n  }\n}\nlet y = 2;\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 4));
    }

    #[test]
    fn test_brace_single_line_declarations() {
        let src = lines("const f = (a) => a + 1;\nlet z = 3;\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::TypeScript), (0, 0));

        let src = lines("declare function foo(a: string)\nlet z = 3;\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::TypeScript), (0, 0));

        let src = lines("function f() { return 1; }\nf();\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 0));
    }

    #[test]
    fn test_braces_in_strings_and_comments_ignored() {
        let src = lines(
            "function foo() {\n  const s = \"}\";\n  // }\n  /* {\n  } */\n  const t = `${a}\n}`;\n  return s;\n}\nbar();\n",
        );
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 8));
    }

    #[test]
    fn test_unclosed_brace_runs_to_end() {
        let src = lines("function foo() {\n  return 1;\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 1));
    }

    #[test]
    fn test_plain_language_single_line() {
        let src = lines("a: 1\nb: 2\n");
        assert_eq!(find_symbol_bounds(&src, 1, Language::Yaml), (1, 1));
    }

    #[test]
    fn test_python_parens_inside_strings() {
        let src = lines("def f(s=\"(\"):\n    return 1\n\ndef g():\n    print(\")\")\n\nx = 1\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::Python), (0, 2));
        assert_eq!(find_symbol_bounds(&src, 3, Language::Python), (3, 5));

        let src = lines("def h(a=\"[\",  # (\n      b=1):\n    pass\nz = 2\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::Python), (0, 2));
    }

    #[test]
    fn test_destructured_parameters() {
        let src = lines("function App({ title }) {\n  const x = 1;\n  return title;\n}\nrender(App);\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 3));

        let src = lines("const Card = ({ body }) => {\n  return body;\n};\nexport default Card;\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 2));
    }

    #[test]
    fn test_default_object_parameter() {
        let src = lines(
            "function init(opts = {}) {\n  const a = opts.a;\n  return a;\n}\ninit();\n",
        );
        assert_eq!(find_symbol_bounds(&src, 0, Language::JavaScript), (0, 3));
        assert_eq!(brace_bounds(&src, 0, 0), (0, 3));
    }

    #[test]
    fn test_multiline_destructured_parameters() {
        let src = lines("function Form({\n  onSubmit,\n}) {\n  return onSubmit;\n}\n");
        assert_eq!(find_symbol_bounds(&src, 0, Language::TypeScript), (0, 4));
    }

    #[test]
    fn test_scan_from_column() {
        let src = lines("}; function foo() {\n  return 1;\n}\n");
        assert_eq!(brace_bounds(&src, 0, 3), (0, 2));
    }
}
