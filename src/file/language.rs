use std::path::Path;

/// Languages the indexer recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Json,
    Yaml,
    Toml,
    Unknown,
}

/// How declaration bodies are delimited in a language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    /// Body extent follows indentation (Python)
    Indentation,
    /// Body extent follows matching braces (JS/TS)
    Brace,
    /// No declaration structure
    Plain,
}

impl Language {
    /// Detect language from file extension
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        Self::from_extension(extension)
    }

    /// Detect language from extension string
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" | "pyw" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            _ => Self::Unknown,
        }
    }

    pub fn family(&self) -> LanguageFamily {
        match self {
            Self::Python => LanguageFamily::Indentation,
            Self::JavaScript | Self::TypeScript => LanguageFamily::Brace,
            _ => LanguageFamily::Plain,
        }
    }

    /// Get the language name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Unknown => "text",
        }
    }
}

/// True for `.jsx`/`.tsx` sources
pub fn is_react_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsx") | Some("tsx")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_python_detection() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(
            Language::from_path(&PathBuf::from("pkg/mod.py")),
            Language::Python
        );
    }

    #[test]
    fn test_script_detection() {
        assert_eq!(Language::from_extension("jsx"), Language::JavaScript);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("TS"), Language::TypeScript);
        assert_eq!(Language::from_extension("rs"), Language::Unknown);
    }

    #[test]
    fn test_families() {
        assert_eq!(Language::Python.family(), LanguageFamily::Indentation);
        assert_eq!(Language::TypeScript.family(), LanguageFamily::Brace);
        assert_eq!(Language::Yaml.family(), LanguageFamily::Plain);
        assert_eq!(Language::Unknown.name(), "text");
    }

    #[test]
    fn test_react_source() {
        assert!(is_react_source(Path::new("App.tsx")));
        assert!(!is_react_source(Path::new("App.ts")));
    }
}
