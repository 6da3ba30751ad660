//! Structural chunking: splits file content into overlapping, boundary-aware
//! chunks with 1-based line ranges and optional symbol metadata.
//!
//! Code is split between complete top-level declarations (tracked with a
//! brace/paren/bracket/string heuristic, not a parser); markdown is split at
//! headings. Both share the size policy in [`splitter`].

pub mod markdown;
pub mod patterns;
pub mod splitter;
pub mod structural;

use serde::{Deserialize, Serialize};

use crate::config::ChunkingConfig;

/// Output of the chunking process.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub content: String,
    /// 1-based start line in the source file.
    pub start_line: usize,
    /// 1-based inclusive end line in the source file.
    pub end_line: usize,
    /// First line of this chunk that is not overlap carried over from the
    /// previous chunk.
    pub fresh_line: usize,
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Struct,
    Interface,
    Trait,
    Enum,
    Type,
    Impl,
    Module,
    /// Markdown heading
    Section,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Enum => "enum",
            SymbolKind::Type => "type",
            SymbolKind::Impl => "impl",
            SymbolKind::Module => "module",
            SymbolKind::Section => "section",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "function" => SymbolKind::Function,
            "class" => SymbolKind::Class,
            "struct" => SymbolKind::Struct,
            "interface" => SymbolKind::Interface,
            "trait" => SymbolKind::Trait,
            "enum" => SymbolKind::Enum,
            "type" => SymbolKind::Type,
            "impl" => SymbolKind::Impl,
            "module" => SymbolKind::Module,
            "section" => SymbolKind::Section,
            _ => return None,
        })
    }
}

/// Language hints understood by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
    Kotlin,
    CSharp,
    C,
    Cpp,
    Ruby,
    Php,
    Swift,
    Markdown,
    Unknown,
}

impl Language {
    /// Map a file extension / language name string to a Language variant.
    pub fn from_str(lang: &str) -> Self {
        match lang.to_lowercase().as_str() {
            "typescript" | "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "javascript" | "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "python" | "py" | "pyi" => Language::Python,
            "rust" | "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "kotlin" | "kt" | "kts" => Language::Kotlin,
            "csharp" | "c#" | "cs" => Language::CSharp,
            "c" | "h" => Language::C,
            "cpp" | "c++" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "ruby" | "rb" => Language::Ruby,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "markdown" | "md" | "mdx" => Language::Markdown,
            _ => Language::Unknown,
        }
    }
}

/// Chunk a file's content. Markdown gets heading-aware splitting, everything
/// else the declaration-aware code splitter (with a generic declaration
/// pattern for unrecognised languages).
pub fn chunk_content(content: &str, language: &str, config: &ChunkingConfig) -> Vec<ChunkOutput> {
    match Language::from_str(language) {
        Language::Markdown => markdown::chunk_markdown(content, config),
        lang => structural::chunk_code(content, lang, config),
    }
}
