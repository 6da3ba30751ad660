//! Which files of a repository get indexed.
//!
//! Exclusion is loose: patterns containing `*` become unanchored
//! wildcard regexes, every other pattern is a plain substring test against the
//! repository-relative path.

use anyhow::{Context, Result};
use regex::Regex;

/// Always excluded: build output, dependency trees, lockfiles, minified
/// assets and VCS metadata.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules/",
    "dist/",
    "build/",
    "target/",
    ".git/",
    "vendor/",
    "__pycache__/",
    ".next/",
    "coverage/",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "*.min.js",
    "*.min.css",
    "*.map",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "psd", "pdf", "zip", "tar", "gz",
    "tgz", "bz2", "xz", "7z", "rar", "jar", "war", "class", "exe", "dll", "so", "dylib", "a", "o",
    "obj", "lib", "bin", "wasm", "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "wav", "ogg",
    "flac", "mov", "avi", "webm", "mkv", "sqlite", "db", "pyc", "pyo", "node", "dat", "pack",
];

#[derive(Debug)]
enum Pattern {
    Substring(String),
    Wildcard(Regex),
}

impl Pattern {
    fn compile(pattern: &str) -> Result<Self> {
        if pattern.contains('*') {
            let body = pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let regex = Regex::new(&body).with_context(|| format!("Invalid exclude pattern {pattern}"))?;
            Ok(Pattern::Wildcard(regex))
        } else {
            Ok(Pattern::Substring(pattern.to_string()))
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Substring(s) => path.contains(s.as_str()),
            Pattern::Wildcard(re) => re.is_match(path),
        }
    }
}

#[derive(Debug)]
pub struct ExcludeMatcher {
    patterns: Vec<Pattern>,
}

impl ExcludeMatcher {
    pub fn new<S: AsRef<str>>(patterns: impl IntoIterator<Item = S>) -> Result<Self> {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .map(|p| Pattern::compile(&p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Defaults, then `.gitignore` entries, then caller patterns.
    pub fn with_defaults(gitignore: &[String], extra: &[String]) -> Result<Self> {
        let all = DEFAULT_EXCLUDES
            .iter()
            .map(|s| s.to_string())
            .chain(gitignore.iter().cloned())
            .chain(extra.iter().cloned());
        Self::new(all)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// Usable patterns from a `.gitignore` file. Comments, blank lines and
/// negations are dropped; a leading `/` anchor is stripped.
pub fn parse_gitignore(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .map(|l| l.trim_start_matches('/').to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Per-run file selection: root path restriction, exclusion and binary
/// classification.
#[derive(Debug)]
pub struct FileFilter {
    root_path: Option<String>,
    excludes: ExcludeMatcher,
    max_file_bytes: u64,
}

impl FileFilter {
    pub fn new(root_path: Option<String>, excludes: ExcludeMatcher, max_file_bytes: u64) -> Self {
        Self {
            root_path,
            excludes,
            max_file_bytes,
        }
    }

    /// Whether `path` belongs in the tree at all.
    pub fn admits(&self, path: &str) -> bool {
        let in_root = match &self.root_path {
            Some(root) => path == root || path.starts_with(&format!("{root}/")),
            None => true,
        };
        in_root && !self.excludes.is_excluded(path)
    }

    /// Binary files stay in the tree but are never fetched or chunked.
    pub fn is_binary(&self, path: &str, size: u64) -> bool {
        size > self.max_file_bytes || has_binary_extension(path)
    }
}

fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_lowercase())
}

pub fn has_binary_extension(path: &str) -> bool {
    extension(path).is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
}

/// Language name for a path, by extension or well-known file name.
pub fn detect_language(path: &str) -> Option<&'static str> {
    let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    match name.as_str() {
        "dockerfile" => return Some("dockerfile"),
        "makefile" | "gnumakefile" => return Some("make"),
        "cmakelists.txt" => return Some("cmake"),
        "gemfile" | "rakefile" => return Some("ruby"),
        "readme" => return Some("markdown"),
        _ => {}
    }

    let lang = match extension(path)?.as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "mts" | "cts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "cs" => "csharp",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "lua" => "lua",
        "sh" | "bash" | "zsh" | "fish" => "shell",
        "sql" => "sql",
        "html" | "htm" => "html",
        "css" | "scss" | "less" => "css",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "md" | "mdx" | "markdown" => "markdown",
        "rst" | "txt" => "text",
        "proto" => "protobuf",
        "graphql" | "gql" => "graphql",
        "vue" => "vue",
        "svelte" => "svelte",
        "zig" => "zig",
        "dart" => "dart",
        "ex" | "exs" => "elixir",
        "hs" => "haskell",
        "clj" | "cljs" => "clojure",
        "tf" | "hcl" => "hcl",
        "nix" => "nix",
        _ => return None,
    };
    Some(lang)
}
