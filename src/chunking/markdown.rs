//! Heading-aware markdown chunking.

use regex::Regex;
use std::sync::LazyLock;

use super::splitter::{split_lines, SplitRules};
use super::{ChunkOutput, Symbol, SymbolKind};
use crate::config::ChunkingConfig;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,3})\s+(?P<title>.*?)\s*#*\s*$").unwrap_or_else(|e| panic!("heading pattern: {e}"))
});

pub fn chunk_markdown(content: &str, config: &ChunkingConfig) -> Vec<ChunkOutput> {
    let mut rules = MarkdownRules::default();
    split_lines(content, &mut rules, config)
}

#[derive(Default)]
struct MarkdownRules {
    /// Inside a ``` or ~~~ fenced block, where `#` lines are code, not headings
    in_fence: bool,
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn heading_title(line: &str) -> Option<String> {
    HEADING
        .captures(line)
        .map(|caps| caps["title"].to_string())
        .filter(|title| !title.is_empty())
}

impl SplitRules for MarkdownRules {
    fn is_split_point(&self, line: &str) -> bool {
        !self.in_fence && heading_title(line).is_some()
    }

    fn observe(&mut self, line: &str) {
        if is_fence(line) {
            self.in_fence = !self.in_fence;
        }
    }

    fn is_forced_boundary(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || is_fence(line) || trimmed == "---"
    }

    fn symbol(&self, fresh_lines: &[&str]) -> Option<Symbol> {
        let first = fresh_lines.iter().find(|l| !l.trim().is_empty())?;
        heading_title(first).map(|name| Symbol {
            name,
            kind: SymbolKind::Section,
        })
    }
}
