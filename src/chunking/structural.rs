//! Declaration-aware code chunking.
//!
//! Nesting is tracked with brace/paren/bracket counters and an in-string flag
//! toggled by `"`, `'` and `` ` ``. There is no escape or comment awareness, so
//! an unterminated quote (an apostrophe in a comment, a Rust lifetime) keeps
//! the flag set for the rest of the file and freezes the counters where they
//! were. Natural splits then still happen only if the counters froze at zero.

use super::patterns::{patterns_for, LanguagePatterns};
use super::splitter::{split_lines, SplitRules};
use super::{ChunkOutput, Language, Symbol};
use crate::config::ChunkingConfig;

pub fn chunk_code(content: &str, language: Language, config: &ChunkingConfig) -> Vec<ChunkOutput> {
    let mut rules = CodeRules::new(patterns_for(language));
    split_lines(content, &mut rules, config)
}

/// Running nesting state of the scanned prefix of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nesting {
    pub braces: u32,
    pub parens: u32,
    pub brackets: u32,
    pub in_string: Option<char>,
}

impl Nesting {
    pub fn scan(&mut self, line: &str) {
        for c in line.chars() {
            if let Some(quote) = self.in_string {
                if c == quote {
                    self.in_string = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => self.in_string = Some(c),
                '{' => self.braces += 1,
                '}' => self.braces = self.braces.saturating_sub(1),
                '(' => self.parens += 1,
                ')' => self.parens = self.parens.saturating_sub(1),
                '[' => self.brackets += 1,
                ']' => self.brackets = self.brackets.saturating_sub(1),
                _ => {}
            }
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.braces == 0 && self.parens == 0 && self.brackets == 0
    }
}

struct CodeRules {
    patterns: &'static LanguagePatterns,
    nesting: Nesting,
    after_preamble: bool,
}

impl CodeRules {
    fn new(patterns: &'static LanguagePatterns) -> Self {
        Self {
            patterns,
            nesting: Nesting::default(),
            after_preamble: false,
        }
    }
}

impl SplitRules for CodeRules {
    fn is_split_point(&self, line: &str) -> bool {
        !self.after_preamble && self.nesting.is_balanced() && self.patterns.declaration.is_match(line)
    }

    fn observe(&mut self, line: &str) {
        // Only top-level preamble lines glue onto the next declaration
        let top_level = self.nesting.is_balanced();
        self.nesting.scan(line);
        self.after_preamble = top_level && self.patterns.is_preamble(line);
    }

    fn is_forced_boundary(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed == "}"
    }

    fn symbol(&self, fresh_lines: &[&str]) -> Option<Symbol> {
        let first = fresh_lines
            .iter()
            .find(|l| !l.trim().is_empty() && !self.patterns.is_preamble(l))?;
        self.patterns.symbol(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::SymbolKind;

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            target_size: 1000,
            max_size: 2000,
            overlap: 150,
        }
    }

    /// A TypeScript function of `body_lines` statement lines plus header/footer.
    fn ts_function(name: &str, body_lines: usize) -> String {
        let mut out = format!("export function {name}(input: number): number {{\n");
        for i in 0..body_lines {
            out.push_str(&format!("    const value{i} = input * {i} + {i} + {i};\n"));
        }
        out.push_str("    return input;\n}\n");
        out
    }

    fn nesting_after(lines: &[&str]) -> Nesting {
        let mut nesting = Nesting::default();
        for line in lines {
            nesting.scan(line);
        }
        nesting
    }

    #[test]
    fn test_nesting_tracks_all_three_counters() {
        let nesting = nesting_after(&["fn a(x: [u8; 2]) {", "    call(vec![1, 2]);"]);
        assert_eq!(nesting.braces, 1);
        assert_eq!(nesting.parens, 0);
        assert_eq!(nesting.brackets, 0);
        assert!(nesting_after(&["fn a() {", "}"]).is_balanced());
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let nesting = nesting_after(&[r#"let s = "{ not a block";"#]);
        assert!(nesting.is_balanced());
        assert_eq!(nesting.in_string, None);
    }

    #[test]
    fn test_unterminated_string_freezes_tracking() {
        let nesting = nesting_after(&["let s = \"oops", "fn later() {", "}"]);
        assert_eq!(nesting.in_string, Some('"'));
        assert_eq!(nesting.braces, 0);
    }

    #[test]
    fn test_splits_between_top_level_functions() {
        let content = format!("{}{}{}", ts_function("alpha", 30), ts_function("beta", 30), ts_function("gamma", 30));
        let chunks = chunk_code(&content, Language::TypeScript, &config());
        assert_eq!(chunks.len(), 3);
        let names: Vec<_> = chunks
            .iter()
            .map(|c| c.symbol.as_ref().map(|s| s.name.clone()).unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert!(chunks.iter().all(|c| c.symbol.as_ref().unwrap().kind == SymbolKind::Function));
    }

    #[test]
    fn test_never_splits_inside_a_body() {
        // Column-0 declarations nested inside a class body are not split points
        let mut content = String::from("export class Outer {\n");
        for i in 0..30 {
            content.push_str(&format!("function inner{i}() {{ return {i}; }}\n"));
        }
        content.push_str("}\n");
        content.push_str(&ts_function("after", 5));
        let chunks = chunk_code(&content, Language::TypeScript, &config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].end_line, 32);
        assert_eq!(chunks[1].symbol.as_ref().unwrap().name, "after");
    }

    #[test]
    fn test_natural_splits_end_balanced() {
        let content = format!(
            "{}{}{}{}",
            ts_function("one", 25),
            ts_function("two", 25),
            ts_function("three", 25),
            ts_function("four", 25)
        );
        let lines: Vec<&str> = content.lines().collect();
        let chunks = chunk_code(&content, Language::TypeScript, &config());
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(nesting_after(&lines[..chunk.end_line]).is_balanced());
        }
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let content = format!("{}{}", ts_function("alpha", 30), ts_function("beta", 30));
        let chunks = chunk_code(&content, Language::TypeScript, &config());
        assert_eq!(chunks.len(), 2);
        // overlap 150 chars = 3 lines
        assert_eq!(chunks[1].fresh_line - chunks[1].start_line, 3);
        assert!(chunks[1].content.starts_with("    const value29"));
    }

    #[test]
    fn test_coverage_of_all_lines() {
        let content = (0..12)
            .map(|i| ts_function(&format!("f{i}"), 8 + i * 3))
            .collect::<String>();
        let line_count = content.lines().count();
        let chunks = chunk_code(&content, Language::TypeScript, &config());
        let mut next = 1;
        for chunk in &chunks {
            assert!(chunk.start_line <= next);
            assert_eq!(chunk.fresh_line, next);
            next = chunk.end_line + 1;
        }
        assert_eq!(next, line_count + 1);
    }

    #[test]
    fn test_oversized_body_is_force_split_at_closing_brace_or_blank() {
        let mut content = String::from("fn huge() {\n");
        for block in 0..8 {
            content.push_str("    {\n");
            for i in 0..8 {
                content.push_str(&format!("        let v{block}_{i} = compute({i});\n"));
            }
            content.push_str("    }\n\n");
        }
        content.push_str("}\n");
        let chunks = chunk_code(&content, Language::Rust, &config());
        assert!(chunks.len() > 1);
        let lines: Vec<&str> = content.lines().collect();
        for chunk in &chunks[..chunks.len() - 1] {
            let last = lines[chunk.end_line - 1].trim();
            assert!(last.is_empty() || last == "}", "forced split ended at {last:?}");
        }
    }

    #[test]
    fn test_rust_attribute_stays_with_item() {
        let body = "    let x = 1;\n".repeat(50);
        let content = format!(
            "fn first() {{\n{body}}}\n#[derive(Debug)]\npub struct Second {{\n    field: u32,\n}}\n"
        );
        let chunks = chunk_code(&content, Language::Rust, &config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].fresh_line, 53);
        let symbol = chunks[1].symbol.as_ref().unwrap();
        assert_eq!(symbol.name, "Second");
        assert_eq!(symbol.kind, SymbolKind::Struct);
    }

    #[test]
    fn test_python_decorator_stays_with_function() {
        let body = "    total = total + 1\n".repeat(40);
        let content = format!("def first():\n{body}\n@cached\ndef second():\n    return 2\n");
        let chunks = chunk_code(&content, Language::Python, &config());
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].content.contains("@cached\ndef second"));
        assert_eq!(chunks[1].symbol.as_ref().unwrap().name, "second");
    }

    #[test]
    fn test_unknown_language_uses_generic_pattern() {
        let body = "  x = x + 1\n".repeat(70);
        let content = format!("function a\n{body}function b\n  y = 2\n");
        let chunks = chunk_code(&content, Language::Unknown, &config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].fresh_line, 72);
    }
}
