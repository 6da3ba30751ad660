//! Size policy shared by the code and markdown chunkers.
//!
//! A chunk grows line by line. It is closed at a natural split point once it
//! holds at least 70% of the target size, or forced closed once it exceeds the
//! maximum size. Every chunk after the first starts with the last
//! `overlap / 50` lines (at least one) of its predecessor.

use super::{ChunkOutput, Symbol};
use crate::config::ChunkingConfig;

/// Rough characters-per-line used to turn the overlap budget into lines.
const OVERLAP_CHARS_PER_LINE: usize = 50;

/// Language-specific boundary detection plugged into [`split_lines`].
pub trait SplitRules {
    /// Whether the chunk may end right before `line` (state reflects all
    /// previously observed lines).
    fn is_split_point(&self, line: &str) -> bool;

    /// Feed a line that has just been appended to the current chunk.
    fn observe(&mut self, line: &str);

    /// Lines preferred as the last line of a forced split.
    fn is_forced_boundary(&self, line: &str) -> bool;

    /// Symbol for a chunk, given its non-overlap lines.
    fn symbol(&self, fresh_lines: &[&str]) -> Option<Symbol>;
}

pub fn split_lines<R: SplitRules>(
    content: &str,
    rules: &mut R,
    config: &ChunkingConfig,
) -> Vec<ChunkOutput> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return vec![whole_file(content, 0)];
    }

    // offsets[i] = size of lines[..i], counting one newline per line
    let mut offsets = Vec::with_capacity(lines.len() + 1);
    offsets.push(0usize);
    for line in &lines {
        let last = *offsets.last().unwrap_or(&0);
        offsets.push(last + line.chars().count() + 1);
    }
    let size = |from: usize, to: usize| offsets[to + 1] - offsets[from];

    let overlap_lines = (config.overlap / OVERLAP_CHARS_PER_LINE).max(1);
    let min_split = config.target_size * 7 / 10;

    let mut chunks = Vec::new();
    // Current chunk spans lines[start..], of which lines[fresh..] are new.
    let mut start = 0usize;
    let mut fresh = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if i > fresh && rules.is_split_point(line) && size(start, i - 1) >= min_split {
            chunks.push(build_chunk(&lines, rules, start, fresh, i - 1));
            start = seed_start(start, i, overlap_lines);
            fresh = i;
        }

        rules.observe(line);

        if i >= fresh && size(start, i) > config.max_size {
            let mid = start + (i - start) / 2;
            let cut = (mid.max(fresh)..=i)
                .rev()
                .find(|&j| rules.is_forced_boundary(lines[j]))
                .unwrap_or(i);
            chunks.push(build_chunk(&lines, rules, start, fresh, cut));
            start = seed_start(start, cut + 1, overlap_lines);
            fresh = cut + 1;
        }
    }

    if fresh < lines.len() {
        chunks.push(build_chunk(&lines, rules, start, fresh, lines.len() - 1));
    }

    if chunks.is_empty() {
        return vec![whole_file(content, lines.len())];
    }
    chunks
}

/// First line of the next chunk: the last `overlap` lines of the previous one,
/// never reaching back to the previous chunk's own first line.
fn seed_start(prev_start: usize, next_fresh: usize, overlap: usize) -> usize {
    next_fresh.saturating_sub(overlap).max(prev_start + 1).min(next_fresh)
}

fn build_chunk<R: SplitRules>(
    lines: &[&str],
    rules: &R,
    start: usize,
    fresh: usize,
    end: usize,
) -> ChunkOutput {
    ChunkOutput {
        content: lines[start..=end].join("\n"),
        start_line: start + 1,
        end_line: end + 1,
        fresh_line: fresh + 1,
        symbol: rules.symbol(&lines[fresh..=end]),
    }
}

fn whole_file(content: &str, line_count: usize) -> ChunkOutput {
    ChunkOutput {
        content: content.to_string(),
        start_line: 1,
        end_line: line_count.max(1),
        fresh_line: 1,
        symbol: None,
    }
}
