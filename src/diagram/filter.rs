use regex::Regex;
use std::collections::HashSet;

use super::{DiagramEdge, DiagramError, DiagramFilters, DiagramNode};

/// Compile a restricted glob: `**` matches anything, `*` anything but `/`.
/// The whole path must match.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, DiagramError> {
    let mut body = String::from("^");
    let mut rest = pattern;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("**") {
            body.push_str(".*");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('*') {
            body.push_str("[^/]*");
            rest = tail;
        } else {
            let end = rest.find('*').unwrap_or(rest.len());
            body.push_str(&regex::escape(&rest[..end]));
            rest = &rest[end..];
        }
    }
    body.push('$');
    Regex::new(&body).map_err(|_| DiagramError::InvalidPattern(pattern.to_string()))
}

struct Compiled {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    languages: HashSet<String>,
    max_depth: Option<usize>,
}

impl Compiled {
    fn new(filters: &DiagramFilters) -> Result<Self, DiagramError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, DiagramError> {
            patterns
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(glob_to_regex)
                .collect()
        };
        Ok(Self {
            include: compile(&filters.include)?,
            exclude: compile(&filters.exclude)?,
            languages: filters.languages.iter().map(|l| l.trim().to_lowercase()).collect(),
            max_depth: filters.max_depth,
        })
    }

    fn admits(&self, node: &DiagramNode) -> bool {
        // Pathless entities are matched by label
        let subject = node.path.as_deref().unwrap_or(&node.label);
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(subject)) {
            return false;
        }
        if self.exclude.iter().any(|re| re.is_match(subject)) {
            return false;
        }
        if self.max_depth.is_some_and(|max| node.depth > max) {
            return false;
        }
        if self.languages.is_empty() || node.kind == "directory" {
            return true;
        }
        node.language
            .as_deref()
            .is_some_and(|lang| self.languages.contains(&lang.to_lowercase()))
    }
}

/// Check that every pattern in `filters` compiles.
pub fn validate(filters: &DiagramFilters) -> Result<(), DiagramError> {
    Compiled::new(filters).map(|_| ())
}

/// Keep the nodes every filter admits, then the edges whose endpoints both
/// survived. Positions are left as laid out.
pub fn apply(
    nodes: Vec<DiagramNode>,
    edges: Vec<DiagramEdge>,
    filters: &DiagramFilters,
) -> Result<(Vec<DiagramNode>, Vec<DiagramEdge>), DiagramError> {
    let compiled = Compiled::new(filters)?;
    let nodes: Vec<DiagramNode> = nodes.into_iter().filter(|n| compiled.admits(n)).collect();
    let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges = edges
        .into_iter()
        .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
        .collect();
    Ok((nodes, edges))
}
