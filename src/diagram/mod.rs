//! Diagram layout engine.
//!
//! Turns a persisted file tree, or a caller-supplied entity/relationship set,
//! into positioned nodes and edges. Layout runs first over the complete input;
//! [`filter`] then drops nodes and prunes dangling edges, and statistics are
//! computed over what survives.

pub mod filter;
pub mod layout;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::TreeNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    FileTree,
    Network,
    Architecture,
    Dependency,
    DataFlow,
    Component,
}

impl DiagramKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramKind::FileTree => "file_tree",
            DiagramKind::Network => "network",
            DiagramKind::Architecture => "architecture",
            DiagramKind::Dependency => "dependency",
            DiagramKind::DataFlow => "data_flow",
            DiagramKind::Component => "component",
        }
    }

    pub fn is_file_tree(&self) -> bool {
        matches!(self, DiagramKind::FileTree)
    }

    pub fn default_layout(&self) -> LayoutKind {
        match self {
            DiagramKind::FileTree => LayoutKind::Tree,
            DiagramKind::Architecture => LayoutKind::Layered,
            DiagramKind::Network => LayoutKind::Force,
            DiagramKind::Dependency | DiagramKind::DataFlow | DiagramKind::Component => {
                LayoutKind::Hierarchical
            }
        }
    }
}

impl fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    Tree,
    Treemap,
    Layered,
    Force,
    Hierarchical,
}

impl LayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutKind::Tree => "tree",
            LayoutKind::Treemap => "treemap",
            LayoutKind::Layered => "layered",
            LayoutKind::Force => "force",
            LayoutKind::Hierarchical => "hierarchical",
        }
    }

    /// Layouts that operate on the file tree rather than on entities.
    pub fn is_tree_layout(&self) -> bool {
        matches!(self, LayoutKind::Tree | LayoutKind::Treemap)
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-layout node predicates. Empty lists admit everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramFilters {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub languages: Vec<String>,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
    /// `file` / `directory` for tree diagrams, the entity kind otherwise.
    pub kind: String,
    pub path: Option<String>,
    pub language: Option<String>,
    pub layer: Option<String>,
    pub depth: usize,
    pub size: u64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Input node of a conceptual diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Directed input edge of a conceptual diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagramStats {
    pub node_count: usize,
    pub file_count: usize,
    pub directory_count: usize,
    pub total_size: u64,
    pub edge_count: usize,
    /// File count per language.
    pub languages: BTreeMap<String, usize>,
}

impl DiagramStats {
    pub fn compute(nodes: &[DiagramNode], edges: &[DiagramEdge]) -> Self {
        let mut stats = DiagramStats {
            node_count: nodes.len(),
            edge_count: edges.len(),
            ..Default::default()
        };
        for node in nodes {
            match node.kind.as_str() {
                "file" => {
                    stats.file_count += 1;
                    stats.total_size += node.size;
                    if let Some(lang) = &node.language {
                        *stats.languages.entry(lang.clone()).or_default() += 1;
                    }
                }
                "directory" => stats.directory_count += 1,
                _ => {}
            }
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub kind: DiagramKind,
    pub layout: LayoutKind,
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
    pub stats: DiagramStats,
}

/// Rejections surfaced to callers as bad requests.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagramError {
    UnsupportedLayout { kind: DiagramKind, layout: LayoutKind },
    InvalidPattern(String),
}

impl fmt::Display for DiagramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagramError::UnsupportedLayout { kind, layout } => {
                write!(f, "Layout '{layout}' is not available for '{kind}' diagrams")
            }
            DiagramError::InvalidPattern(pattern) => write!(f, "Invalid filter pattern '{pattern}'"),
        }
    }
}

impl std::error::Error for DiagramError {}

/// The layout to use for `kind`: the requested one if it belongs to the
/// kind's family, the kind's default if none was requested.
pub fn resolve_layout(kind: DiagramKind, requested: Option<LayoutKind>) -> Result<LayoutKind, DiagramError> {
    match requested {
        None => Ok(kind.default_layout()),
        Some(layout) if layout.is_tree_layout() == kind.is_file_tree() => Ok(layout),
        Some(layout) => Err(DiagramError::UnsupportedLayout { kind, layout }),
    }
}

/// Lay out a repository's file tree.
pub fn tree_diagram(
    nodes: &[TreeNode],
    layout: Option<LayoutKind>,
    filters: &DiagramFilters,
) -> Result<Diagram, DiagramError> {
    let layout = resolve_layout(DiagramKind::FileTree, layout)?;
    let (nodes, edges) = match layout {
        LayoutKind::Treemap => (layout::treemap(nodes), Vec::new()),
        _ => layout::tree(nodes),
    };
    finish(DiagramKind::FileTree, layout, nodes, edges, filters)
}

/// Lay out caller-supplied entities and relationships.
pub fn conceptual_diagram(
    kind: DiagramKind,
    layout: Option<LayoutKind>,
    entities: &[Entity],
    relationships: &[Relationship],
    filters: &DiagramFilters,
) -> Result<Diagram, DiagramError> {
    let layout = resolve_layout(kind, layout)?;
    let (nodes, edges) = match layout {
        LayoutKind::Layered => layout::layered(entities, relationships),
        LayoutKind::Hierarchical => layout::hierarchical(entities, relationships),
        _ => layout::force(entities, relationships),
    };
    finish(kind, layout, nodes, edges, filters)
}

fn finish(
    kind: DiagramKind,
    layout: LayoutKind,
    nodes: Vec<DiagramNode>,
    edges: Vec<DiagramEdge>,
    filters: &DiagramFilters,
) -> Result<Diagram, DiagramError> {
    let (nodes, edges) = filter::apply(nodes, edges, filters)?;
    let stats = DiagramStats::compute(&nodes, &edges);
    Ok(Diagram {
        kind,
        layout,
        nodes,
        edges,
        stats,
    })
}
