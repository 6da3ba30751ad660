//! Placement strategies. Every strategy is deterministic: the same input
//! always yields the same coordinates.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{DiagramEdge, DiagramNode, Entity, Relationship};
use crate::models::{NodeKind, TreeNode};

pub const NODE_WIDTH: f64 = 160.0;
pub const NODE_HEIGHT: f64 = 40.0;
const H_GAP: f64 = 40.0;
const V_GAP: f64 = 80.0;

pub const CANVAS_WIDTH: f64 = 1200.0;
pub const CANVAS_HEIGHT: f64 = 800.0;
/// Treemap cells smaller than this (in square units) are not rendered, and
/// neither is anything below them.
pub const MIN_AREA: f64 = 100.0;
/// Inset between a treemap directory and its children.
const PADDING: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    fn inset(&self, by: f64) -> Rect {
        if self.width <= 2.0 * by || self.height <= 2.0 * by {
            return *self;
        }
        Rect {
            x: self.x + by,
            y: self.y + by,
            width: self.width - 2.0 * by,
            height: self.height - 2.0 * by,
        }
    }
}

fn grid_position(column: usize, row: usize) -> (f64, f64) {
    (
        column as f64 * (NODE_WIDTH + H_GAP),
        row as f64 * (NODE_HEIGHT + V_GAP),
    )
}

// ─── File tree ───────────────────────────────────────────────────────────────

fn tree_node(node: &TreeNode, rect: Rect) -> DiagramNode {
    DiagramNode {
        id: node.id.clone(),
        label: node.name.clone(),
        kind: match node.kind {
            NodeKind::File => "file".to_string(),
            NodeKind::Directory => "directory".to_string(),
        },
        path: Some(node.path.clone()),
        language: node.language.clone(),
        layer: None,
        depth: node.depth,
        size: node.cumulative_size,
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

/// One row per depth, nodes sorted by path within a row, with a
/// parent → child edge for every node whose parent is present.
pub fn tree(nodes: &[TreeNode]) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
    let mut rows: HashMap<usize, Vec<&TreeNode>> = HashMap::new();
    for node in nodes {
        rows.entry(node.depth).or_default().push(node);
    }
    let mut depths: Vec<usize> = rows.keys().copied().collect();
    depths.sort_unstable();

    let mut out = Vec::with_capacity(nodes.len());
    for depth in depths {
        let Some(row) = rows.get_mut(&depth) else { continue };
        row.sort_by(|a, b| a.path.cmp(&b.path));
        for (column, node) in row.iter().enumerate() {
            let (x, y) = grid_position(column, depth);
            out.push(tree_node(
                node,
                Rect {
                    x,
                    y,
                    width: NODE_WIDTH,
                    height: NODE_HEIGHT,
                },
            ));
        }
    }

    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges = nodes
        .iter()
        .filter_map(|n| {
            let parent = n.parent_id.as_deref()?;
            ids.contains(parent).then(|| DiagramEdge {
                source: parent.to_string(),
                target: n.id.clone(),
                label: None,
            })
        })
        .collect();

    (out, edges)
}

/// Squarified treemap over cumulative sizes. Each directory's rectangle is
/// split among its children; cells under [`MIN_AREA`] are dropped together
/// with their subtree.
pub fn treemap(nodes: &[TreeNode]) -> Vec<DiagramNode> {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        match node.parent_id.as_deref().filter(|p| ids.contains(p)) {
            Some(parent) => children.entry(parent).or_default().push(idx),
            None => roots.push(idx),
        }
    }

    let canvas = Rect {
        x: 0.0,
        y: 0.0,
        width: CANVAS_WIDTH,
        height: CANVAS_HEIGHT,
    };
    let mut out = Vec::new();
    let mut pending: Vec<(Vec<usize>, Rect)> = vec![(roots, canvas)];
    while let Some((siblings, rect)) = pending.pop() {
        for (idx, cell) in partition(nodes, &siblings, rect) {
            if cell.area() < MIN_AREA {
                continue;
            }
            let node = &nodes[idx];
            out.push(tree_node(node, cell));
            if let Some(kids) = children.get(node.id.as_str()) {
                pending.push((kids.clone(), cell.inset(PADDING)));
            }
        }
    }

    out.sort_by(|a, b| (a.depth, &a.path).cmp(&(b.depth, &b.path)));
    out
}

/// Squarify `siblings` into `rect`, largest first. Zero-sized nodes get no
/// cell.
fn partition(nodes: &[TreeNode], siblings: &[usize], rect: Rect) -> Vec<(usize, Rect)> {
    let mut weighted: Vec<(usize, f64)> = siblings
        .iter()
        .map(|&idx| (idx, nodes[idx].cumulative_size as f64))
        .filter(|(_, weight)| *weight > 0.0)
        .collect();
    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    if total <= 0.0 || rect.area() <= 0.0 {
        return Vec::new();
    }
    weighted.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| nodes[a.0].path.cmp(&nodes[b.0].path))
    });
    let scale = rect.area() / total;
    let areas: Vec<(usize, f64)> = weighted.into_iter().map(|(idx, w)| (idx, w * scale)).collect();
    squarify(&areas, rect)
}

/// Classic squarified treemap: grow a row along the shorter side while the
/// worst aspect ratio keeps improving, then lay it out and recurse into the
/// remaining space.
pub fn squarify(areas: &[(usize, f64)], rect: Rect) -> Vec<(usize, Rect)> {
    let mut out = Vec::with_capacity(areas.len());
    let mut free = rect;
    let mut row: Vec<(usize, f64)> = Vec::new();
    let mut rest = areas;

    while let Some((&next, tail)) = rest.split_first() {
        let side = free.width.min(free.height);
        let mut candidate = row.clone();
        candidate.push(next);
        if row.is_empty() || worst_ratio(&candidate, side) <= worst_ratio(&row, side) {
            row = candidate;
            rest = tail;
        } else {
            free = lay_row(&row, free, &mut out);
            row.clear();
        }
    }
    if !row.is_empty() {
        lay_row(&row, free, &mut out);
    }
    out
}

fn worst_ratio(row: &[(usize, f64)], side: f64) -> f64 {
    let sum: f64 = row.iter().map(|(_, a)| a).sum();
    let max = row.iter().map(|(_, a)| *a).fold(f64::MIN, f64::max);
    let min = row.iter().map(|(_, a)| *a).fold(f64::MAX, f64::min);
    if side <= 0.0 || sum <= 0.0 || min <= 0.0 {
        return f64::INFINITY;
    }
    let side2 = side * side;
    let sum2 = sum * sum;
    (side2 * max / sum2).max(sum2 / (side2 * min))
}

/// Place `row` against the shorter side of `free`; returns the space left.
fn lay_row(row: &[(usize, f64)], free: Rect, out: &mut Vec<(usize, Rect)>) -> Rect {
    let sum: f64 = row.iter().map(|(_, a)| a).sum();
    if free.width >= free.height {
        // Column on the left edge
        let width = if free.height > 0.0 { sum / free.height } else { 0.0 };
        let mut y = free.y;
        for &(idx, area) in row {
            let height = if width > 0.0 { area / width } else { 0.0 };
            out.push((
                idx,
                Rect {
                    x: free.x,
                    y,
                    width,
                    height,
                },
            ));
            y += height;
        }
        Rect {
            x: free.x + width,
            y: free.y,
            width: (free.width - width).max(0.0),
            height: free.height,
        }
    } else {
        // Row along the top edge
        let height = if free.width > 0.0 { sum / free.width } else { 0.0 };
        let mut x = free.x;
        for &(idx, area) in row {
            let width = if height > 0.0 { area / height } else { 0.0 };
            out.push((
                idx,
                Rect {
                    x,
                    y: free.y,
                    width,
                    height,
                },
            ));
            x += width;
        }
        Rect {
            x: free.x,
            y: free.y + height,
            width: free.width,
            height: (free.height - height).max(0.0),
        }
    }
}

// ─── Conceptual ──────────────────────────────────────────────────────────────

/// Entities with duplicate ids are dropped after the first.
fn unique(entities: &[Entity]) -> Vec<&Entity> {
    let mut seen = HashSet::new();
    entities.iter().filter(|e| seen.insert(e.id.as_str())).collect()
}

fn entity_node(entity: &Entity, depth: usize, column: usize, row: usize) -> DiagramNode {
    let (x, y) = grid_position(column, row);
    DiagramNode {
        id: entity.id.clone(),
        label: entity.label.clone().unwrap_or_else(|| entity.id.clone()),
        kind: entity.kind.clone().unwrap_or_else(|| "entity".to_string()),
        path: entity.path.clone(),
        language: entity.language.clone(),
        layer: entity.layer.clone(),
        depth,
        size: 0,
        x,
        y,
        width: NODE_WIDTH,
        height: NODE_HEIGHT,
    }
}

/// Relationships whose endpoints both exist.
fn edges(relationships: &[Relationship], ids: &HashSet<&str>) -> Vec<DiagramEdge> {
    relationships
        .iter()
        .filter(|r| ids.contains(r.source.as_str()) && ids.contains(r.target.as_str()))
        .map(|r| DiagramEdge {
            source: r.source.clone(),
            target: r.target.clone(),
            label: r.label.clone(),
        })
        .collect()
}

/// One row per declared layer, in order of first appearance. Entities without
/// a layer share a final row.
pub fn layered(entities: &[Entity], relationships: &[Relationship]) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
    let entities = unique(entities);
    let mut layers: Vec<Option<&str>> = Vec::new();
    for entity in &entities {
        let layer = entity.layer.as_deref();
        if layer.is_some() && !layers.contains(&layer) {
            layers.push(layer);
        }
    }
    if entities.iter().any(|e| e.layer.is_none()) {
        layers.push(None);
    }

    let mut nodes = Vec::with_capacity(entities.len());
    for (row, layer) in layers.iter().enumerate() {
        let members = entities.iter().filter(|e| e.layer.as_deref() == *layer);
        for (column, entity) in members.enumerate() {
            nodes.push(entity_node(entity, row, column, row));
        }
    }

    let ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    (nodes, edges(relationships, &ids))
}

/// Grid of `ceil(sqrt(n))` columns in input order. Stands in for a
/// force-directed placement without simulating one.
pub fn force(entities: &[Entity], relationships: &[Relationship]) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
    let entities = unique(entities);
    let columns = ((entities.len() as f64).sqrt().ceil() as usize).max(1);
    let nodes = entities
        .iter()
        .enumerate()
        .map(|(i, entity)| entity_node(entity, 0, i % columns, i / columns))
        .collect();

    let ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    (nodes, edges(relationships, &ids))
}

/// Breadth-first from the roots (entities without incoming edges), one row
/// per level, children following their parents' order. Cycles are cut at the
/// first revisit; entities no root reaches go on a fallback row below.
pub fn hierarchical(
    entities: &[Entity],
    relationships: &[Relationship],
) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
    let entities = unique(entities);
    let ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    let edges = edges(relationships, &ids);

    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut has_incoming: HashSet<&str> = HashSet::new();
    for edge in &edges {
        if edge.source == edge.target {
            continue;
        }
        outgoing.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        has_incoming.insert(edge.target.as_str());
    }

    let mut level: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for entity in &entities {
        let id = entity.id.as_str();
        if !has_incoming.contains(id) {
            level.insert(id, 0);
            order.push(id);
            queue.push_back(id);
        }
    }
    while let Some(id) = queue.pop_front() {
        let next = level[id] + 1;
        for &child in outgoing.get(id).map(Vec::as_slice).unwrap_or_default() {
            if !level.contains_key(child) {
                level.insert(child, next);
                order.push(child);
                queue.push_back(child);
            }
        }
    }

    let fallback = level.values().max().map_or(0, |deepest| deepest + 1);
    let by_id: HashMap<&str, &Entity> = entities.iter().map(|e| (e.id.as_str(), *e)).collect();
    let mut columns: HashMap<usize, usize> = HashMap::new();
    let mut nodes = Vec::with_capacity(entities.len());

    let reached = order.iter().map(|id| (*id, level[id]));
    let unreached = entities
        .iter()
        .map(|e| e.id.as_str())
        .filter(|id| !level.contains_key(id))
        .map(|id| (id, fallback));
    for (id, row) in reached.chain(unreached).collect::<Vec<_>>() {
        let column = columns.entry(row).or_default();
        nodes.push(entity_node(by_id[id], row, *column, row));
        *column += 1;
    }

    (nodes, edges)
}
