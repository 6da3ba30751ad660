//! File-tree model: builds [`TreeNode`] sets from flat blob listings and keeps
//! the cumulative size / file-count aggregates consistent.

use std::collections::{BTreeMap, HashMap};

use crate::models::{NodeKind, RepoRef, TreeNode};

pub const ROOT_PATH: &str = "/";

/// One file as reported by the source host, after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub content_hash: Option<String>,
    pub language: Option<String>,
}

pub fn node_id(repo: &RepoRef, path: &str) -> String {
    format!("{}:{}", repo.key(), path)
}

/// Build the full node set for `files`, synthesizing every ancestor directory
/// and the root, then aggregate.
pub fn build_tree(repo: &RepoRef, files: &[FileEntry]) -> Vec<TreeNode> {
    let mut nodes = BTreeMap::new();
    nodes.insert(ROOT_PATH.to_string(), root_node(repo));
    for file in files {
        insert_file(&mut nodes, repo, file);
    }
    finish(nodes)
}

/// Patch an existing node set with changed and removed files. Nodes for other
/// files keep their chunk counts; directories left without children are
/// pruned.
pub fn apply_delta(
    repo: &RepoRef,
    nodes: Vec<TreeNode>,
    upserts: &[FileEntry],
    removals: &[String],
) -> Vec<TreeNode> {
    let mut map: BTreeMap<String, TreeNode> = nodes.into_iter().map(|n| (n.path.clone(), n)).collect();
    map.entry(ROOT_PATH.to_string()).or_insert_with(|| root_node(repo));

    for path in removals {
        if map.get(path).is_some_and(TreeNode::is_file) {
            map.remove(path);
        }
    }
    prune_empty_dirs(&mut map);

    for file in upserts {
        insert_file(&mut map, repo, file);
    }
    finish(map)
}

/// Record per-file chunk counts. Files missing from `counts` are left as is.
pub fn set_chunk_counts(nodes: &mut [TreeNode], counts: &HashMap<String, usize>) {
    for node in nodes.iter_mut().filter(|n| n.is_file()) {
        if let Some(&count) = counts.get(&node.path) {
            node.chunk_count = count;
            node.has_chunks = count > 0;
        }
    }
}

/// Recompute cumulative aggregates in one bottom-up pass: nodes are visited
/// deepest first, and each node's running total is folded into its parent's.
pub fn aggregate(nodes: &mut [TreeNode]) {
    let mut totals: HashMap<String, (u64, u64)> = nodes
        .iter()
        .map(|n| {
            let own = match n.kind {
                NodeKind::File => (n.size, 1),
                NodeKind::Directory => (0, 0),
            };
            (n.id.clone(), own)
        })
        .collect();

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| nodes[b].depth.cmp(&nodes[a].depth));

    for idx in order {
        let node = &mut nodes[idx];
        let (size, files) = totals.get(&node.id).copied().unwrap_or_default();
        node.cumulative_size = size;
        node.cumulative_file_count = files;
        if let Some(parent) = &node.parent_id {
            if let Some(total) = totals.get_mut(parent) {
                total.0 += size;
                total.1 += files;
            }
        }
    }
}

fn finish(map: BTreeMap<String, TreeNode>) -> Vec<TreeNode> {
    let mut nodes: Vec<TreeNode> = map.into_values().collect();
    // Root first, then path order
    nodes.sort_by(|a, b| (a.depth != 0, &a.path).cmp(&(b.depth != 0, &b.path)));
    aggregate(&mut nodes);
    nodes
}

/// Drop `path` and every node below it.
fn remove_subtree(map: &mut BTreeMap<String, TreeNode>, path: &str) {
    let prefix = format!("{path}/");
    map.retain(|key, _| key != path && !key.starts_with(&prefix));
}

fn root_node(repo: &RepoRef) -> TreeNode {
    TreeNode {
        id: node_id(repo, ROOT_PATH),
        repo: repo.key(),
        path: ROOT_PATH.to_string(),
        name: repo.name.clone(),
        kind: NodeKind::Directory,
        parent_id: None,
        depth: 0,
        size: 0,
        cumulative_size: 0,
        cumulative_file_count: 0,
        language: None,
        extension: None,
        content_hash: None,
        chunk_count: 0,
        has_chunks: false,
    }
}

fn insert_file(map: &mut BTreeMap<String, TreeNode>, repo: &RepoRef, file: &FileEntry) {
    let path = file.path.trim_matches('/');
    if path.is_empty() {
        return;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut parent_id = node_id(repo, ROOT_PATH);
    for depth in 1..segments.len() {
        let dir_path = segments[..depth].join("/");
        if map.get(&dir_path).is_some_and(TreeNode::is_file) {
            tracing::warn!("{dir_path} turned from a file into a directory in {repo}");
            map.remove(&dir_path);
        }
        let dir = map.entry(dir_path.clone()).or_insert_with(|| TreeNode {
            id: node_id(repo, &dir_path),
            repo: repo.key(),
            path: dir_path.clone(),
            name: segments[depth - 1].to_string(),
            kind: NodeKind::Directory,
            parent_id: Some(parent_id.clone()),
            depth,
            size: 0,
            cumulative_size: 0,
            cumulative_file_count: 0,
            language: None,
            extension: None,
            content_hash: None,
            chunk_count: 0,
            has_chunks: false,
        });
        parent_id = dir.id.clone();
    }

    let name = segments[segments.len() - 1].to_string();
    let extension = name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_lowercase());
    let joined = segments.join("/");

    if map.get(&joined).is_some_and(|n| !n.is_file()) {
        tracing::warn!("{joined} turned from a directory into a file in {repo}");
        remove_subtree(map, &joined);
    }

    if let Some(existing) = map.get_mut(&joined).filter(|n| n.is_file()) {
        if existing.content_hash != file.content_hash {
            existing.chunk_count = 0;
            existing.has_chunks = false;
        }
        existing.size = file.size;
        existing.content_hash = file.content_hash.clone();
        existing.language = file.language.clone();
        return;
    }

    map.insert(
        joined.clone(),
        TreeNode {
            id: node_id(repo, &joined),
            repo: repo.key(),
            path: joined,
            name,
            kind: NodeKind::File,
            parent_id: Some(parent_id),
            depth: segments.len(),
            size: file.size,
            cumulative_size: 0,
            cumulative_file_count: 0,
            language: file.language.clone(),
            extension,
            content_hash: file.content_hash.clone(),
            chunk_count: 0,
            has_chunks: false,
        },
    );
}

fn prune_empty_dirs(map: &mut BTreeMap<String, TreeNode>) {
    loop {
        let parents: std::collections::HashSet<&str> =
            map.values().filter_map(|n| n.parent_id.as_deref()).collect();
        let empty: Vec<String> = map
            .values()
            .filter(|n| n.kind == NodeKind::Directory && n.depth > 0 && !parents.contains(n.id.as_str()))
            .map(|n| n.path.clone())
            .collect();
        if empty.is_empty() {
            return;
        }
        for path in empty {
            map.remove(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef::new("acme", "widgets")
    }

    fn file(path: &str, size: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size,
            content_hash: Some(format!("sha-{path}")),
            language: None,
        }
    }

    fn find<'a>(nodes: &'a [TreeNode], path: &str) -> &'a TreeNode {
        nodes.iter().find(|n| n.path == path).unwrap()
    }

    fn assert_aggregates_consistent(nodes: &[TreeNode]) {
        for dir in nodes.iter().filter(|n| !n.is_file()) {
            let children: Vec<&TreeNode> = nodes
                .iter()
                .filter(|n| n.parent_id.as_deref() == Some(dir.id.as_str()))
                .collect();
            let size: u64 = children.iter().map(|c| c.cumulative_size).sum();
            let files: u64 = children.iter().map(|c| c.cumulative_file_count).sum();
            assert_eq!(dir.cumulative_size, size, "size of {}", dir.path);
            assert_eq!(dir.cumulative_file_count, files, "files of {}", dir.path);
        }
    }

    #[test]
    fn test_root_and_src_aggregates() {
        let nodes = build_tree(
            &repo(),
            &[file("src/a.ts", 100), file("src/b.ts", 200), file("README.md", 50)],
        );
        let src = find(&nodes, "src");
        assert_eq!(src.size, 0);
        assert_eq!(src.cumulative_size, 300);
        assert_eq!(src.cumulative_file_count, 2);
        let root = find(&nodes, "/");
        assert_eq!(root.cumulative_size, 350);
        assert_eq!(root.cumulative_file_count, 3);
        assert_eq!(root.depth, 0);
        assert!(root.parent_id.is_none());
        assert_aggregates_consistent(&nodes);
    }

    #[test]
    fn test_structure_and_ids() {
        let nodes = build_tree(&repo(), &[file("src/lib/util.rs", 10)]);
        assert_eq!(nodes[0].path, "/");
        let util = find(&nodes, "src/lib/util.rs");
        assert_eq!(util.id, "acme/widgets:src/lib/util.rs");
        assert_eq!(util.depth, 3);
        assert_eq!(util.name, "util.rs");
        assert_eq!(util.extension.as_deref(), Some("rs"));
        assert_eq!(util.parent_id.as_deref(), Some("acme/widgets:src/lib"));
        assert_eq!(find(&nodes, "src/lib").depth, 2);
        assert_eq!(find(&nodes, "src").parent_id.as_deref(), Some("acme/widgets:/"));
        // every parent exists and is one level up
        for node in nodes.iter().filter(|n| n.depth > 0) {
            let parent = nodes.iter().find(|p| Some(&p.id) == node.parent_id.as_ref()).unwrap();
            assert_eq!(parent.depth + 1, node.depth);
        }
    }

    #[test]
    fn test_single_file_repository() {
        let nodes = build_tree(&repo(), &[file("main.go", 42)]);
        assert_eq!(nodes.len(), 2);
        assert_eq!(find(&nodes, "/").cumulative_size, 42);
        assert_eq!(find(&nodes, "main.go").cumulative_file_count, 1);
        assert_aggregates_consistent(&nodes);
    }

    #[test]
    fn test_empty_directory_aggregates_to_zero() {
        let mut nodes = build_tree(&repo(), &[file("a.txt", 5)]);
        nodes.push(TreeNode {
            id: node_id(&repo(), "empty"),
            path: "empty".to_string(),
            name: "empty".to_string(),
            kind: NodeKind::Directory,
            parent_id: Some(node_id(&repo(), ROOT_PATH)),
            depth: 1,
            size: 0,
            content_hash: None,
            language: None,
            extension: None,
            ..nodes[1].clone()
        });
        aggregate(&mut nodes);
        assert_eq!(find(&nodes, "empty").cumulative_size, 0);
        assert_eq!(find(&nodes, "empty").cumulative_file_count, 0);
        assert_eq!(find(&nodes, "/").cumulative_size, 5);
        assert_aggregates_consistent(&nodes);
    }

    #[test]
    fn test_dotfiles_have_no_extension() {
        let nodes = build_tree(&repo(), &[file(".gitignore", 3), file("Makefile", 3)]);
        assert_eq!(find(&nodes, ".gitignore").extension, None);
        assert_eq!(find(&nodes, "Makefile").extension, None);
    }

    #[test]
    fn test_delta_removes_and_prunes() {
        let nodes = build_tree(&repo(), &[file("docs/guide/intro.md", 10), file("src/a.rs", 20)]);
        let patched = apply_delta(&repo(), nodes, &[], &["docs/guide/intro.md".to_string()]);
        assert!(patched.iter().all(|n| !n.path.starts_with("docs")));
        assert_eq!(find(&patched, "/").cumulative_size, 20);
        assert_aggregates_consistent(&patched);
    }

    #[test]
    fn test_delta_upserts_and_keeps_untouched_counts() {
        let mut nodes = build_tree(&repo(), &[file("src/a.rs", 20), file("src/b.rs", 30)]);
        set_chunk_counts(&mut nodes, &HashMap::from([("src/a.rs".to_string(), 2), ("src/b.rs".to_string(), 3)]));

        let mut changed = file("src/a.rs", 25);
        changed.content_hash = Some("new".to_string());
        let patched = apply_delta(&repo(), nodes, &[changed, file("lib/c.rs", 5)], &[]);

        let a = find(&patched, "src/a.rs");
        assert_eq!(a.size, 25);
        assert_eq!(a.chunk_count, 0);
        assert_eq!(find(&patched, "src/b.rs").chunk_count, 3);
        assert!(find(&patched, "src/b.rs").has_chunks);
        assert_eq!(find(&patched, "lib").cumulative_size, 5);
        assert_eq!(find(&patched, "/").cumulative_size, 60);
        assert_aggregates_consistent(&patched);
    }

    #[test]
    fn test_delta_directory_replaced_by_file() {
        let nodes = build_tree(&repo(), &[file("vendor/lib/x.rs", 10), file("src/a.rs", 20)]);
        let patched = apply_delta(&repo(), nodes, &[file("vendor", 7)], &[]);

        let vendor = find(&patched, "vendor");
        assert!(vendor.is_file());
        assert_eq!(vendor.cumulative_size, 7);
        assert!(patched.iter().all(|n| !n.path.starts_with("vendor/")));
        assert_eq!(find(&patched, "/").cumulative_size, 27);
        assert_eq!(find(&patched, "/").cumulative_file_count, 2);
        assert_aggregates_consistent(&patched);
    }

    #[test]
    fn test_delta_file_replaced_by_directory() {
        let nodes = build_tree(&repo(), &[file("docs", 4)]);
        let patched = apply_delta(&repo(), nodes, &[file("docs/intro.md", 9)], &[]);

        let docs = find(&patched, "docs");
        assert!(!docs.is_file());
        assert_eq!(docs.cumulative_size, 9);
        assert_eq!(find(&patched, "docs/intro.md").parent_id.as_deref(), Some("acme/widgets:docs"));
        assert_aggregates_consistent(&patched);
    }
}
