//! Tree-with-ghosts projection of a ToC graph.
//!
//! Every node gets exactly one `primary` row at its primary-parent position. A
//! `secondary_link` edge adds a `ghost_secondary` row for its target under the
//! source's primary path. Rows carry a `path_sort_key` built from
//! `{created_at}:{id}` tokens so that the final order is a pure function of the
//! graph; the `|0|` / `|1|` segment keeps a primary row ahead of any ghost row
//! that shares its ancestor prefix.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    reconciliation_key, Edge, EdgeKind, Graph, Node, ProjectionRow, RawGraph, RowKind,
};

struct ProjectionIndex<'a> {
    nodes_by_id: BTreeMap<&'a str, &'a Node>,
    /// Unique nodes sorted by `(created_at, id)`.
    ordered: Vec<&'a Node>,
    children_by_parent: BTreeMap<&'a str, Vec<&'a Node>>,
}

impl<'a> ProjectionIndex<'a> {
    fn new(nodes: &'a [Node]) -> Self {
        let mut nodes_by_id: BTreeMap<&str, &Node> = BTreeMap::new();
        for node in nodes {
            nodes_by_id.entry(node.id.as_str()).or_insert(node);
        }

        let mut ordered: Vec<&Node> = nodes_by_id.values().copied().collect();
        ordered.sort_by(|lhs, rhs| Node::creation_cmp(lhs, rhs));

        let mut children_by_parent: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();
        for node in ordered.iter().copied() {
            if let Some(parent_id) = node.primary_parent_id.as_deref() {
                children_by_parent.entry(parent_id).or_default().push(node);
            }
        }

        Self { nodes_by_id, ordered, children_by_parent }
    }

    fn roots(&self) -> Vec<&'a Node> {
        let goals: Vec<&Node> = self
            .ordered
            .iter()
            .copied()
            .filter(|node| node.is_goal() && node.primary_parent_id.is_none())
            .collect();
        if !goals.is_empty() {
            return goals;
        }

        let parentless: Vec<&Node> =
            self.ordered.iter().copied().filter(|node| node.primary_parent_id.is_none()).collect();
        if !parentless.is_empty() {
            return parentless;
        }

        self.ordered.clone()
    }
}

/// Build the ordered projection rows for a normalized graph.
#[must_use]
pub fn build_projection(graph: &Graph) -> Vec<ProjectionRow> {
    let index = ProjectionIndex::new(&graph.nodes);
    let mut primary_paths: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();
    let mut rows = Vec::with_capacity(index.ordered.len());

    for root in index.roots() {
        walk_primary_tree(&index, root, &mut primary_paths, &mut rows);
    }
    // Nodes hanging off dangling parents or parent cycles are rooted on their own.
    for node in index.ordered.iter().copied() {
        if !primary_paths.contains_key(node.id.as_str()) {
            walk_primary_tree(&index, node, &mut primary_paths, &mut rows);
        }
    }

    let mut secondary_links: Vec<&Edge> =
        graph.edges.iter().filter(|edge| edge.edge_kind == EdgeKind::SecondaryLink).collect();
    secondary_links.sort_by(|lhs, rhs| Edge::creation_cmp(lhs, rhs));

    let primary_row_count = rows.len();
    for edge in secondary_links {
        let (Some(source), Some(target)) = (
            index.nodes_by_id.get(edge.source_node_id.as_str()),
            index.nodes_by_id.get(edge.target_node_id.as_str()),
        ) else {
            continue;
        };
        let Some(source_path) = primary_paths.get(source.id.as_str()) else {
            continue;
        };

        let mut path = source_path.clone();
        path.push(*target);
        let sort_key = format!(
            "{}|1|{}|node:{}|parent:{}",
            sort_prefix(&path),
            edge.sort_token(),
            target.id,
            source.id
        );
        let primary_path =
            primary_paths.get(target.id.as_str()).map_or(&[][..], Vec::as_slice);
        rows.push(make_row(
            target,
            &path,
            primary_path,
            RowKind::GhostSecondary,
            sort_key,
            Some(edge.id.clone()),
        ));
    }

    let mut seen = BTreeSet::new();
    rows.retain(|row| seen.insert(row.dedup_key()));
    rows.sort_by(ProjectionRow::canonical_cmp);

    tracing::debug!(
        nodes = graph.nodes.len(),
        primary_rows = primary_row_count,
        total_rows = rows.len(),
        "projection built"
    );
    rows
}

/// Normalize a raw payload and project it.
#[must_use]
pub fn build_raw_projection(raw: &RawGraph) -> Vec<ProjectionRow> {
    build_projection(&raw.normalize())
}

fn walk_primary_tree<'a>(
    index: &ProjectionIndex<'a>,
    root: &'a Node,
    primary_paths: &mut BTreeMap<&'a str, Vec<&'a Node>>,
    rows: &mut Vec<ProjectionRow>,
) {
    let mut stack: Vec<Vec<&Node>> = vec![vec![root]];
    while let Some(path) = stack.pop() {
        let Some(&node) = path.last() else {
            continue;
        };
        if primary_paths.contains_key(node.id.as_str()) {
            continue;
        }

        let sort_key = format!("{}|0|edge:none|node:{}", sort_prefix(&path), node.id);
        rows.push(make_row(node, &path, &path, RowKind::Primary, sort_key, None));

        if let Some(children) = index.children_by_parent.get(node.id.as_str()) {
            for &child in children.iter().rev() {
                if primary_paths.contains_key(child.id.as_str()) || child.id == node.id {
                    continue;
                }
                let mut child_path = path.clone();
                child_path.push(child);
                stack.push(child_path);
            }
        }
        primary_paths.insert(node.id.as_str(), path);
    }
}

fn sort_prefix(path: &[&Node]) -> String {
    path.iter().map(|node| node.sort_token()).collect::<Vec<_>>().join("~")
}

fn make_row(
    node: &Node,
    path: &[&Node],
    primary_path: &[&Node],
    row_kind: RowKind,
    path_sort_key: String,
    source_edge_id: Option<String>,
) -> ProjectionRow {
    let path_key: Vec<String> = path.iter().map(|entry| entry.id.clone()).collect();
    let primary_path_key: Vec<String> = primary_path.iter().map(|entry| entry.id.clone()).collect();
    let at = |position: usize| path_key.get(position).cloned();
    let goal_id = at(0);
    let outcome_id = at(1);
    let output_id = at(2);
    let projection_parent_id =
        path_key.len().checked_sub(2).and_then(|position| path_key.get(position).cloned());
    let reconciliation_key = reconciliation_key(
        &node.id,
        goal_id.as_deref(),
        outcome_id.as_deref(),
        output_id.as_deref(),
        projection_parent_id.as_deref(),
        row_kind,
    );

    ProjectionRow {
        node_id: node.id.clone(),
        depth: u32::try_from(path_key.len()).unwrap_or(u32::MAX),
        primary_path_key,
        path_key,
        path_sort_key,
        row_kind,
        is_ghost: row_kind.is_ghost(),
        source_edge_id,
        projection_parent_id,
        primary_parent_id: node.primary_parent_id.clone(),
        goal_id,
        outcome_id,
        output_id,
        node_type: node.node_type.map(|node_type| node_type.as_str().to_string()).unwrap_or_default(),
        node_title: node.title.clone(),
        node_description: node.description.clone(),
        node_narrative: node.narrative.clone(),
        reconciliation_key,
    }
}
