//! Canonical shape and ordering for projection rows that were persisted by the host.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::model::{
    reconciliation_key, sort_timestamp, NodeType, ProjectionRow, RawRecord, RowKind,
};
use crate::normalize::{bool_field, first_present, id_field, text_field};

const NODE_ID: &[&str] = &["node_id", "nodeId", "id"];
const PATH_KEY: &[&str] = &["path_key", "pathKey"];
const PRIMARY_PATH_KEY: &[&str] = &["primary_path_key", "primaryPathKey"];
const PATH_SORT_KEY: &[&str] = &["path_sort_key", "pathSortKey", "sort_key"];
const ROW_KIND: &[&str] = &["row_kind", "rowKind"];
const IS_GHOST: &[&str] = &["is_ghost", "isGhost"];
const SOURCE_EDGE_ID: &[&str] = &["source_edge_id", "sourceEdgeId"];
const PROJECTION_PARENT_ID: &[&str] = &["projection_parent_id", "projectionParentId"];
const PRIMARY_PARENT_ID: &[&str] = &["primary_parent_id", "primaryParentId", "parent_id"];
const GOAL_ID: &[&str] = &["goal_id", "goalId"];
const OUTCOME_ID: &[&str] = &["outcome_id", "outcomeId"];
const OUTPUT_ID: &[&str] = &["output_id", "outputId"];
const DEPTH: &[&str] = &["depth"];
const NODE_TYPE: &[&str] = &["node_type", "nodeType", "type"];
const NODE_TITLE: &[&str] = &["node_title", "nodeTitle", "title"];
const NODE_DESCRIPTION: &[&str] = &["node_description", "nodeDescription", "description"];
const NODE_NARRATIVE: &[&str] = &["node_narrative", "nodeNarrative", "narrative"];

fn path_field(raw: &RawRecord, aliases: &[&str]) -> Vec<String> {
    match first_present(raw, aliases) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(value) => Some(value.trim().to_string()),
                Value::Number(value) => Some(value.to_string()),
                _ => None,
            })
            .filter(|value| !value.is_empty())
            .collect(),
        Some(Value::String(joined)) => joined
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split([',', '/', '>'])
            .map(|segment| segment.trim().trim_matches('"').to_string())
            .filter(|segment| !segment.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn depth_field(raw: &RawRecord) -> Option<u32> {
    match first_present(raw, DEPTH)? {
        Value::Number(number) => number.as_u64().and_then(|depth| u32::try_from(depth).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn row_kind_field(raw: &RawRecord) -> RowKind {
    if let Some(kind) = text_field(raw, ROW_KIND).as_deref().and_then(RowKind::parse) {
        return kind;
    }
    match bool_field(raw, IS_GHOST) {
        Some(true) => RowKind::GhostSecondary,
        _ => RowKind::Primary,
    }
}

fn optional_text(raw: &RawRecord, aliases: &[&str]) -> Option<String> {
    text_field(raw, aliases).filter(|value| !value.trim().is_empty())
}

/// Last resort for rows persisted without a `path_sort_key`: the builder's key
/// shape with every timestamp token pinned to the epoch, so such rows order by
/// id within the same scale as builder-keyed rows.
fn fallback_sort_key(
    path_key: &[String],
    row_kind: RowKind,
    node_id: &str,
    source_edge_id: Option<&str>,
    projection_parent_id: Option<&str>,
) -> String {
    let epoch = sort_timestamp(OffsetDateTime::UNIX_EPOCH);
    let prefix = path_key.iter().map(|id| format!("{epoch}:{id}")).collect::<Vec<_>>().join("~");
    match row_kind {
        RowKind::Primary => format!("{prefix}|0|edge:none|node:{node_id}"),
        RowKind::GhostSecondary => {
            let edge = source_edge_id
                .map_or_else(|| "edge:none".to_string(), |id| format!("edge:{epoch}:{id}"));
            format!(
                "{prefix}|1|{edge}|node:{node_id}|parent:{}",
                projection_parent_id.unwrap_or_default()
            )
        }
    }
}

/// Re-normalize one persisted projection row into the canonical shape.
///
/// Decoration fields missing from the raw row are derived from `path_key` the
/// same way the projection builder derives them.
#[must_use]
pub fn normalize_projection_row(raw: &RawRecord) -> ProjectionRow {
    let node_id = id_field(raw, NODE_ID).unwrap_or_default();
    let row_kind = row_kind_field(raw);
    let mut path_key = path_field(raw, PATH_KEY);
    if path_key.is_empty() && !node_id.is_empty() {
        path_key.push(node_id.clone());
    }
    let primary_path_key = match path_field(raw, PRIMARY_PATH_KEY) {
        explicit if !explicit.is_empty() => explicit,
        _ if row_kind == RowKind::Primary => path_key.clone(),
        _ => Vec::new(),
    };

    let from_path = |position: usize| path_key.get(position).cloned();
    let goal_id = id_field(raw, GOAL_ID).or_else(|| from_path(0));
    let outcome_id = id_field(raw, OUTCOME_ID).or_else(|| from_path(1));
    let output_id = id_field(raw, OUTPUT_ID).or_else(|| from_path(2));
    let projection_parent_id = id_field(raw, PROJECTION_PARENT_ID)
        .or_else(|| path_key.len().checked_sub(2).and_then(from_path));
    let source_edge_id = id_field(raw, SOURCE_EDGE_ID);
    let depth = depth_field(raw).unwrap_or_else(|| u32::try_from(path_key.len()).unwrap_or(u32::MAX));

    let path_sort_key = optional_text(raw, PATH_SORT_KEY).unwrap_or_else(|| {
        fallback_sort_key(
            &path_key,
            row_kind,
            &node_id,
            source_edge_id.as_deref(),
            projection_parent_id.as_deref(),
        )
    });
    let node_type = text_field(raw, NODE_TYPE)
        .map(|value| match NodeType::parse(&value) {
            Some(node_type) => node_type.as_str().to_string(),
            None => value.trim().to_string(),
        })
        .unwrap_or_default();
    let reconciliation_key = reconciliation_key(
        &node_id,
        goal_id.as_deref(),
        outcome_id.as_deref(),
        output_id.as_deref(),
        projection_parent_id.as_deref(),
        row_kind,
    );

    ProjectionRow {
        node_id,
        primary_path_key,
        path_key,
        path_sort_key,
        row_kind,
        is_ghost: row_kind.is_ghost(),
        source_edge_id,
        projection_parent_id,
        primary_parent_id: id_field(raw, PRIMARY_PARENT_ID),
        goal_id,
        outcome_id,
        output_id,
        depth,
        node_type,
        node_title: text_field(raw, NODE_TITLE).unwrap_or_default(),
        node_description: optional_text(raw, NODE_DESCRIPTION),
        node_narrative: optional_text(raw, NODE_NARRATIVE),
        reconciliation_key,
    }
}

/// Canonical projection order, then every remaining field, so rows that tie on
/// the canonical tuple still land in one input-independent order.
fn persisted_row_cmp(lhs: &ProjectionRow, rhs: &ProjectionRow) -> Ordering {
    ProjectionRow::canonical_cmp(lhs, rhs)
        .then_with(|| lhs.reconciliation_key.cmp(&rhs.reconciliation_key))
        .then_with(|| lhs.path_key.cmp(&rhs.path_key))
        .then_with(|| lhs.primary_path_key.cmp(&rhs.primary_path_key))
        .then_with(|| lhs.depth.cmp(&rhs.depth))
        .then_with(|| lhs.primary_parent_id.cmp(&rhs.primary_parent_id))
        .then_with(|| lhs.goal_id.cmp(&rhs.goal_id))
        .then_with(|| lhs.outcome_id.cmp(&rhs.outcome_id))
        .then_with(|| lhs.output_id.cmp(&rhs.output_id))
        .then_with(|| lhs.node_type.cmp(&rhs.node_type))
        .then_with(|| lhs.node_title.cmp(&rhs.node_title))
        .then_with(|| lhs.node_description.cmp(&rhs.node_description))
        .then_with(|| lhs.node_narrative.cmp(&rhs.node_narrative))
}

/// Normalize persisted rows and apply the canonical projection order.
#[must_use]
pub fn normalize_projection_rows(raw_rows: &[RawRecord]) -> Vec<ProjectionRow> {
    let mut rows: Vec<ProjectionRow> = raw_rows.iter().map(normalize_projection_row).collect();
    rows.sort_by(persisted_row_cmp);
    tracing::debug!(rows = rows.len(), "projection rows normalized");
    rows
}

/// Digest over the ordered row identities, formatted as `sha256:<hex>`.
#[must_use]
pub fn projection_fingerprint(rows: &[ProjectionRow]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        hasher.update(row.path_sort_key.as_bytes());
        hasher.update(b"\t");
        hasher.update(row.row_kind.as_str().as_bytes());
        hasher.update(b"\t");
        hasher.update(row.reconciliation_key.as_bytes());
        hasher.update(b"\n");
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProjectionDiff {
    /// Reconciliation keys present in `expected` only.
    pub missing: Vec<String>,
    /// Reconciliation keys present in `actual` only.
    pub unexpected: Vec<String>,
}

impl ProjectionDiff {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Compare two projections by reconciliation key, ignoring order.
#[must_use]
pub fn reconcile_projection(expected: &[ProjectionRow], actual: &[ProjectionRow]) -> ProjectionDiff {
    let expected_keys: BTreeSet<&str> =
        expected.iter().map(|row| row.reconciliation_key.as_str()).collect();
    let actual_keys: BTreeSet<&str> =
        actual.iter().map(|row| row.reconciliation_key.as_str()).collect();

    ProjectionDiff {
        missing: expected_keys.difference(&actual_keys).map(|key| (*key).to_string()).collect(),
        unexpected: actual_keys.difference(&expected_keys).map(|key| (*key).to_string()).collect(),
    }
}
