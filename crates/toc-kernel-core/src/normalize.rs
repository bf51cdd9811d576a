//! Raw record normalization.
//!
//! Host rows arrive with inconsistent key names (`source_node_id`, `from_node_id`,
//! `sourceId`, ...). Every canonical field owns a fixed alias list; the first alias
//! holding a non-null value wins. Normalization never fails: unknown enum values
//! fall back to their defaults and unparseable timestamps become the Unix epoch.

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::model::{Confidence, Edge, EdgeKind, Graph, Node, NodeType, RawRecord, RiskFlag};

const NODE_ID: &[&str] = &["id", "node_id", "nodeId"];
const NODE_TYPE: &[&str] = &["node_type", "nodeType", "type"];
const PRIMARY_PARENT_ID: &[&str] = &["primary_parent_id", "primaryParentId", "parent_id", "parentId"];
const TITLE: &[&str] = &["title", "node_title", "nodeTitle", "name"];
const DESCRIPTION: &[&str] = &["description", "node_description", "nodeDescription"];
const NARRATIVE: &[&str] = &["narrative", "node_narrative", "nodeNarrative"];

const EDGE_ID: &[&str] = &["id", "edge_id", "edgeId"];
const SOURCE_NODE_ID: &[&str] = &["source_node_id", "from_node_id", "sourceId"];
const TARGET_NODE_ID: &[&str] = &["target_node_id", "to_node_id", "targetId"];
const EDGE_KIND: &[&str] = &["edge_kind", "edgeKind", "kind"];
const MECHANISM: &[&str] = &["mechanism"];
const CONFIDENCE: &[&str] = &["confidence"];
const RISK_FLAG: &[&str] = &["risk_flag", "riskFlag"];
const SENTINEL_INDICATOR_ID: &[&str] = &["sentinel_indicator_id", "sentinelIndicatorId"];

pub(crate) const CREATED_AT: &[&str] = &["created_at", "createdAt"];

pub(crate) fn first_present<'a>(raw: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| raw.get(*alias).filter(|value| !value.is_null()))
}

/// Scalar value rendered as text; arrays, objects and nulls are absent.
pub(crate) fn text_field(raw: &RawRecord, aliases: &[&str]) -> Option<String> {
    match first_present(raw, aliases)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Trimmed identifier; blank values are absent.
pub(crate) fn id_field(raw: &RawRecord, aliases: &[&str]) -> Option<String> {
    text_field(raw, aliases)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional_text(raw: &RawRecord, aliases: &[&str]) -> Option<String> {
    text_field(raw, aliases).filter(|value| !value.trim().is_empty())
}

pub(crate) fn bool_field(raw: &RawRecord, aliases: &[&str]) -> Option<bool> {
    flag_value(first_present(raw, aliases)?)
}

/// Booleans, `0`/`1` and the usual true/false spellings; anything else is absent.
pub(crate) fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(value) => Some(*value),
        Value::Number(value) => value.as_i64().map(|number| number != 0),
        Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(true),
            "false" | "f" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse RFC 3339 strings (also with a space instead of `T`) or Unix milliseconds.
#[must_use]
pub fn parse_timestamp(value: &Value) -> OffsetDateTime {
    match value {
        Value::String(text) => {
            let text = text.trim();
            OffsetDateTime::parse(text, &Rfc3339)
                .or_else(|_| OffsetDateTime::parse(&text.replacen(' ', "T", 1), &Rfc3339))
                .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
            })
            .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        _ => OffsetDateTime::UNIX_EPOCH,
    }
}

pub(crate) fn timestamp_field(raw: &RawRecord, aliases: &[&str]) -> OffsetDateTime {
    first_present(raw, aliases).map_or(OffsetDateTime::UNIX_EPOCH, parse_timestamp)
}

#[must_use]
pub fn normalize_node(raw: &RawRecord) -> Node {
    Node {
        id: id_field(raw, NODE_ID).unwrap_or_default(),
        node_type: text_field(raw, NODE_TYPE).as_deref().and_then(NodeType::parse),
        primary_parent_id: id_field(raw, PRIMARY_PARENT_ID),
        created_at: timestamp_field(raw, CREATED_AT),
        title: text_field(raw, TITLE).unwrap_or_default(),
        description: optional_text(raw, DESCRIPTION),
        narrative: optional_text(raw, NARRATIVE),
    }
}

#[must_use]
pub fn normalize_edge(raw: &RawRecord) -> Edge {
    Edge {
        id: id_field(raw, EDGE_ID).unwrap_or_default(),
        source_node_id: id_field(raw, SOURCE_NODE_ID).unwrap_or_default(),
        target_node_id: id_field(raw, TARGET_NODE_ID).unwrap_or_default(),
        edge_kind: text_field(raw, EDGE_KIND)
            .as_deref()
            .and_then(EdgeKind::parse)
            .unwrap_or(EdgeKind::Causal),
        // Kept verbatim: the mechanism rule performs its own trim check.
        mechanism: text_field(raw, MECHANISM),
        confidence: text_field(raw, CONFIDENCE)
            .as_deref()
            .and_then(Confidence::parse)
            .unwrap_or(Confidence::Medium),
        risk_flag: text_field(raw, RISK_FLAG)
            .as_deref()
            .and_then(RiskFlag::parse)
            .unwrap_or(RiskFlag::None),
        sentinel_indicator_id: id_field(raw, SENTINEL_INDICATOR_ID),
        created_at: timestamp_field(raw, CREATED_AT),
    }
}

#[must_use]
pub fn normalize_graph(
    nodes: &[RawRecord],
    edges: &[RawRecord],
    rls_baseline_ok: Option<bool>,
) -> Graph {
    Graph {
        nodes: nodes.iter().map(normalize_node).collect(),
        edges: edges.iter().map(normalize_edge).collect(),
        rls_baseline_ok,
    }
}
