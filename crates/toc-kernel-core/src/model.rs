use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::KernelError;

/// Sentinel substituted for missing ids inside reconciliation keys.
pub const NULL_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// A loosely-typed record as handed over by the host application.
pub type RawRecord = Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Goal,
    Outcome,
    Output,
    Activity,
}

impl NodeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "GOAL",
            Self::Outcome => "OUTCOME",
            Self::Output => "OUTPUT",
            Self::Activity => "ACTIVITY",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GOAL" => Some(Self::Goal),
            "OUTCOME" => Some(Self::Outcome),
            "OUTPUT" => Some(Self::Output),
            "ACTIVITY" => Some(Self::Activity),
            _ => None,
        }
    }

    /// The only node type allowed as primary parent of `self`.
    #[must_use]
    pub fn predecessor(self) -> Option<Self> {
        match self {
            Self::Goal => None,
            Self::Outcome => Some(Self::Goal),
            Self::Output => Some(Self::Outcome),
            Self::Activity => Some(Self::Output),
        }
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Causal,
    SecondaryLink,
    Feedback,
}

impl EdgeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Causal => "causal",
            Self::SecondaryLink => "secondary_link",
            Self::Feedback => "feedback",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "causal" => Some(Self::Causal),
            "secondary_link" => Some(Self::SecondaryLink),
            "feedback" => Some(Self::Feedback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    None,
    HighRisk,
}

impl RiskFlag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HighRisk => "high_risk",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "high_risk" => Some(Self::HighRisk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Node {
    pub id: String,
    /// `None` when the raw record carried no recognizable type.
    pub node_type: Option<NodeType>,
    pub primary_parent_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub title: String,
    pub description: Option<String>,
    pub narrative: Option<String>,
}

impl Node {
    #[must_use]
    pub fn is_goal(&self) -> bool {
        self.node_type == Some(NodeType::Goal)
    }

    pub(crate) fn creation_cmp(lhs: &Self, rhs: &Self) -> Ordering {
        lhs.created_at.cmp(&rhs.created_at).then_with(|| lhs.id.cmp(&rhs.id))
    }

    /// `{created_at}:{id}` segment used inside projection sort keys.
    #[must_use]
    pub fn sort_token(&self) -> String {
        format!("{}:{}", sort_timestamp(self.created_at), self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub edge_kind: EdgeKind,
    pub mechanism: Option<String>,
    pub confidence: Confidence,
    pub risk_flag: RiskFlag,
    pub sentinel_indicator_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Edge {
    pub(crate) fn creation_cmp(lhs: &Self, rhs: &Self) -> Ordering {
        lhs.created_at.cmp(&rhs.created_at).then_with(|| lhs.id.cmp(&rhs.id))
    }

    #[must_use]
    pub fn sort_token(&self) -> String {
        format!("edge:{}:{}", sort_timestamp(self.created_at), self.id)
    }
}

/// Normalized, caller-scoped graph state for one ToC draft or version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub rls_baseline_ok: Option<bool>,
}

/// Graph payload before normalization.
///
/// The RLS flag is read from `rls_baseline_ok` or `rlsBaselineOk`; when both are
/// present the first non-null one wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawGraphWire")]
pub struct RawGraph {
    pub nodes: Vec<RawRecord>,
    pub edges: Vec<RawRecord>,
    pub rls_baseline_ok: Option<bool>,
}

#[derive(Deserialize)]
struct RawGraphWire {
    #[serde(default)]
    nodes: Vec<RawRecord>,
    #[serde(default)]
    edges: Vec<RawRecord>,
    #[serde(default)]
    rls_baseline_ok: Option<RawRecord>,
    #[serde(default, rename = "rlsBaselineOk")]
    rls_baseline_ok_camel: Option<RawRecord>,
}

impl From<RawGraphWire> for RawGraph {
    fn from(wire: RawGraphWire) -> Self {
        let flag = wire.rls_baseline_ok.or(wire.rls_baseline_ok_camel);
        Self {
            nodes: wire.nodes,
            edges: wire.edges,
            rls_baseline_ok: flag.as_ref().and_then(crate::normalize::flag_value),
        }
    }
}

impl RawGraph {
    /// Parse a JSON graph payload.
    ///
    /// # Errors
    /// Returns [`KernelError::Payload`] when the body is not a JSON object with
    /// `nodes`/`edges` arrays.
    pub fn from_json_str(body: &str) -> Result<Self, KernelError> {
        serde_json::from_str(body)
            .map_err(|err| KernelError::Payload(format!("invalid graph payload: {err}")))
    }

    #[must_use]
    pub fn normalize(&self) -> Graph {
        crate::normalize::normalize_graph(&self.nodes, &self.edges, self.rls_baseline_ok)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Violation {
    pub rule_id: String,
    pub error_code: String,
    pub message: String,
    pub entity_refs: Vec<String>,
}

impl Violation {
    pub(crate) fn ordering_cmp(lhs: &Self, rhs: &Self) -> Ordering {
        lhs.rule_id
            .cmp(&rhs.rule_id)
            .then_with(|| lhs.entity_refs.join(",").cmp(&rhs.entity_refs.join(",")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Primary,
    GhostSecondary,
}

impl RowKind {
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::GhostSecondary => 1,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::GhostSecondary => "ghost_secondary",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "primary" => Some(Self::Primary),
            "ghost_secondary" | "ghost" | "secondary" => Some(Self::GhostSecondary),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_ghost(self) -> bool {
        self == Self::GhostSecondary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProjectionRow {
    pub node_id: String,
    pub primary_path_key: Vec<String>,
    pub path_key: Vec<String>,
    pub path_sort_key: String,
    pub row_kind: RowKind,
    pub is_ghost: bool,
    pub source_edge_id: Option<String>,
    pub projection_parent_id: Option<String>,
    pub primary_parent_id: Option<String>,
    pub goal_id: Option<String>,
    pub outcome_id: Option<String>,
    pub output_id: Option<String>,
    pub depth: u32,
    pub node_type: String,
    pub node_title: String,
    pub node_description: Option<String>,
    pub node_narrative: Option<String>,
    pub reconciliation_key: String,
}

impl ProjectionRow {
    /// Total order shared by the projection builder and the matrix read path:
    /// `path_sort_key`, row kind rank, `node_id`, `projection_parent_id`, `source_edge_id`.
    #[must_use]
    pub fn canonical_cmp(lhs: &Self, rhs: &Self) -> Ordering {
        lhs.path_sort_key
            .cmp(&rhs.path_sort_key)
            .then_with(|| lhs.row_kind.rank().cmp(&rhs.row_kind.rank()))
            .then_with(|| lhs.node_id.cmp(&rhs.node_id))
            .then_with(|| {
                lhs.projection_parent_id
                    .as_deref()
                    .unwrap_or("")
                    .cmp(rhs.projection_parent_id.as_deref().unwrap_or(""))
            })
            .then_with(|| {
                lhs.source_edge_id
                    .as_deref()
                    .unwrap_or("")
                    .cmp(rhs.source_edge_id.as_deref().unwrap_or(""))
            })
    }

    pub(crate) fn dedup_key(&self) -> (RowKind, String, String, Option<String>) {
        (self.row_kind, self.node_id.clone(), self.path_key.join("/"), self.source_edge_id.clone())
    }
}

/// Canonical identity string used to match rows across independent computations.
#[must_use]
pub fn reconciliation_key(
    node_id: &str,
    goal_id: Option<&str>,
    outcome_id: Option<&str>,
    output_id: Option<&str>,
    projection_parent_id: Option<&str>,
    row_kind: RowKind,
) -> String {
    let canonical = |value: Option<&str>| match value {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => NULL_UUID.to_string(),
    };
    [
        canonical(Some(node_id)),
        canonical(goal_id),
        canonical(outcome_id),
        canonical(output_id),
        canonical(projection_parent_id),
        row_kind.as_str().to_string(),
    ]
    .join("|")
}

/// Fixed-width UTC millisecond timestamp; lexicographic order equals time order
/// for years 0000..=9999.
#[must_use]
pub fn sort_timestamp(value: OffsetDateTime) -> String {
    let utc = value.to_offset(UtcOffset::UTC);
    utc.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
    .unwrap_or_else(|_| format!("{:020}", utc.unix_timestamp()))
}
