//! Gate A: the structural rules a ToC draft must pass before it can be published.
//!
//! Every rule runs on every call; a report always carries the complete set of
//! currently failing rules, sorted by `(rule_id, entity_refs)`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Confidence, EdgeKind, Graph, Node, RawGraph, RiskFlag, Violation};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum GateRule {
    GoalCount,
    Orphans,
    TypeChain,
    CausalCycle,
    DuplicateEdge,
    MechanismRequired,
    SentinelRequired,
    RlsBaseline,
}

impl GateRule {
    pub const ALL: [Self; 8] = [
        Self::GoalCount,
        Self::Orphans,
        Self::TypeChain,
        Self::CausalCycle,
        Self::DuplicateEdge,
        Self::MechanismRequired,
        Self::SentinelRequired,
        Self::RlsBaseline,
    ];

    #[must_use]
    pub fn rule_id(self) -> &'static str {
        match self {
            Self::GoalCount => "GA-01",
            Self::Orphans => "GA-02",
            Self::TypeChain => "GA-03",
            Self::CausalCycle => "GA-04",
            Self::DuplicateEdge => "GA-05",
            Self::MechanismRequired => "GA-06",
            Self::SentinelRequired => "GA-07",
            Self::RlsBaseline => "GA-08",
        }
    }

    #[must_use]
    pub fn error_code(self) -> &'static str {
        match self {
            Self::GoalCount => "GA_ERR_GOAL_COUNT",
            Self::Orphans => "GA_ERR_ORPHANS",
            Self::TypeChain => "GA_ERR_TYPE_CHAIN",
            Self::CausalCycle => "GA_ERR_CAUSAL_CYCLE",
            Self::DuplicateEdge => "GA_ERR_DUP_EDGE",
            Self::MechanismRequired => "GA_ERR_MECHANISM_REQUIRED",
            Self::SentinelRequired => "GA_ERR_SENTINEL_REQUIRED",
            Self::RlsBaseline => "GA_ERR_RLS_BASELINE",
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::GoalCount => "Exactly one GOAL node is required",
            Self::Orphans => "Every non-GOAL node requires an existing primary parent",
            Self::TypeChain => {
                "Primary parent type must follow GOAL > OUTCOME > OUTPUT > ACTIVITY"
            }
            Self::CausalCycle => "Causal edges must not form a cycle",
            Self::DuplicateEdge => "Edges must be unique per (source, target, edge_kind)",
            Self::MechanismRequired => "Causal edges require a mechanism",
            Self::SentinelRequired => {
                "Low-confidence or high-risk causal edges require a sentinel indicator"
            }
            Self::RlsBaseline => "Row-level security baseline check must pass",
        }
    }

    fn violation(self, entity_refs: Vec<String>) -> Violation {
        Violation {
            rule_id: self.rule_id().to_string(),
            error_code: self.error_code().to_string(),
            message: self.message().to_string(),
            entity_refs,
        }
    }
}

/// How GA-08 treats a payload that carries no RLS baseline flag at all.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MissingBaselinePolicy {
    /// An omitted flag counts as a passing baseline.
    #[default]
    AssumeOk,
    /// An omitted flag fails GA-08 like an explicit `false`.
    FailClosed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub missing_rls_baseline: MissingBaselinePolicy,
}

impl GateConfig {
    #[must_use]
    pub fn strict() -> Self {
        Self { missing_rls_baseline: MissingBaselinePolicy::FailClosed }
    }

    #[must_use]
    pub fn resolve_rls_baseline(&self, flag: Option<bool>) -> bool {
        match (flag, self.missing_rls_baseline) {
            (Some(value), _) => value,
            (None, MissingBaselinePolicy::AssumeOk) => true,
            (None, MissingBaselinePolicy::FailClosed) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct GateReport {
    pub pass: bool,
    pub violations: Vec<Violation>,
}

impl GateReport {
    #[must_use]
    pub fn violation_for(&self, rule: GateRule) -> Option<&Violation> {
        self.violations.iter().find(|violation| violation.rule_id == rule.rule_id())
    }
}

/// Run all Gate A rules over a normalized graph.
#[must_use]
pub fn validate_gate(graph: &Graph, config: &GateConfig) -> GateReport {
    if graph.rls_baseline_ok.is_none() {
        tracing::warn!(
            policy = ?config.missing_rls_baseline,
            "rls baseline flag omitted from gate payload"
        );
    }
    let rls_baseline_ok = config.resolve_rls_baseline(graph.rls_baseline_ok);

    let nodes_by_id = index_nodes(&graph.nodes);
    let mut violations: Vec<Violation> = GateRule::ALL
        .iter()
        .filter_map(|rule| {
            let refs = match rule {
                GateRule::GoalCount => goal_count_refs(&graph.nodes),
                GateRule::Orphans => orphan_refs(&graph.nodes, &nodes_by_id),
                GateRule::TypeChain => type_chain_refs(&graph.nodes, &nodes_by_id),
                GateRule::CausalCycle => causal_cycle_nodes(graph).into_iter().collect(),
                GateRule::DuplicateEdge => duplicate_edge_refs(graph),
                GateRule::MechanismRequired => missing_mechanism_refs(graph),
                GateRule::SentinelRequired => missing_sentinel_refs(graph),
                GateRule::RlsBaseline => {
                    if rls_baseline_ok {
                        Vec::new()
                    } else {
                        vec!["rls_baseline=false".to_string()]
                    }
                }
            };
            (!refs.is_empty()).then(|| rule.violation(refs))
        })
        .collect();
    violations.sort_by(Violation::ordering_cmp);

    tracing::debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        violations = violations.len(),
        "gate a validation finished"
    );

    GateReport { pass: violations.is_empty(), violations }
}

/// Normalize a raw payload and validate it.
#[must_use]
pub fn validate_raw_graph(raw: &RawGraph, config: &GateConfig) -> GateReport {
    validate_gate(&raw.normalize(), config)
}

fn index_nodes(nodes: &[Node]) -> BTreeMap<&str, &Node> {
    let mut index = BTreeMap::new();
    for node in nodes {
        index.entry(node.id.as_str()).or_insert(node);
    }
    index
}

fn goal_count_refs(nodes: &[Node]) -> Vec<String> {
    let goals: BTreeSet<&str> =
        nodes.iter().filter(|node| node.is_goal()).map(|node| node.id.as_str()).collect();
    let goal_count = nodes.iter().filter(|node| node.is_goal()).count();
    match goal_count {
        1 => Vec::new(),
        0 => vec!["goal_count=0".to_string()],
        _ => goals.into_iter().map(str::to_string).collect(),
    }
}

fn orphan_refs(nodes: &[Node], nodes_by_id: &BTreeMap<&str, &Node>) -> Vec<String> {
    nodes
        .iter()
        .filter(|node| !node.is_goal())
        .filter(|node| match node.primary_parent_id.as_deref() {
            Some(parent_id) => !nodes_by_id.contains_key(parent_id),
            None => true,
        })
        .map(|node| node.id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn type_chain_refs(nodes: &[Node], nodes_by_id: &BTreeMap<&str, &Node>) -> Vec<String> {
    let mut refs = BTreeSet::new();
    for node in nodes {
        let Some(parent) =
            node.primary_parent_id.as_deref().and_then(|parent_id| nodes_by_id.get(parent_id))
        else {
            continue;
        };
        let expected = node.node_type.and_then(|node_type| node_type.predecessor());
        if expected.is_none() || parent.node_type != expected {
            refs.insert(format!("{}:{}", node.id, parent.id));
        }
    }
    refs.into_iter().collect()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Nodes on the stack span of every back edge found by an iterative
/// three-colour DFS over causal edges, visited in lexicographic id order.
fn causal_cycle_nodes(graph: &Graph) -> BTreeSet<String> {
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for node in &graph.nodes {
        adjacency.entry(node.id.as_str()).or_default();
    }
    // Edges missing an endpoint cannot close a loop.
    let causal = graph.edges.iter().filter(|edge| {
        edge.edge_kind == EdgeKind::Causal
            && !edge.source_node_id.is_empty()
            && !edge.target_node_id.is_empty()
    });
    for edge in causal {
        adjacency
            .entry(edge.source_node_id.as_str())
            .or_default()
            .insert(edge.target_node_id.as_str());
        adjacency.entry(edge.target_node_id.as_str()).or_default();
    }
    let adjacency: BTreeMap<&str, Vec<&str>> =
        adjacency.into_iter().map(|(id, targets)| (id, targets.into_iter().collect())).collect();

    let mut marks: BTreeMap<&str, Mark> =
        adjacency.keys().map(|id| (*id, Mark::Unvisited)).collect();
    let mut in_cycle = BTreeSet::new();

    for &start in adjacency.keys() {
        if marks.get(start) != Some(&Mark::Unvisited) {
            continue;
        }

        marks.insert(start, Mark::Visiting);
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        while let Some(&(current, cursor)) = stack.last() {
            let neighbours = adjacency.get(current).map_or(&[][..], Vec::as_slice);
            let Some(&next) = neighbours.get(cursor) else {
                marks.insert(current, Mark::Done);
                stack.pop();
                continue;
            };
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }

            match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
                Mark::Unvisited => {
                    marks.insert(next, Mark::Visiting);
                    stack.push((next, 0));
                }
                Mark::Visiting => {
                    if let Some(position) = stack.iter().position(|(id, _)| *id == next) {
                        in_cycle.extend(stack[position..].iter().map(|(id, _)| (*id).to_string()));
                    }
                }
                Mark::Done => {}
            }
        }
    }

    in_cycle
}

fn duplicate_edge_refs(graph: &Graph) -> Vec<String> {
    let mut groups: BTreeMap<(&str, &str, EdgeKind), Vec<&str>> = BTreeMap::new();
    for edge in &graph.edges {
        groups
            .entry((edge.source_node_id.as_str(), edge.target_node_id.as_str(), edge.edge_kind))
            .or_default()
            .push(edge.id.as_str());
    }
    groups
        .into_values()
        .filter(|ids| ids.len() > 1)
        .flatten()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn missing_mechanism_refs(graph: &Graph) -> Vec<String> {
    graph
        .edges
        .iter()
        .filter(|edge| edge.edge_kind == EdgeKind::Causal)
        .filter(|edge| edge.mechanism.as_deref().map_or(true, |text| text.trim().is_empty()))
        .map(|edge| edge.id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn missing_sentinel_refs(graph: &Graph) -> Vec<String> {
    graph
        .edges
        .iter()
        .filter(|edge| edge.edge_kind == EdgeKind::Causal)
        .filter(|edge| edge.confidence == Confidence::Low || edge.risk_flag == RiskFlag::HighRisk)
        .filter(|edge| edge.sentinel_indicator_id.is_none())
        .map(|edge| edge.id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
