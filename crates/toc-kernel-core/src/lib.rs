//! Theory-of-Change graph kernel: Gate A validation, tree-with-ghosts projection,
//! and canonical ordering of persisted projection rows.
//!
//! Everything in this crate is synchronous and storage-free. Callers hand in plain
//! node/edge records already scoped to one draft or version.

pub mod gate;
pub mod matrix;
pub mod model;
pub mod normalize;
pub mod projection;

pub use gate::{
    validate_gate, validate_raw_graph, GateConfig, GateReport, GateRule, MissingBaselinePolicy,
};
pub use matrix::{
    normalize_projection_row, normalize_projection_rows, projection_fingerprint,
    reconcile_projection, ProjectionDiff,
};
pub use model::{
    reconciliation_key, sort_timestamp, Confidence, Edge, EdgeKind, Graph, Node, NodeType,
    ProjectionRow, RawGraph, RawRecord, RiskFlag, RowKind, Violation, NULL_UUID,
};
pub use normalize::{normalize_edge, normalize_graph, normalize_node, parse_timestamp};
pub use projection::{build_projection, build_raw_projection};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("payload error: {0}")]
    Payload(String),
}

/// Parse a JSON array of raw records (projection rows, nodes or edges).
///
/// # Errors
/// Returns [`KernelError::Payload`] when the body is not a JSON array.
pub fn parse_raw_records(body: &str) -> Result<Vec<RawRecord>, KernelError> {
    serde_json::from_str(body)
        .map_err(|err| KernelError::Payload(format!("expected a JSON array of records: {err}")))
}
