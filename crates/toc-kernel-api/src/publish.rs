use std::future::Future;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toc_kernel_core::{validate_raw_graph, GateConfig, RawGraph, RawRecord, Violation};

use crate::envelope::{ResponseEnvelope, GA_VALIDATION_FAILED, NOT_FOUND};

pub const DRAFT_NOT_FOUND_MESSAGE: &str = "Draft not found";
pub const VALIDATION_FAILED_MESSAGE: &str = "Gate A validation failed";
pub const PUBLISH_FAILED: &str = "PUBLISH_FAILED";

/// Draft graph state handed over by the draft loader.
///
/// The graph part deserializes like [`RawGraph`], so either RLS flag spelling
/// is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "DraftPayloadWire")]
pub struct DraftPayload {
    pub found: bool,
    pub nodes: Vec<RawRecord>,
    pub edges: Vec<RawRecord>,
    pub rls_baseline_ok: Option<bool>,
}

#[derive(Deserialize)]
struct DraftPayloadWire {
    found: bool,
    #[serde(flatten)]
    graph: RawGraph,
}

impl From<DraftPayloadWire> for DraftPayload {
    fn from(wire: DraftPayloadWire) -> Self {
        let RawGraph { nodes, edges, rls_baseline_ok } = wire.graph;
        Self { found: wire.found, nodes, edges, rls_baseline_ok }
    }
}

impl DraftPayload {
    #[must_use]
    pub fn not_found() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn found(nodes: Vec<RawRecord>, edges: Vec<RawRecord>, rls_baseline_ok: Option<bool>) -> Self {
        Self { found: true, nodes, edges, rls_baseline_ok }
    }

    #[must_use]
    pub fn into_raw_graph(self) -> RawGraph {
        RawGraph { nodes: self.nodes, edges: self.edges, rls_baseline_ok: self.rls_baseline_ok }
    }
}

/// Result reported by the atomic publish step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommitResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommitResult {
    #[must_use]
    pub fn committed(data: Option<Value>) -> Self {
        Self { ok: true, data, code: None, message: None }
    }

    #[must_use]
    pub fn rejected(code: Option<String>, message: Option<String>) -> Self {
        Self { ok: false, data: None, code, message }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    Published { data: Option<Value> },
    NotFound { message: String },
    ValidationFailed { violations: Vec<Violation> },
    CommitRejected { code: String, message: Option<String> },
}

impl PublishOutcome {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    #[must_use]
    pub fn into_envelope(self) -> ResponseEnvelope<Value> {
        match self {
            Self::Published { data } => ResponseEnvelope::success(data),
            Self::NotFound { message } => ResponseEnvelope::failure(NOT_FOUND, Some(message)),
            Self::ValidationFailed { violations } => ResponseEnvelope::failure(
                GA_VALIDATION_FAILED,
                Some(VALIDATION_FAILED_MESSAGE.to_string()),
            )
            .with_violations(violations),
            Self::CommitRejected { code, message } => ResponseEnvelope::failure(code, message),
        }
    }
}

/// Validate a draft and, only when Gate A passes, run the atomic publish.
///
/// The steps run strictly in order: load, validate, commit. A missing draft
/// skips validation and commit; a failing gate skips the commit.
///
/// # Errors
/// Returns an error carrying the upstream message when either callback fails.
pub async fn publish_draft<LD, FD, EP, FP>(
    config: &GateConfig,
    load_draft_payload: LD,
    execute_atomic_publish: EP,
) -> Result<PublishOutcome>
where
    LD: FnOnce() -> FD,
    FD: Future<Output = Result<DraftPayload>>,
    EP: FnOnce() -> FP,
    FP: Future<Output = Result<CommitResult>>,
{
    let draft = load_draft_payload().await.context("failed to load draft payload")?;
    if !draft.found {
        tracing::info!("publish rejected: draft not found");
        return Ok(PublishOutcome::NotFound { message: DRAFT_NOT_FOUND_MESSAGE.to_string() });
    }

    let report = validate_raw_graph(&draft.into_raw_graph(), config);
    if !report.pass {
        tracing::warn!(violations = report.violations.len(), "publish blocked by gate a");
        return Ok(PublishOutcome::ValidationFailed { violations: report.violations });
    }

    let commit = execute_atomic_publish().await.context("atomic publish failed")?;
    if !commit.ok {
        let code = commit.code.unwrap_or_else(|| PUBLISH_FAILED.to_string());
        tracing::warn!(%code, "publish commit rejected");
        return Ok(PublishOutcome::CommitRejected { code, message: commit.message });
    }

    tracing::info!("draft published");
    Ok(PublishOutcome::Published { data: commit.data })
}
