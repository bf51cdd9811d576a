use std::future::Future;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toc_kernel_core::{normalize_projection_rows, projection_fingerprint, ProjectionRow, RawRecord};

use crate::envelope::{ResponseEnvelope, NOT_FOUND};

pub const PUBLISHED_STATUS: &str = "PUBLISHED";
pub const VERSION_NOT_FOUND_MESSAGE: &str = "Published ToC version not found";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    pub id: String,
    pub status: String,
}

impl VersionRecord {
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == PUBLISHED_STATUS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixData {
    pub rows: Vec<ProjectionRow>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixReadOutcome {
    Loaded(MatrixData),
    NotFound { message: String },
}

impl MatrixReadOutcome {
    #[must_use]
    pub fn into_envelope(self) -> ResponseEnvelope<MatrixData> {
        match self {
            Self::Loaded(data) => ResponseEnvelope::success(Some(data)),
            Self::NotFound { message } => ResponseEnvelope::failure(NOT_FOUND, Some(message)),
        }
    }
}

/// Read the projection matrix of a published ToC version.
///
/// Rows are only loaded once the version resolves with status `PUBLISHED`; any
/// other status reads as not found regardless of row content.
///
/// # Errors
/// Returns an error carrying the upstream message when either loader fails.
pub async fn read_published_matrix<LV, FV, LR, FR>(
    load_version: LV,
    load_projection_rows: LR,
) -> Result<MatrixReadOutcome>
where
    LV: FnOnce() -> FV,
    FV: Future<Output = Result<Option<VersionRecord>>>,
    LR: FnOnce() -> FR,
    FR: Future<Output = Result<Vec<RawRecord>>>,
{
    let version = load_version().await.context("failed to load ToC version")?;
    let Some(version) = version.filter(VersionRecord::is_published) else {
        tracing::info!("matrix read rejected: version missing or not published");
        return Ok(MatrixReadOutcome::NotFound { message: VERSION_NOT_FOUND_MESSAGE.to_string() });
    };

    let raw_rows = load_projection_rows()
        .await
        .with_context(|| format!("failed to load projection rows for version {}", version.id))?;
    let rows = normalize_projection_rows(&raw_rows);
    let fingerprint = projection_fingerprint(&rows);
    tracing::info!(version_id = %version.id, rows = rows.len(), %fingerprint, "matrix read");

    Ok(MatrixReadOutcome::Loaded(MatrixData { rows, fingerprint }))
}
