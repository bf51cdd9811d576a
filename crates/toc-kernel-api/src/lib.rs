//! Service layer over the ToC kernel: published-only matrix reads and the
//! validate-then-commit publish workflow. Storage stays with the caller, passed
//! in as async loader and commit callbacks.

pub mod config;
pub mod envelope;
pub mod matrix;
pub mod publish;

pub use config::{load_gate_config, parse_gate_config, ConfigFormat};
pub use envelope::{ResponseEnvelope, GA_VALIDATION_FAILED, NOT_FOUND};
pub use matrix::{
    read_published_matrix, MatrixData, MatrixReadOutcome, VersionRecord, PUBLISHED_STATUS,
    VERSION_NOT_FOUND_MESSAGE,
};
pub use publish::{
    publish_draft, CommitResult, DraftPayload, PublishOutcome, DRAFT_NOT_FOUND_MESSAGE,
    PUBLISH_FAILED, VALIDATION_FAILED_MESSAGE,
};

pub const API_CONTRACT_VERSION: &str = "toc-api.v1";
