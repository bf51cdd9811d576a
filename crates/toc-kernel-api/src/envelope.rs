use serde::{Deserialize, Serialize};
use toc_kernel_core::Violation;

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const GA_VALIDATION_FAILED: &str = "GA_VALIDATION_FAILED";

/// Wire shape shared by every service result: `{ ok, code?, message?, data?, violations? }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
}

impl<T> ResponseEnvelope<T> {
    #[must_use]
    pub fn success(data: Option<T>) -> Self {
        Self { ok: true, code: None, message: None, data, violations: None }
    }

    #[must_use]
    pub fn failure(code: impl Into<String>, message: Option<String>) -> Self {
        Self { ok: false, code: Some(code.into()), message, data: None, violations: None }
    }

    #[must_use]
    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = Some(violations);
        self
    }
}
