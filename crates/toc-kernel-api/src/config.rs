use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use toc_kernel_core::GateConfig;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// `.yaml`/`.yml` read as YAML, everything else as JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase) {
            Some(ext) if ext == "yaml" || ext == "yml" => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Parse gate configuration text. Missing keys fall back to defaults.
///
/// # Errors
/// Returns an error when the body is not valid for the given format or names
/// an unknown policy.
pub fn parse_gate_config(body: &str, format: ConfigFormat) -> Result<GateConfig> {
    if body.trim().is_empty() {
        return Ok(GateConfig::default());
    }
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(body).context("invalid YAML gate config"),
        ConfigFormat::Json => serde_json::from_str(body).context("invalid JSON gate config"),
    }
}

/// # Errors
/// Returns an error when the file cannot be read or parsed.
pub fn load_gate_config(path: &Path) -> Result<GateConfig> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read gate config {}", path.display()))?;
    let config = parse_gate_config(&body, ConfigFormat::from_path(path))
        .with_context(|| format!("failed to parse gate config {}", path.display()))?;
    tracing::debug!(path = %path.display(), policy = ?config.missing_rls_baseline, "gate config loaded");
    Ok(config)
}
