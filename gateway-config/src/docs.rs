// gateway-config/src/docs.rs
// ============================================================================
// Module: Settings Docs Generator
// Description: Markdown generator for gateway.toml documentation.
// Purpose: Keep settings docs in sync with the schema and validation rules.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Generates `Docs/configuration/gateway.toml.md` from the canonical
//! settings model. The output is deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

const DOCS_PATH: &str = "Docs/configuration/gateway.toml.md";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised generating or verifying settings docs.
#[derive(Debug, Error)]
pub enum DocsError {
    /// IO failure while writing docs.
    #[error("docs io error: {0}")]
    Io(String),
    /// Generated docs do not match the committed file.
    #[error("docs drift: {0}")]
    Drift(String),
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Generates the settings markdown documentation.
#[must_use]
pub fn config_docs_markdown() -> String {
    let mut out = String::new();
    out.push_str("<!--\n");
    out.push_str("Docs/configuration/gateway.toml.md\n");
    out.push_str("============================================================================\n");
    out.push_str("Document: Gateway Process Configuration\n");
    out.push_str("Description: Reference for gateway.toml configuration fields.\n");
    out.push_str("Generated: This file is auto-generated; do not edit manually.\n");
    out.push_str("============================================================================\n");
    out.push_str("-->\n\n");

    out.push_str("# gateway.toml Configuration\n\n");
    out.push_str("## Overview\n\n");
    out.push_str(
        "`gateway.toml` configures the HTTP server bind address, durable store backend, \
         C1 config cache tuning, C5 sandbox resource limits, and worker poll intervals. \
         Secrets (`auth.api_key`, `auth.jwt_secret`) are resolved from environment overrides \
         at the CLI layer and are never expected to live in the committed file.\n\n",
    );

    out.push_str("## `[server]`\n\n");
    out.push_str("| Field | Type | Default | Description |\n|---|---|---|---|\n");
    out.push_str("| `bind_addr` | string | `0.0.0.0:8080` | Socket address the axum router binds to. |\n");
    out.push_str("| `max_body_bytes` | integer | `1048576` | Maximum accepted inbound request body size. |\n\n");

    out.push_str("## `[store]`\n\n");
    out.push_str("| Field | Type | Default | Description |\n|---|---|---|---|\n");
    out.push_str("| `backend` | `memory` \\| `sqlite` | `memory` | Durable store backend selection. |\n");
    out.push_str("| `path` | string | — | SQLite database file path (sqlite backend only). |\n");
    out.push_str("| `busy_timeout_ms` | integer | `5000` | SQLite busy-timeout before a locked-database error surfaces. |\n");
    out.push_str("| `journal_mode` | `wal` \\| `delete` | `wal` | SQLite journal mode. |\n");
    out.push_str("| `sync_mode` | `full` \\| `normal` | `full` | SQLite synchronous mode. |\n\n");

    out.push_str("## `[cache]`\n\n");
    out.push_str("| Field | Type | Default | Description |\n|---|---|---|---|\n");
    out.push_str("| `ttl_ms` | integer | `300000` | C1 config cache entry lifetime. |\n");
    out.push_str("| `max_entries` | integer | `16384` | Per-shard cache entry cap before eviction. |\n\n");

    out.push_str("## `[sandbox]`\n\n");
    out.push_str("| Field | Type | Default | Description |\n|---|---|---|---|\n");
    out.push_str("| `timeout_ms` | integer | `2000` | Wall-clock budget per C5 script invocation. |\n");
    out.push_str("| `memory_limit_bytes` | integer | `16777216` | QuickJS runtime memory ceiling. |\n\n");

    out.push_str("## `[workers]`\n\n");
    out.push_str("| Field | Type | Default | Description |\n|---|---|---|---|\n");
    out.push_str("| `watchdog_interval_ms` | integer | `30000` | C2 watchdog scan interval. |\n");
    out.push_str("| `stuck_threshold_ms` | integer | `300000` | `PROCESSING` age before an event is declared stuck. |\n");
    out.push_str("| `retry_poll_interval_ms` | integer | `5000` | C10 retry/DLQ claim-due poll interval. |\n");
    out.push_str("| `schedule_poll_interval_ms` | integer | `1000` | C11 scheduler claim-due poll interval. |\n");
    out.push_str("| `source_poll_interval_ms` | integer | `2000` | C3 source adapter poll interval. |\n\n");

    out.push_str("## `[auth]`\n\n");
    out.push_str("| Field | Type | Default | Description |\n|---|---|---|---|\n");
    out.push_str("| `api_key` | string | — | Static API key accepted on the DLQ/execution-log control surfaces. |\n");
    out.push_str("| `jwt_secret` | string | — | HMAC secret used to verify bearer JWTs on the control surfaces. |\n");

    out
}

/// Writes the generated docs to the standard location.
///
/// # Errors
///
/// Returns [`DocsError`] when file output fails.
pub fn write_config_docs(path: Option<&Path>) -> Result<(), DocsError> {
    let path = path.unwrap_or_else(|| Path::new(DOCS_PATH));
    fs::write(path, config_docs_markdown().as_bytes()).map_err(|err| DocsError::Io(err.to_string()))
}

/// Verifies the on-disk docs match the generated output.
///
/// # Errors
///
/// Returns [`DocsError`] when the docs drift or cannot be read.
pub fn verify_config_docs(path: Option<&Path>) -> Result<(), DocsError> {
    let path = path.unwrap_or_else(|| Path::new(DOCS_PATH));
    let existing = fs::read_to_string(path).map_err(|err| DocsError::Io(err.to_string()))?;
    let generated = config_docs_markdown();
    if existing != generated {
        return Err(DocsError::Drift(format!("docs mismatch: {}", path.display())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_verify_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml.md");
        write_config_docs(Some(&path)).expect("write docs");
        verify_config_docs(Some(&path)).expect("verify docs");
    }

    #[test]
    fn verify_detects_drift() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml.md");
        fs::write(&path, "stale content").expect("write stale docs");
        let result = verify_config_docs(Some(&path));
        assert!(result.is_err());
    }
}
